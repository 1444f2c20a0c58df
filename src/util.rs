#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use which::which;

/// Finds and returns the path to a toolchain program (compiler, interpreter,
/// database client).
///
/// Names containing a path separator are returned unchanged.
pub fn program_path(name: &str) -> Result<OsString> {
    if Path::new(name).components().count() > 1 {
        return Ok(OsString::from(name));
    }
    which(name)
        .map(PathBuf::into_os_string)
        .with_context(|| format!("Cannot find `{name}` on path"))
}

/// Strips trailing whitespace from every line, keeping line structure.
pub fn remove_end_of_line_whitespace(s: &str) -> String {
    s.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits a space-delimited list (the `include` attribute) into its entries.
pub fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_whitespace_is_removed_per_line() {
        assert_eq!(remove_end_of_line_whitespace("a  \nb\t\n c "), "a\nb\n c");
    }

    #[test]
    fn relative_paths_are_not_looked_up() {
        assert_eq!(program_path("./unit_test").unwrap(), OsString::from("./unit_test"));
    }

    #[test]
    fn list_splitting_skips_blanks() {
        let items: Vec<_> = split_list("  <vector>  \"util.h\" ").collect();
        assert_eq!(items, vec!["<vector>", "\"util.h\""]);
    }
}
