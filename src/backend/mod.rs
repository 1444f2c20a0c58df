#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The write, compile, and run protocol every language backend implements.

/// Artifact writing and process plumbing shared by the backends
pub mod common;
/// C++ harnesses compiled with `g++`
pub mod cpp;
/// Java harnesses compiled with `javac` and run with JUnit
pub mod java;
/// Python harnesses run through `unittest`
pub mod python;
/// SQL checks run through the `mysql` client
pub mod sql;

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{process::ProcessError, spec::Test};

/// Languages a specification can be graded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// C++ (the default).
    #[default]
    Cpp,
    /// Java.
    Java,
    /// Python 3.
    Python,
    /// MySQL.
    Sql,
}

impl Language {
    /// Name accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Sql => "sql",
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpp" | "c++" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            "sql" | "mysql" => Ok(Language::Sql),
            other => Err(format!(
                "unknown language `{other}`, expected one of: cpp, java, python, sql"
            )),
        }
    }
}

/// What `write` put on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    /// Files written into the working directory.
    pub files:   Vec<PathBuf>,
    /// Helper script invocation generated for script-family tests.
    pub command: Option<String>,
}

/// Outcome of the compile stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    /// Whether the build step succeeded.
    pub success: bool,
    /// Combined stdout and stderr of the build step.
    pub output:  String,
}

impl Compilation {
    /// A compile stage with nothing to build.
    pub fn skipped() -> Self {
        Self {
            success: true,
            output:  String::new(),
        }
    }
}

/// Outcome of the run stage of a single test.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialTestResult {
    /// Text to disclose (subject to `show_output`).
    pub run_output:          String,
    /// Set when an `approved_includes` test failed.
    pub unapproved_includes: bool,
    /// Cleared when a `coverage` test failed.
    pub sufficient_coverage: bool,
    /// Points awarded; negative for a penalty.
    pub points:              f64,
    /// Wall-clock time spent running.
    pub run_time:            Duration,
    /// Whether the run counted as a pass.
    pub passed:              bool,
}

/// Failures of the dispatch protocol itself, as opposed to a test that ran
/// and failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The active backend has no implementation for this kind of test.
    #[error("{kind} tests are not supported by the {language} backend")]
    Unsupported {
        /// Test type (or SQL check type) that was requested.
        kind:     String,
        /// Active backend.
        language: Language,
    },
    /// An artifact could not be written or read back.
    #[error("could not access {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path:   PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A subprocess could not be managed.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl DispatchError {
    /// True for the [`DispatchError::Unsupported`] variant.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DispatchError::Unsupported { .. })
    }
}

/// A language backend. Every stage works on fixed file names inside
/// [`Backend::workdir`], so tests must be driven one at a time.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// The language this backend grades.
    fn language(&self) -> Language;

    /// Directory the artifacts are written to and run from.
    fn workdir(&self) -> &std::path::Path;

    /// Whether this backend implements `test`'s kind.
    fn supports(&self, test: &Test) -> bool;

    /// Materializes the artifacts needed to compile and run `test`.
    fn write(&self, test: &Test) -> Result<Artifact, DispatchError>;

    /// Builds the artifacts written by [`Backend::write`].
    async fn compile(&self, test: &Test) -> Result<Compilation, DispatchError>;

    /// Runs the built artifacts under the test's timeout and scores them.
    async fn run(&self, test: &Test) -> Result<PartialTestResult, DispatchError>;

    /// Error for tests this backend does not implement.
    fn unsupported(&self, test: &Test) -> DispatchError {
        DispatchError::Unsupported {
            kind:     test.kind.to_string(),
            language: self.language(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn languages_parse_case_insensitively() {
        assert_eq!("CPP".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("c++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("Java".parse::<Language>(), Ok(Language::Java));
        assert_eq!("python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("sql".parse::<Language>(), Ok(Language::Sql));
        assert!("rust".parse::<Language>().is_err());
    }

    #[test]
    fn unsupported_names_kind_and_language() {
        let err = DispatchError::Unsupported {
            kind:     "style".into(),
            language: Language::Cpp,
        };
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "style tests are not supported by the cpp backend");
    }
}
