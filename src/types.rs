use std::fmt::Display;

/// A position in a specification file, reported as `file:line`.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct Location {
    /// The file name as it was given to the parser.
    pub file_name:   String,
    /// 1-based line number.
    pub line_number: usize,
}

impl Location {
    /// Creates a location from a file name and a 1-based line number.
    pub fn new(file_name: impl Into<String>, line_number: usize) -> Self {
        Self {
            file_name: file_name.into(),
            line_number,
        }
    }

    /// Returns the file name for this location.
    pub fn file_name(&self) -> &str {
        self.file_name.as_ref()
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line_number)
    }
}
