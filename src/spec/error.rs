#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Location;

/// Fatal problems found while reading a specification file. Any of these
/// aborts the run before a single test executes.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Malformed delimiter, annotation, or body line.
    #[error("{location}: {message}\n    {text}")]
    Syntax {
        /// Where the problem was found.
        location: Location,
        /// What was expected.
        message:  String,
        /// The offending line.
        text:     String,
    },
    /// The file ended in the middle of a test.
    #[error("{location}: unexpected end of input\n    {text}")]
    UnexpectedEnd {
        /// Last line of the file.
        location: Location,
        /// Text of the last line.
        text:     String,
    },
    /// A required attribute is absent.
    #[error("{location}: missing required attribute: {attribute}\n{collected}")]
    MissingAttribute {
        /// End of the annotation block.
        location:  Location,
        /// Name of the attribute.
        attribute: String,
        /// Every attribute collected so far, one `  tag: value` per line.
        collected: String,
    },
    /// A required attribute is present but empty.
    #[error("{location}: required attribute missing value: {attribute}\n{collected}")]
    EmptyAttribute {
        /// End of the annotation block.
        location:  Location,
        /// Name of the attribute.
        attribute: String,
        /// Every attribute collected so far, one `  tag: value` per line.
        collected: String,
    },
    /// The specification file itself could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        /// Path of the specification file.
        path:   PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SpecError {
    /// Location of the problem, if it has one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            SpecError::Syntax { location, .. }
            | SpecError::UnexpectedEnd { location, .. }
            | SpecError::MissingAttribute { location, .. }
            | SpecError::EmptyAttribute { location, .. } => Some(location),
            SpecError::Io { .. } => None,
        }
    }
}
