#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Reading annotated test specification files.

/// Test records and their kinds
pub mod attributes;
/// Errors raised while reading specifications
pub mod error;
/// `peg` grammars for single lines
pub mod grammar;
/// The recursive-descent reader
pub mod parser;

pub use attributes::{Test, TestType};
pub use error::SpecError;
pub use parser::{SpecReader, parse_tests, read_tests};
