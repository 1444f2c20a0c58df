//! # specgrade
//!
//! An autograder driven by annotated test specification files. Tests are
//! parsed into typed records, pushed one at a time through a language
//! backend's write, compile, and run stages, and scored into a Gradescope
//! result document.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Language backends implementing the write, compile, and run protocol
pub mod backend;
/// Toolchain configuration read from the environment
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Scoring and aggregation of a grading run
pub mod grade;
/// The Gradescope result document
pub mod gradescope;
/// Spawning subprocesses with a hard timeout
pub mod process;
/// Reading test specification files
pub mod spec;
/// Shared types
pub mod types;
/// Utility functions for convenience
pub mod util;

pub use config::Config;
pub use grade::{GradeOptions, grade, grade_with};
pub use gradescope::{GradescopeSubmission, write_results};
pub use spec::{SpecError, Test, TestType, read_tests};
