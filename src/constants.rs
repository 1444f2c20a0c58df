#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Opens the body of a test.
pub const BEGIN_TEST_DELIMITER: &str = "<test>";

/// Closes the body of a test.
pub const END_TEST_DELIMITER: &str = "</test>";

/// A self-closing, empty test body. Only accepted while skipping tests of an
/// unsupported type.
pub const EMPTY_TEST_BLOCK: &str = "<test/>";

/// Opens an annotation block.
pub const BEGIN_MULTILINE_COMMENT_DELIMITER: &str = "/*";

/// Closes an annotation block.
pub const END_MULTILINE_COMMENT_DELIMITER: &str = "*/";

/// Points awarded when `@points` is not a number.
pub const DEFAULT_POINTS: f64 = 0.0;

/// Execution timeout, in seconds, when `@timeout` is absent or invalid.
pub const DEFAULT_TIMEOUT: f64 = 10.0;

/// Replaces the run output of any test that hit its timeout.
pub const TIMEOUT_MSSG: &str = "Timeout during test execution, check for an infinite loop\n";

/// Shown in place of compiler and run output for undisclosed tests.
pub const OUTPUT_HIDDEN_MSSG: &str = "Output is intentionally hidden";

/// Prefix for tests that did not compile.
pub const FAILED_TO_COMPILE_MSSG: &str = "Failed to compile.";

/// Reported when a script-family test leaves no score file behind.
pub const MISSING_SCORE_MSSG: &str = "test failed to run";

/// Reported when a script's score or debug file is not valid UTF-8.
pub const MALFORMED_OUTPUT_MSSG: &str =
    "Malformed output is unreadable, check for non-utf-8 characters\n";

/// Appended to the submission output when unapproved includes were found.
pub const UNAPPROVED_INCLUDES_MSSG: &str =
    "Forbidden includes are used, your current submission score is 0.0\n";

/// Appended to the submission output when coverage was insufficient.
pub const INSUFFICIENT_COVERAGE_MSSG: &str =
    "Insufficient test coverage, so your current submission score is 0.0\n";

/// Prefix for tests whose type the active backend cannot handle.
pub const INFO_UNSUPPORTED_TEST: &str = "[INFO] Unsupported Test";

/// Script file every script-family test is materialised into.
pub const SCRIPT_FILE: &str = "script.sh";

/// Numeric score (0-100, negative for penalties) written by helper scripts.
pub const SCORE_FILE: &str = "OUTPUT";

/// Optional free-form diagnostics written by helper scripts.
pub const DEBUG_FILE: &str = "DEBUG";

/// Expected stdin of an i/o test.
pub const INPUT_FILE: &str = "input.txt";

/// Expected stdout of an i/o test.
pub const OUTPUT_FILE: &str = "output.txt";

/// Helper script checking that only approved headers are included.
pub const APPROVED_INCLUDES_SCRIPT: &str = "./approved_includes.sh";

/// Helper script measuring test coverage.
pub const COVERAGE_SCRIPT: &str = "./coverage.sh";

/// Helper script checking that sources compile.
pub const COMPILES_SCRIPT: &str = "./compiles.sh";

/// Helper script looking for memory errors.
pub const MEMORY_ERRORS_SCRIPT: &str = "./memory_errors.sh";

/// Helper script running a style checker.
pub const STYLE_SCRIPT: &str = "./check_style.sh";

/// Script run after every SQL test, if present in the working directory.
pub const SQL_CLEANUP_SCRIPT: &str = "cleanup.sql";

/// MySQL error code raised when a CHECK constraint is violated.
pub const SQL_CHECK_CONSTRAINT_VIOLATION: &str = "3819";

/// Default location of the result document.
pub const DEFAULT_RESULTS_FILE: &str = "results.json";
