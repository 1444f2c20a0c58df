#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, str::FromStr, time::Duration};

use crate::{
    constants::{DEFAULT_POINTS, DEFAULT_TIMEOUT},
    gradescope::GradescopeVisibility,
};

/// Kinds of tests a specification file can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestType {
    /// A code snippet compiled against the target and run; exit code 0 passes.
    Unit,
    /// Program fed `expected_input`; its stdout must match `expected_output`.
    Io,
    /// A user supplied shell script that reports a percentage score.
    Script,
    /// Helper script checking that only approved headers are included.
    ApprovedIncludes,
    /// Like `Unit`, but reports how long the snippet took.
    Performance,
    /// Helper script measuring test coverage.
    Coverage,
    /// Helper script checking that sources compile.
    Compile,
    /// Helper script looking for memory errors.
    MemoryErrors,
    /// Helper script running a style checker.
    Style,
}

impl TestType {
    /// Every supported kind.
    pub const ALL: [TestType; 9] = [
        TestType::ApprovedIncludes,
        TestType::Compile,
        TestType::Coverage,
        TestType::Io,
        TestType::MemoryErrors,
        TestType::Performance,
        TestType::Script,
        TestType::Style,
        TestType::Unit,
    ];

    /// The spelling used in `@type:` annotations.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Unit => "unit",
            TestType::Io => "i/o",
            TestType::Script => "script",
            TestType::ApprovedIncludes => "approved_includes",
            TestType::Performance => "performance",
            TestType::Coverage => "coverage",
            TestType::Compile => "compile",
            TestType::MemoryErrors => "memory_errors",
            TestType::Style => "style",
        }
    }

    /// Kinds that may omit `@target`.
    pub fn is_target_exempt(&self) -> bool {
        matches!(
            self,
            TestType::Script | TestType::Style | TestType::Compile | TestType::MemoryErrors
        )
    }

    /// Kinds whose output is disclosed unless `@show_output` says otherwise.
    pub fn shows_output_by_default(&self) -> bool {
        matches!(self, TestType::ApprovedIncludes | TestType::Coverage | TestType::Compile)
    }
}

impl Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unsupported test type: {s}"))
    }
}

/// One parsed test case.
///
/// Built once by the parser; afterwards only `skip` changes (through test
/// selection).
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    /// Dot-delimited ordering/selection key, e.g. `5.2`. Not unique.
    pub number:            String,
    /// Human readable label.
    pub name:              String,
    /// Maximum score; always finite and non-negative.
    pub points:            f64,
    /// Drives dispatch.
    pub kind:              TestType,
    /// Artifact under test. Empty for target-exempt kinds that omit it.
    pub target:            String,
    /// Whether captured output is disclosed to the student.
    pub show_output:       bool,
    /// Execution timeout in seconds; always finite and positive.
    pub timeout:           f64,
    /// Space-delimited list of extra includes/imports.
    pub include:           String,
    /// Body of unit and performance tests, one `\n` after every line.
    pub code:              String,
    /// Stdin of an i/o test.
    pub expected_input:    String,
    /// Expected stdout of an i/o test.
    pub expected_output:   String,
    /// Script body of a `script` test.
    pub script_content:    String,
    /// Arguments passed to a `script` test.
    pub script_args:       String,
    /// Approved includes, source files, or coverage sources, depending on
    /// `kind`.
    pub approved_includes: Vec<String>,
    /// Skipped tests are neither run nor reported.
    pub skip:              bool,
    /// Visibility of the reported test case.
    pub visibility:        GradescopeVisibility,
}

impl Test {
    /// Creates a test with every optional attribute at its default.
    pub fn new(name: impl Into<String>, points: f64, kind: TestType) -> Self {
        Self {
            number: String::new(),
            name: name.into(),
            points,
            kind,
            target: String::new(),
            show_output: kind.shows_output_by_default(),
            timeout: DEFAULT_TIMEOUT,
            include: String::new(),
            code: String::new(),
            expected_input: String::new(),
            expected_output: String::new(),
            script_content: String::new(),
            script_args: String::new(),
            approved_includes: Vec::new(),
            skip: false,
            visibility: GradescopeVisibility::default(),
        }
    }

    /// The timeout as a `Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT))
    }

    /// True if `selection` names this test: `*`, the exact number, or a
    /// dot-delimited prefix of it (`5` selects `5.2` but not `52`).
    pub fn is_selected_by(&self, selection: &str) -> bool {
        selection == "*"
            || self.number == selection
            || self
                .number
                .strip_prefix(selection)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl Default for Test {
    fn default() -> Self {
        Test::new("", DEFAULT_POINTS, TestType::Unit)
    }
}
