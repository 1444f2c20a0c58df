#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use colored::Colorize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use typed_builder::TypedBuilder;

use crate::{
    backend::{
        Backend, DispatchError, Language, PartialTestResult, cpp::CppBackend, java::JavaBackend,
        python::PythonBackend, sql::SqlBackend,
    },
    config::Config,
    constants::{
        FAILED_TO_COMPILE_MSSG, INFO_UNSUPPORTED_TEST, INSUFFICIENT_COVERAGE_MSSG,
        OUTPUT_HIDDEN_MSSG, UNAPPROVED_INCLUDES_MSSG,
    },
    gradescope::{GradescopeStatus, GradescopeSubmission, GradescopeTestCase},
    spec::{SpecError, Test, parse_tests},
};

/// Knobs for a grading run.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct GradeOptions {
    /// Disclose every test's output regardless of `@show_output`.
    #[builder(default)]
    pub debug:     bool,
    /// Test number prefix to run; `*` runs everything.
    #[builder(default = String::from("*"), setter(into))]
    pub selection: String,
}

impl Default for GradeOptions {
    fn default() -> Self {
        GradeOptions::builder().build()
    }
}

/// Marks every test not named by `selection` as skipped, and every test it
/// names as not skipped. `*` leaves `@skip` annotations alone.
pub fn select_tests(tests: &mut [Test], selection: &str) {
    if selection == "*" {
        return;
    }
    for test in tests {
        test.skip = !test.is_selected_by(selection);
    }
}

/// Rounds half up to four decimal places.
pub fn round_score(score: f64) -> f64 {
    (score * 10000.0 + 0.5).floor() / 10000.0
}

/// Running totals of a grading run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tally {
    /// Points earned so far, penalties included.
    pub total:               f64,
    /// Points available from the tests run so far.
    pub possible:            f64,
    /// Seconds spent running tests.
    pub execution_time:      f64,
    /// Set once any approved-includes check fails; never cleared.
    pub unapproved_includes: bool,
    /// Cleared once any coverage check fails; never set again.
    pub sufficient_coverage: bool,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            total:               0.0,
            possible:            0.0,
            execution_time:      0.0,
            unapproved_includes: false,
            sufficient_coverage: true,
        }
    }
}

impl Tally {
    /// Folds the result of one run stage into the totals.
    pub fn record(&mut self, partial: &PartialTestResult) {
        self.total += partial.points;
        self.execution_time += partial.run_time.as_secs_f64();
        self.unapproved_includes |= partial.unapproved_includes;
        self.sufficient_coverage &= partial.sufficient_coverage;
    }

    /// True if a submission-wide check failed.
    pub fn zeroed(&self) -> bool {
        self.unapproved_includes || !self.sufficient_coverage
    }

    /// The score to report: the rounded total, or zero when a
    /// submission-wide check failed.
    pub fn recorded_score(&self) -> f64 {
        if self.zeroed() {
            0.0
        } else {
            round_score(self.total)
        }
    }

    /// Explanation appended to the submission output.
    pub fn notices(&self) -> String {
        let mut out = String::new();
        if self.unapproved_includes {
            out.push_str(UNAPPROVED_INCLUDES_MSSG);
        }
        if !self.sufficient_coverage {
            out.push_str(INSUFFICIENT_COVERAGE_MSSG);
        }
        out
    }
}

/// Status of a test that ran.
pub fn status_for(partial: &PartialTestResult, max_points: f64) -> GradescopeStatus {
    if !partial.passed || partial.unapproved_includes || !partial.sufficient_coverage {
        GradescopeStatus::Failed
    } else if partial.points >= max_points {
        GradescopeStatus::Passed
    } else if partial.points > 0.0 {
        GradescopeStatus::Partial
    } else {
        GradescopeStatus::Failed
    }
}

/// What the student gets to see of a test's compile and run output.
pub fn disclose(
    test: &Test,
    compile_output: &str,
    run_output: &str,
    failed_to_compile: bool,
    debug: bool,
) -> String {
    if test.show_output || debug {
        let compile_output = compile_output.trim();
        let run_output = run_output.trim();
        let mut out = compile_output.to_string();
        if !compile_output.is_empty() && !run_output.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(run_output);
        out
    } else if failed_to_compile {
        format!("{FAILED_TO_COMPILE_MSSG}\n{OUTPUT_HIDDEN_MSSG}")
    } else {
        OUTPUT_HIDDEN_MSSG.to_string()
    }
}

/// Logs how a run went.
fn log_outcome(partial: &PartialTestResult, max_points: f64) {
    if partial.passed {
        let share = if max_points > 0.0 {
            partial.points / max_points * 100.0
        } else {
            100.0
        };
        if share < 100.0 {
            tracing::info!(
                "[PASS - PARTIAL] ran partially correct and received {share:0.2}% partial credit"
            );
        } else {
            tracing::info!("[PASS] ran correctly");
        }
    } else if partial.points < 0.0 {
        tracing::info!("[FAIL] penalty applied");
    } else {
        tracing::info!("[FAIL] incorrect behavior");
    }
}

/// Drives one test through write, compile, and run. Returns the reported
/// test case and, if the run stage was reached, its result.
async fn grade_one<B: Backend>(
    backend: &B,
    test: &Test,
    debug: bool,
) -> Result<(GradescopeTestCase, Option<PartialTestResult>), DispatchError> {
    let case = GradescopeTestCase::builder()
        .number(test.number.clone())
        .name(test.name.clone())
        .max_score(test.points)
        .visibility(test.visibility);

    if !backend.supports(test) {
        return Err(backend.unsupported(test));
    }

    let artifact = backend.write(test)?;
    if let Some(command) = &artifact.command {
        tracing::debug!("generated script: {command}");
    }

    let compilation = backend.compile(test).await?;
    if !compilation.success {
        tracing::info!("[FAIL] failed to compile");
        let output = disclose(test, &compilation.output, "", true, debug);
        let case = case
            .score(0.0)
            .status(Some(GradescopeStatus::Failed))
            .output(output)
            .build();
        return Ok((case, None));
    }

    let partial = backend.run(test).await?;
    log_outcome(&partial, test.points);
    let output = disclose(test, &compilation.output, &partial.run_output, false, debug);
    let case = case
        .score(partial.points)
        .status(Some(status_for(&partial, test.points)))
        .output(output)
        .build();
    Ok((case, Some(partial)))
}

/// A failed test case for a test the dispatch protocol could not handle.
fn dispatch_failure(test: &Test, error: &DispatchError) -> GradescopeTestCase {
    let output = if error.is_unsupported() {
        format!("{INFO_UNSUPPORTED_TEST}: {error}")
    } else {
        error.to_string()
    };
    GradescopeTestCase::builder()
        .number(test.number.clone())
        .name(test.name.clone())
        .score(0.0)
        .max_score(test.points)
        .status(Some(GradescopeStatus::Failed))
        .output(output)
        .visibility(test.visibility)
        .build()
}

/// Grades `tests` in order with `backend` and assembles the result
/// document.
pub async fn grade_with<B: Backend>(
    backend: &B,
    mut tests: Vec<Test>,
    options: &GradeOptions,
) -> GradescopeSubmission {
    select_tests(&mut tests, &options.selection);

    let mut tally = Tally::default();
    let mut cases = Vec::new();
    for test in tests.iter().filter(|t| !t.skip) {
        tally.possible += test.points;
        tracing::info!("test {}: {}", test.number, test.name);

        match grade_one(backend, test, options.debug).await {
            Ok((case, partial)) => {
                if let Some(partial) = &partial {
                    tally.record(partial);
                }
                cases.push(case);
            }
            Err(e) => {
                if e.is_unsupported() {
                    tracing::warn!("{INFO_UNSUPPORTED_TEST}: {e}");
                } else {
                    tracing::error!("test {} could not be graded: {e}", test.number);
                }
                cases.push(dispatch_failure(test, &e));
            }
        }
    }

    print_overview(&cases, &tally);

    GradescopeSubmission::builder()
        .score(tally.recorded_score())
        .output(tally.notices())
        .execution_time(tally.execution_time)
        .tests(cases)
        .build()
}

/// Reads the specification at `spec_path` and grades it with the backend for
/// `language`, working in `workdir`. File names inside test bodies resolve
/// against `workdir` too.
///
/// Never fails: a specification that cannot be read becomes a zero-score
/// submission whose output is the error.
pub async fn grade(
    spec_path: &Path,
    language: Language,
    config: Config,
    workdir: &Path,
    options: &GradeOptions,
) -> GradescopeSubmission {
    let tests = match std::fs::read_to_string(spec_path)
        .map_err(|source| SpecError::Io {
            path: spec_path.to_path_buf(),
            source,
        })
        .and_then(|source| parse_tests(&spec_path.display().to_string(), &source, workdir))
    {
        Ok(tests) => tests,
        Err(e) => {
            tracing::error!("Error occurred while reading tests:\n{e}");
            return GradescopeSubmission::failed(e.to_string());
        }
    };

    match language {
        Language::Cpp => grade_with(&CppBackend::new(config, workdir), tests, options).await,
        Language::Java => grade_with(&JavaBackend::new(config, workdir), tests, options).await,
        Language::Python => grade_with(&PythonBackend::new(config, workdir), tests, options).await,
        Language::Sql => grade_with(&SqlBackend::new(config, workdir), tests, options).await,
    }
}

/// A row of the console overview.
#[derive(Tabled)]
struct OverviewRow {
    /// Test number.
    #[tabled(rename = "Test")]
    number: String,
    /// Test name.
    #[tabled(rename = "Name")]
    name:   String,
    /// Colored status.
    #[tabled(rename = "Status")]
    status: String,
    /// Score out of max.
    #[tabled(rename = "Score")]
    score:  String,
}

impl From<&GradescopeTestCase> for OverviewRow {
    fn from(case: &GradescopeTestCase) -> Self {
        let status = match case.status {
            Some(GradescopeStatus::Passed) => "PASS".green().to_string(),
            Some(GradescopeStatus::Partial) => "PARTIAL".yellow().to_string(),
            Some(GradescopeStatus::Failed) | None => "FAIL".red().to_string(),
        };
        Self {
            number: case.number.clone(),
            name: case.name.clone(),
            status,
            score: format!("{:.2}/{:.2}", case.score, case.max_score),
        }
    }
}

/// Prints the grading overview table to stderr.
fn print_overview(cases: &[GradescopeTestCase], tally: &Tally) {
    let rows: Vec<OverviewRow> = cases.iter().map(OverviewRow::from).collect();
    let footer = if tally.zeroed() {
        format!(
            "Total: ~{:.2}~ {:.2}/{:.2}",
            round_score(tally.total),
            tally.recorded_score(),
            tally.possible
        )
    } else {
        format!("Total: {:.2}/{:.2}", tally.recorded_score(), tally.possible)
    };

    eprintln!(
        "{}",
        Table::new(&rows)
            .with(Panel::header("Grading Overview"))
            .with(Panel::footer(footer))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(32).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
    );

    if tally.unapproved_includes {
        eprintln!("{}", "!!! ZERO DUE TO UNAPPROVED INCLUDES".red().bold());
    }
    if !tally.sufficient_coverage {
        eprintln!("{}", "!!! ZERO DUE TO INSUFFICIENT COVERAGE".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::spec::TestType;

    fn partial(points: f64, passed: bool) -> PartialTestResult {
        PartialTestResult {
            run_output: String::new(),
            unapproved_includes: false,
            sufficient_coverage: true,
            points,
            run_time: Duration::from_millis(250),
            passed,
        }
    }

    #[test]
    fn rounding_is_half_up_at_four_places() {
        assert_eq!(round_score(83.33335), 83.3334);
        assert_eq!(round_score(83.33324), 83.3332);
        assert_eq!(round_score(10.0), 10.0);
    }

    #[test]
    fn status_follows_points() {
        assert_eq!(status_for(&partial(5.0, true), 5.0), GradescopeStatus::Passed);
        assert_eq!(status_for(&partial(2.5, true), 5.0), GradescopeStatus::Partial);
        assert_eq!(status_for(&partial(0.0, false), 5.0), GradescopeStatus::Failed);
        assert_eq!(status_for(&partial(-2.0, false), 5.0), GradescopeStatus::Failed);
        assert_eq!(status_for(&partial(0.0, true), 0.0), GradescopeStatus::Passed);
        assert_eq!(status_for(&partial(0.0, false), 0.0), GradescopeStatus::Failed);
    }

    #[test]
    fn failed_gates_force_failure_and_zero_the_submission() {
        let mut gate = partial(1.0, true);
        gate.unapproved_includes = true;
        assert_eq!(status_for(&gate, 1.0), GradescopeStatus::Failed);

        let mut tally = Tally::default();
        tally.record(&partial(10.0, true));
        assert_eq!(tally.recorded_score(), 10.0);
        tally.record(&gate);
        tally.record(&partial(3.0, true));
        assert!(tally.unapproved_includes);
        assert_eq!(tally.total, 14.0);
        assert_eq!(tally.recorded_score(), 0.0);
        assert_eq!(tally.notices(), UNAPPROVED_INCLUDES_MSSG);
        assert!((tally.execution_time - 0.75).abs() < 1e-9);
    }

    #[test]
    fn failed_coverage_zeroes_the_submission() {
        let mut coverage = partial(0.0, false);
        coverage.sufficient_coverage = false;
        assert_eq!(status_for(&coverage, 0.0), GradescopeStatus::Failed);

        let mut tally = Tally::default();
        tally.record(&coverage);
        tally.record(&partial(10.0, true));
        assert!(!tally.sufficient_coverage);
        assert!(tally.zeroed());
        assert_eq!(tally.total, 10.0);
        assert_eq!(tally.recorded_score(), 0.0);
        assert_eq!(tally.notices(), INSUFFICIENT_COVERAGE_MSSG);
    }

    #[test]
    fn hidden_output_mentions_compile_failure() {
        let test = Test::new("t", 1.0, TestType::Unit);
        assert_eq!(disclose(&test, "error", "", false, false), OUTPUT_HIDDEN_MSSG);
        assert_eq!(
            disclose(&test, "error", "", true, false),
            "Failed to compile.\nOutput is intentionally hidden"
        );
        assert_eq!(disclose(&test, " warn \n", "ran\n", false, true), "warn\n\nran");
        assert_eq!(disclose(&test, "", "ran\n", false, true), "ran");
    }

    #[test]
    fn selection_skips_other_numbers() {
        let mut tests: Vec<Test> = ["5", "5.2", "52", "6"]
            .into_iter()
            .map(|n| {
                let mut test = Test::default();
                test.number = n.to_string();
                test
            })
            .collect();
        select_tests(&mut tests, "5");
        let skipped: Vec<bool> = tests.iter().map(|t| t.skip).collect();
        assert_eq!(skipped, vec![false, false, true, true]);

        tests[3].skip = true;
        select_tests(&mut tests, "*");
        let skipped: Vec<bool> = tests.iter().map(|t| t.skip).collect();
        assert_eq!(skipped, vec![false, false, true, true]);
    }
}
