#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use colored::Colorize;
use itertools::Itertools;
use similar::{ChangeTag, TextDiff};

use super::{Artifact, Compilation, DispatchError, PartialTestResult};
use crate::{
    constants::{
        APPROVED_INCLUDES_SCRIPT, COMPILES_SCRIPT, COVERAGE_SCRIPT, DEBUG_FILE, INPUT_FILE,
        MALFORMED_OUTPUT_MSSG, MEMORY_ERRORS_SCRIPT, MISSING_SCORE_MSSG, OUTPUT_FILE, SCORE_FILE,
        SCRIPT_FILE, STYLE_SCRIPT, TIMEOUT_MSSG,
    },
    process::{Collected, ProcessError, StdinSource, run_collect},
    spec::{Test, TestType},
    util::{program_path, remove_end_of_line_whitespace, split_list},
};

/// Writes `contents` to `path`.
pub fn write_file(path: PathBuf, contents: &str) -> Result<PathBuf, DispatchError> {
    fs::write(&path, contents).map_err(|source| DispatchError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Reads `path` as raw bytes.
fn read_bytes(path: &Path) -> Result<Vec<u8>, DispatchError> {
    fs::read(path).map_err(|source| DispatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Deletes `path` if it exists.
fn remove_if_exists(path: &Path) -> Result<(), DispatchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DispatchError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes the expected stdin (plus a newline) and the expected stdout of an
/// i/o test.
pub fn write_io_files(workdir: &Path, test: &Test) -> Result<Artifact, DispatchError> {
    let input = write_file(workdir.join(INPUT_FILE), &format!("{}\n", test.expected_input))?;
    let output = write_file(workdir.join(OUTPUT_FILE), &test.expected_output)?;
    Ok(Artifact {
        files:   vec![input, output],
        command: None,
    })
}

/// The helper script invocation for script-family tests other than plain
/// `script` tests, whose body is the script itself.
pub fn helper_command(test: &Test) -> Option<String> {
    let approved = test.approved_includes.join(" ");
    match test.kind {
        TestType::ApprovedIncludes => {
            Some(format!("{APPROVED_INCLUDES_SCRIPT} {} {approved}", test.target))
        }
        TestType::Coverage => Some(format!(
            "{COVERAGE_SCRIPT} {} {} {approved}",
            test.target, test.include
        )),
        TestType::Compile => Some(format!("{COMPILES_SCRIPT} {approved}")),
        TestType::MemoryErrors => Some(format!("{MEMORY_ERRORS_SCRIPT} {approved}")),
        TestType::Style => Some(format!("{STYLE_SCRIPT} {approved}")),
        _ => None,
    }
}

/// Writes `script.sh` for any script-family test.
pub fn write_script_test(workdir: &Path, test: &Test) -> Result<Artifact, DispatchError> {
    let command = helper_command(test);
    let content = command.as_deref().unwrap_or(&test.script_content);
    let script = write_file(workdir.join(SCRIPT_FILE), content)?;
    Ok(Artifact {
        files: vec![script],
        command,
    })
}

/// `target` followed by every entry of `include`, skipping empty names.
pub fn target_and_includes(test: &Test) -> Vec<OsString> {
    std::iter::once(test.target.as_str())
        .chain(split_list(&test.include))
        .filter(|name| !name.is_empty())
        .map(OsString::from)
        .collect()
}

/// Runs a build step and reports its combined output. Failing to start the
/// compiler counts as a failed build.
pub async fn compile_with(
    program: &str,
    args: Vec<OsString>,
    workdir: &Path,
) -> Result<Compilation, DispatchError> {
    let program = match program_path(program) {
        Ok(path) => path,
        Err(e) => {
            return Ok(Compilation {
                success: false,
                output:  format!("{e:#}"),
            });
        }
    };

    tracing::debug!(
        "compiling: {} {}",
        program.to_string_lossy(),
        args.iter().map(|a| a.to_string_lossy()).join(" ")
    );

    match run_collect(&program, &args, StdinSource::Null, Some(workdir), None).await {
        Ok(collected) => Ok(Compilation {
            success: collected.success(),
            output:  collected.combined(),
        }),
        Err(e @ ProcessError::Spawn { .. }) => Ok(Compilation {
            success: false,
            output:  e.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// What a run stage observed, before points are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Whether the run counts as a pass.
    pub passed:     bool,
    /// Text shown to the student.
    pub output:     String,
    /// Percentage of the points to award; negative for a penalty.
    pub multiplier: f64,
}

impl RunOutcome {
    /// A pass/fail outcome worth all or nothing.
    pub fn binary(passed: bool, output: impl Into<String>) -> Self {
        Self {
            passed,
            output: output.into(),
            multiplier: 100.0,
        }
    }

    /// A failed run worth nothing.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed:     false,
            output:     output.into(),
            multiplier: 0.0,
        }
    }
}

/// Which captured stream a harness reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output only.
    Stdout,
    /// Standard error only (Python's `unittest` reports there).
    Stderr,
    /// Standard output followed by standard error.
    Combined,
}

impl OutputStream {
    /// Picks the stream out of a finished process.
    fn select(self, collected: &Collected) -> String {
        match self {
            OutputStream::Stdout => collected.stdout_lossy(),
            OutputStream::Stderr => collected.stderr_lossy(),
            OutputStream::Combined => collected.combined(),
        }
    }
}

/// Describes how a native binary died, if its exit code says it crashed.
pub fn crash_description(code: i32) -> Option<String> {
    match code {
        -8 => Some("Floating point exception (core dumped)".to_string()),
        -11 => Some("Segmentation fault (core dumped)".to_string()),
        c if !(0..=1).contains(&c) => Some(format!("Program exited with status {c} (crashed?)")),
        _ => None,
    }
}

/// Resolves `program`, turning a lookup failure into a failed outcome.
fn resolve(program: &OsStr) -> Result<OsString, RunOutcome> {
    let name = program.to_string_lossy();
    program_path(&name).map_err(|e| RunOutcome::failed(format!("{e:#}")))
}

/// Runs a harness whose exit code decides the test: 0 passes, anything else
/// fails. Crash descriptions are appended for `native` binaries.
pub async fn run_exit_code(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    workdir: &Path,
    timeout: Duration,
    stream: OutputStream,
    native: bool,
) -> RunOutcome {
    let program = match resolve(program.as_ref()) {
        Ok(program) => program,
        Err(outcome) => return outcome,
    };

    match run_collect(&program, args, StdinSource::Null, Some(workdir), Some(timeout)).await {
        Ok(collected) => {
            let code = collected.code();
            let mut output = stream.select(&collected);
            if native && let Some(crash) = crash_description(code) {
                output.push('\n');
                output.push_str(&crash);
            }
            RunOutcome::binary(code == 0, output)
        }
        Err(e) if e.is_timeout() => RunOutcome::failed(TIMEOUT_MSSG),
        Err(e) => RunOutcome::failed(e.to_string()),
    }
}

/// Normalizes text for i/o comparison: no carriage returns, no trailing
/// whitespace on any line or at the end.
pub fn normalize_output(s: &str) -> String {
    remove_end_of_line_whitespace(s.replace('\r', "").trim_end())
}

/// Logs a colored line diff of expected against actual output.
fn log_diff(expected: &str, actual: &str) {
    let diff = TextDiff::from_lines(expected, actual);
    let rendered: String = diff
        .iter_all_changes()
        .map(|change| match change.tag() {
            ChangeTag::Equal => format!("  {change}"),
            ChangeTag::Delete => format!("{}", format!("- {change}").red()),
            ChangeTag::Insert => format!("{}", format!("+ {change}").green()),
        })
        .collect();
    tracing::debug!("expected (-) vs actual (+):\n{rendered}");
}

/// Feeds `input.txt` to a program and compares its stdout with
/// `output.txt`. The message always shows input, actual, and expected
/// output.
pub async fn run_io(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    workdir: &Path,
    timeout: Duration,
) -> Result<RunOutcome, DispatchError> {
    let input = read_bytes(&workdir.join(INPUT_FILE))?;
    let program = match resolve(program.as_ref()) {
        Ok(program) => program,
        Err(outcome) => return Ok(outcome),
    };

    let stdin = StdinSource::Bytes(input.clone());
    let collected =
        match run_collect(&program, args, stdin, Some(workdir), Some(timeout)).await {
            Ok(collected) => collected,
            Err(e) if e.is_timeout() => return Ok(RunOutcome::failed(TIMEOUT_MSSG)),
            Err(e) => return Ok(RunOutcome::failed(e.to_string())),
        };

    let expected = read_bytes(&workdir.join(OUTPUT_FILE))?;
    let expected = normalize_output(&String::from_utf8_lossy(&expected));
    let actual = normalize_output(&collected.stdout_lossy());
    let input = String::from_utf8_lossy(&input);

    let message = format!(
        "The input:\n{}\n\nYour output:\n{actual}\n\nExpected output:\n{expected}\n\n",
        input.trim_end()
    );

    let passed = actual == expected;
    if !passed {
        log_diff(&expected, &actual);
    }
    Ok(RunOutcome::binary(passed, message))
}

/// A file a helper script may have left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFile {
    /// The script did not write it.
    Missing,
    /// It exists but is not valid UTF-8.
    Malformed,
    /// Its contents.
    Text(String),
}

/// Reads a file a helper script left behind.
fn read_script_file(path: &Path) -> Result<ScriptFile, DispatchError> {
    if !path.exists() {
        return Ok(ScriptFile::Missing);
    }
    let bytes = read_bytes(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => ScriptFile::Text(text),
        Err(_) => ScriptFile::Malformed,
    })
}

/// Runs `script.sh` with `args` and reads the percentage it wrote to
/// `OUTPUT`, plus any diagnostics it wrote to `DEBUG`.
pub async fn run_script(
    workdir: &Path,
    args: &str,
    timeout: Duration,
) -> Result<RunOutcome, DispatchError> {
    let score_file = workdir.join(SCORE_FILE);
    let debug_file = workdir.join(DEBUG_FILE);
    remove_if_exists(&debug_file)?;
    remove_if_exists(&score_file)?;

    let bash = match resolve(OsStr::new("bash")) {
        Ok(bash) => bash,
        Err(outcome) => return Ok(outcome),
    };
    let command = format!("bash ./{SCRIPT_FILE} {args}");
    let shell_args = [OsString::from("-c"), OsString::from(command.trim_end())];

    match run_collect(
        &bash,
        &shell_args,
        StdinSource::Bytes(Vec::new()),
        Some(workdir),
        Some(timeout),
    )
    .await
    {
        Ok(collected) => {
            tracing::debug!("{SCRIPT_FILE} exited with {}", collected.code());
            let out = collected.combined();
            if !out.trim().is_empty() {
                tracing::debug!("{SCRIPT_FILE} output:\n{}", out.trim_end());
            }
        }
        Err(e) if e.is_timeout() => return Ok(RunOutcome::failed(TIMEOUT_MSSG)),
        Err(e) => return Ok(RunOutcome::failed(e.to_string())),
    }

    let raw_score = match read_script_file(&score_file)? {
        ScriptFile::Missing => {
            tracing::error!("{SCORE_FILE} does not exist.");
            return Ok(RunOutcome::failed(MISSING_SCORE_MSSG));
        }
        ScriptFile::Malformed => return Ok(RunOutcome::failed(MALFORMED_OUTPUT_MSSG)),
        ScriptFile::Text(raw) => raw,
    };

    let debug = match read_script_file(&debug_file)? {
        ScriptFile::Missing => String::new(),
        ScriptFile::Malformed => return Ok(RunOutcome::failed(MALFORMED_OUTPUT_MSSG)),
        ScriptFile::Text(debug) => format!("Debug:\n{debug}"),
    };

    match raw_score.trim().parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(RunOutcome {
            passed:     score > 0.0,
            output:     debug,
            multiplier: score,
        }),
        _ => Ok(RunOutcome::failed(format!(
            "{debug}Malformed score in {SCORE_FILE}: `{}`\n",
            raw_score.trim()
        ))),
    }
}

/// Points earned by `outcome`: a share of the test's points for a pass, the
/// multiplier itself for a failed run with a negative multiplier (a
/// penalty), and nothing otherwise.
pub fn points_for(test: &Test, outcome: &RunOutcome) -> f64 {
    if outcome.passed {
        test.points * (outcome.multiplier / 100.0)
    } else if outcome.multiplier < 0.0 {
        outcome.multiplier
    } else {
        0.0
    }
}

/// Scores `outcome` and raises the submission-wide flags its test kind can
/// trip.
pub fn into_partial(test: &Test, outcome: RunOutcome, started: Instant) -> PartialTestResult {
    let points = points_for(test, &outcome);
    PartialTestResult {
        unapproved_includes: test.kind == TestType::ApprovedIncludes && !outcome.passed,
        sufficient_coverage: !(test.kind == TestType::Coverage && !outcome.passed),
        points,
        run_time: started.elapsed(),
        passed: outcome.passed,
        run_output: outcome.output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_of(kind: TestType, points: f64) -> Test {
        Test::new("t", points, kind)
    }

    #[test]
    fn script_files_are_missing_malformed_or_text() {
        let dir = std::env::temp_dir().join(format!("specgrade-common-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let path = dir.join(SCORE_FILE);
        assert_eq!(read_script_file(&path).unwrap(), ScriptFile::Missing);
        fs::write(&path, [0xff, 0xfe, b'5']).unwrap();
        assert_eq!(read_script_file(&path).unwrap(), ScriptFile::Malformed);
        fs::write(&path, "75\n").unwrap();
        assert_eq!(read_script_file(&path).unwrap(), ScriptFile::Text("75\n".into()));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn crash_codes_are_described() {
        assert_eq!(
            crash_description(-11).as_deref(),
            Some("Segmentation fault (core dumped)")
        );
        assert_eq!(
            crash_description(-8).as_deref(),
            Some("Floating point exception (core dumped)")
        );
        assert_eq!(
            crash_description(134).as_deref(),
            Some("Program exited with status 134 (crashed?)")
        );
        assert_eq!(crash_description(0), None);
        assert_eq!(crash_description(1), None);
    }

    #[test]
    fn output_normalization_ignores_trailing_whitespace() {
        assert_eq!(normalize_output("hello  \r\nworld\t\n\n"), "hello\nworld");
        assert_eq!(normalize_output("hello\n"), normalize_output("hello"));
    }

    #[test]
    fn points_follow_multiplier_and_penalties() {
        let test = test_of(TestType::Script, 10.0);
        let half = RunOutcome {
            passed:     true,
            output:     String::new(),
            multiplier: 50.0,
        };
        assert_eq!(points_for(&test, &half), 5.0);

        let penalty = RunOutcome {
            passed:     false,
            output:     String::new(),
            multiplier: -3.0,
        };
        assert_eq!(points_for(&test, &penalty), -3.0);
        assert_eq!(points_for(&test, &RunOutcome::failed("")), 0.0);
        assert_eq!(points_for(&test, &RunOutcome::binary(true, "")), 10.0);
    }

    #[test]
    fn helper_commands_pass_lists_positionally() {
        let mut test = test_of(TestType::ApprovedIncludes, 1.0);
        test.target = "list.h".into();
        test.approved_includes = vec!["<vector>".into(), "<string>".into()];
        assert_eq!(
            helper_command(&test).as_deref(),
            Some("./approved_includes.sh list.h <vector> <string>")
        );

        let mut test = test_of(TestType::Coverage, 1.0);
        test.target = "list.h".into();
        test.include = "main.cpp".into();
        test.approved_includes = vec!["list.cpp".into()];
        assert_eq!(
            helper_command(&test).as_deref(),
            Some("./coverage.sh list.h main.cpp list.cpp")
        );

        assert_eq!(helper_command(&test_of(TestType::Script, 1.0)), None);
    }

    #[test]
    fn failed_gates_raise_submission_flags() {
        let started = Instant::now();
        let gate = into_partial(
            &test_of(TestType::ApprovedIncludes, 1.0),
            RunOutcome::failed(""),
            started,
        );
        assert!(gate.unapproved_includes);
        assert!(gate.sufficient_coverage);

        let coverage =
            into_partial(&test_of(TestType::Coverage, 1.0), RunOutcome::failed(""), started);
        assert!(!coverage.sufficient_coverage);
        assert!(!coverage.unapproved_includes);
    }
}
