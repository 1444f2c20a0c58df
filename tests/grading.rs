#![cfg(unix)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use specgrade::{
    Config, GradeOptions,
    backend::{Backend, Language, cpp::CppBackend},
    constants::{
        INFO_UNSUPPORTED_TEST, INSUFFICIENT_COVERAGE_MSSG, TIMEOUT_MSSG,
        UNAPPROVED_INCLUDES_MSSG,
    },
    grade,
    gradescope::{GradescopeStatus, GradescopeSubmission, write_results},
    spec::{Test, TestType},
};
use uuid::Uuid;

/// Stands in for `g++`: "compiles" by copying `program.sh` to the `-o`
/// target, or fails when `FAIL_BUILD` exists.
const FAKE_CXX: &str = r#"#!/bin/bash
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
if [ -e FAIL_BUILD ]; then
  echo "error: expected ';' before '}' token" >&2
  exit 1
fi
cp program.sh "$out"
chmod +x "$out"
"#;

fn workdir() -> PathBuf {
    let root = std::env::temp_dir().join(format!("specgrade-grade-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create workdir");
    root
}

fn write_executable(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write executable");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

fn config(dir: &Path) -> Config {
    let cxx = dir.join("fake-cxx.sh");
    write_executable(&cxx, FAKE_CXX);
    Config::default().with_cxx(cxx.to_string_lossy())
}

async fn grade_spec(dir: &Path, spec: &str, options: &GradeOptions) -> GradescopeSubmission {
    let spec_path = dir.join("tests.txt");
    fs::write(&spec_path, spec).expect("write spec");
    grade(&spec_path, Language::Cpp, config(dir), dir, options).await
}

#[tokio::test]
async fn script_partial_credit_scales_points() {
    let dir = workdir();
    fs::write(dir.join("half.sh"), "echo 50 > OUTPUT\necho 'half done' > DEBUG\n")
        .expect("write script");
    let spec = "/*\n@number: 1\n@name: half credit\n@points: 10\n@type: script\n\
                @show_output: true\n*/\n<test>\nhalf.sh\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    assert_eq!(submission.score, 5.0);
    assert_eq!(submission.tests.len(), 1);
    let case = &submission.tests[0];
    assert_eq!(case.score, 5.0);
    assert_eq!(case.max_score, 10.0);
    assert_eq!(case.status, Some(GradescopeStatus::Partial));
    assert_eq!(case.output, "Debug:\nhalf done");
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn unapproved_includes_zero_the_submission() {
    let dir = workdir();
    write_executable(&dir.join("approved_includes.sh"), "#!/bin/bash\necho 0 > OUTPUT\n");
    fs::write(dir.join("full.sh"), "echo 100 > OUTPUT\n").expect("write script");
    let spec = "/*\n@number: 1\n@name: includes\n@points: 0\n@type: approved_includes\n\
                @target: calc.h\n*/\n<test>\niostream\nstring\n</test>\n\n/*\n@number: 2\n@name: \
                full marks\n@points: 10\n@type: script\n*/\n<test>\nfull.sh\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    assert_eq!(submission.score, 0.0);
    assert_eq!(submission.output, UNAPPROVED_INCLUDES_MSSG);
    assert_eq!(submission.tests[0].status, Some(GradescopeStatus::Failed));
    assert_eq!(submission.tests[1].status, Some(GradescopeStatus::Passed));
    assert_eq!(submission.tests[1].score, 10.0);
    assert_eq!(
        fs::read_to_string(dir.join("script.sh")).expect("read script"),
        "echo 100 > OUTPUT\n"
    );
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn insufficient_coverage_zeroes_the_submission() {
    let dir = workdir();
    write_executable(
        &dir.join("coverage.sh"),
        "#!/bin/bash\necho \"$@\" > ARGS\necho 0 > OUTPUT\n",
    );
    fs::write(dir.join("full.sh"), "echo 100 > OUTPUT\n").expect("write script");
    let spec = "/*\n@number: 1\n@name: coverage\n@points: 0\n@type: coverage\n\
                @target: list.h\n*/\n<test>\nsource: list.cpp\nmain: main.cpp\n</test>\n\n/*\n\
                @number: 2\n@name: full marks\n@points: 10\n@type: script\n*/\n<test>\nfull.sh\n\
                </test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    assert_eq!(submission.score, 0.0);
    assert_eq!(submission.output, INSUFFICIENT_COVERAGE_MSSG);
    assert_eq!(submission.tests[0].status, Some(GradescopeStatus::Failed));
    assert_eq!(submission.tests[1].status, Some(GradescopeStatus::Passed));
    assert_eq!(submission.tests[1].score, 10.0);
    assert_eq!(
        fs::read_to_string(dir.join("ARGS")).expect("read arguments"),
        "list.h main.cpp list.cpp\n"
    );
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn malformed_specification_produces_zero_score() {
    let dir = workdir();
    let spec = "/*\n@name: a\n@points: 1\n@type: unit\n@target: a.h\n<test>\nx\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    assert_eq!(submission.score, 0.0);
    assert!(submission.tests.is_empty());
    assert!(
        submission
            .output
            .contains("missing expected end of multiline comment")
    );
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn io_test_passes_after_whitespace_normalization() {
    let dir = workdir();
    write_executable(&dir.join("program.sh"), "#!/bin/bash\nexec cat\n");
    fs::write(dir.join("in.txt"), "hello\n").expect("write input");
    fs::write(dir.join("out.txt"), "hello").expect("write output");
    let spec = "/*\n@number: 1\n@name: echo\n@points: 3\n@type: i/o\n@target: echo.cpp\n\
                @show_output: true\n*/\n<test>\ninput: in.txt\noutput: out.txt\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    let case = &submission.tests[0];
    assert_eq!(case.status, Some(GradescopeStatus::Passed));
    assert_eq!(case.score, 3.0);
    assert_eq!(
        case.output,
        "The input:\nhello\n\nYour output:\nhello\n\nExpected output:\nhello"
    );
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn timed_out_unit_test_reports_canned_message() {
    let dir = workdir();
    write_executable(&dir.join("program.sh"), "#!/bin/bash\nexec sleep 5\n");
    let backend = CppBackend::new(config(&dir), &dir);

    let mut test = Test::new("loops", 4.0, TestType::Unit);
    test.target = "calc.h".into();
    test.code = "while (true) {}\n".into();
    test.timeout = 0.5;

    backend.write(&test).expect("write");
    assert!(dir.join("unit_test.cpp").exists());
    let compilation = backend.compile(&test).await.expect("compile");
    assert!(compilation.success, "{}", compilation.output);

    let partial = backend.run(&test).await.expect("run");
    assert_eq!(partial.run_output, TIMEOUT_MSSG);
    assert_eq!(partial.points, 0.0);
    assert!(!partial.passed);
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn crashing_binary_is_described() {
    let dir = workdir();
    write_executable(&dir.join("program.sh"), "#!/bin/bash\necho before\nkill -SEGV $$\n");
    let spec = "/*\n@name: crashes\n@points: 2\n@type: unit\n@target: calc.h\n\
                @show_output: true\n*/\n<test>\nint* p = nullptr; *p = 1;\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    let case = &submission.tests[0];
    assert_eq!(case.status, Some(GradescopeStatus::Failed));
    assert!(case.output.contains("before"));
    assert!(case.output.ends_with("Segmentation fault (core dumped)"));
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn compile_failure_hides_output_unless_debugging() {
    let dir = workdir();
    fs::write(dir.join("FAIL_BUILD"), "").expect("write marker");
    let spec = "/*\n@name: broken\n@points: 2\n@type: unit\n@target: calc.h\n*/\n<test>\nx\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;
    assert_eq!(submission.tests[0].status, Some(GradescopeStatus::Failed));
    assert_eq!(
        submission.tests[0].output,
        "Failed to compile.\nOutput is intentionally hidden"
    );

    let debug = GradeOptions::builder().debug(true).build();
    let submission = grade_spec(&dir, spec, &debug).await;
    assert_eq!(
        submission.tests[0].output,
        "error: expected ';' before '}' token"
    );
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn unsupported_tests_fail_without_stopping_the_run() {
    let dir = workdir();
    fs::write(dir.join("full.sh"), "echo 100 > OUTPUT\n").expect("write script");
    let spec = "/*\n@number: 1\n@name: style\n@points: 2\n@type: style\n*/\n<test>\ncalc.cpp\n\
                </test>\n\n/*\n@number: 2\n@name: runs\n@points: 3\n@type: script\n*/\n<test>\n\
                full.sh\n</test>\n";

    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    assert_eq!(submission.tests.len(), 2);
    assert!(submission.tests[0].output.starts_with(INFO_UNSUPPORTED_TEST));
    assert_eq!(submission.tests[0].score, 0.0);
    assert_eq!(submission.tests[0].max_score, 2.0);
    assert_eq!(submission.tests[1].score, 3.0);
    assert_eq!(submission.score, 3.0);
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn selection_and_penalties() {
    let dir = workdir();
    fs::write(dir.join("full.sh"), "echo 100 > OUTPUT\n").expect("write script");
    fs::write(dir.join("penalty.sh"), "echo -2 > OUTPUT\n").expect("write script");
    fs::write(dir.join("silent.sh"), "exit 0\n").expect("write script");
    let spec = "/*\n@number: 1\n@name: skipped\n@points: 7\n@type: script\n*/\n<test>\nfull.sh\n\
                </test>\n/*\n@number: 2.1\n@name: full\n@points: 5\n@type: script\n*/\n<test>\n\
                full.sh\n</test>\n/*\n@number: 2.2\n@name: late\n@points: 0\n@type: script\n*/\n\
                <test>\npenalty.sh\n</test>\n/*\n@number: 2.3\n@name: no score\n@points: 1\n\
                @type: script\n@show_output: true\n*/\n<test>\nsilent.sh\n</test>\n";

    let options = GradeOptions::builder().selection("2").build();
    let submission = grade_spec(&dir, spec, &options).await;

    let numbers: Vec<&str> = submission.tests.iter().map(|t| t.number.as_str()).collect();
    assert_eq!(numbers, vec!["2.1", "2.2", "2.3"]);
    assert_eq!(submission.tests[1].score, -2.0);
    assert_eq!(submission.tests[1].status, Some(GradescopeStatus::Failed));
    assert_eq!(submission.tests[2].output, "test failed to run");
    assert_eq!(submission.score, 3.0);
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn python_unit_test_reports_stderr_and_exit_code() {
    let dir = workdir();
    // `-m py_compile` always succeeds; running UnitTest.py fails the test.
    let python = dir.join("fake-python.sh");
    write_executable(
        &python,
        "#!/bin/bash\nif [ \"$1\" = \"-m\" ]; then exit 0; fi\necho 'FAIL: test_1' >&2\nexit 1\n",
    );
    fs::write(
        dir.join("tests.txt"),
        "/*\n@name: adds\n@points: 2\n@type: unit\n@target: calc.py\n@show_output: true\n*/\n\
         <test>\nself.assertEqual(add(1, 2), 3)\n</test>\n",
    )
    .expect("write spec");

    let config = Config::default().with_python(python.to_string_lossy());
    let submission = grade(
        &dir.join("tests.txt"),
        Language::Python,
        config,
        &dir,
        &GradeOptions::default(),
    )
    .await;

    let case = &submission.tests[0];
    assert_eq!(case.status, Some(GradescopeStatus::Failed));
    assert_eq!(case.output, "FAIL: test_1");
    let harness = fs::read_to_string(dir.join("UnitTest.py")).expect("read harness");
    assert!(harness.contains("from calc import *"));
    assert!(harness.contains("        self.assertEqual(add(1, 2), 3)\n"));
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn sql_check_without_client_fails_the_test() {
    let dir = workdir();
    fs::write(
        dir.join("tests.txt"),
        "/*\n@name: creates db\n@points: 1\n@type: unit\n@target: answer.sql\n\
         @show_output: true\n*/\n<test>\ntype: db_name\ndatabase: shop\n</test>\n",
    )
    .expect("write spec");

    let config = Config::default()
        .with_sql_start_command(None)
        .with_mysql("/nonexistent/mysql");
    let submission = grade(
        &dir.join("tests.txt"),
        Language::Sql,
        config,
        &dir,
        &GradeOptions::default(),
    )
    .await;

    let case = &submission.tests[0];
    assert_eq!(case.status, Some(GradescopeStatus::Failed));
    assert_eq!(case.score, 0.0);
    assert!(!case.output.is_empty());
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn results_are_written_with_four_space_indent() {
    let dir = workdir();
    fs::write(dir.join("full.sh"), "echo 100 > OUTPUT\n").expect("write script");
    let spec = "/*\n@number: 1\n@name: full\n@points: 1\n@type: script\n@visibility: hidden\n*/\n\
                <test>\nfull.sh\n</test>\n";
    let submission = grade_spec(&dir, spec, &GradeOptions::default()).await;

    let path = dir.join("results").join("results.json");
    write_results(&path, &submission).expect("write results");
    let text = fs::read_to_string(&path).expect("read results");
    assert!(text.starts_with("{\n    \"score\": 1.0,"));

    let json: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(json["visibility"], "visible");
    assert_eq!(json["tests"][0]["visibility"], "hidden");
    assert_eq!(json["tests"][0]["status"], "passed");
    assert_eq!(json["tests"][0]["output"], "Output is intentionally hidden");
    assert_eq!(json["tests"][0]["extra_data"], serde_json::json!({}));
    let _ = fs::remove_dir_all(dir);
}
