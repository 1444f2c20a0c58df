#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Instant,
};

use itertools::Itertools;

use super::{
    Artifact, Backend, Compilation, DispatchError, Language, PartialTestResult,
    common::{
        OutputStream, compile_with, into_partial, run_exit_code, run_io, run_script,
        target_and_includes, write_file, write_io_files, write_script_test,
    },
};
use crate::{
    config::Config,
    spec::{Test, TestType},
};

/// Source of a unit test harness.
const UNIT_TEST_SOURCE: &str = "UnitTest.java";
/// Runner that executes `UnitTest` through JUnit; provided by the grading
/// image.
const UNIT_TEST_RUNNER_SOURCE: &str = "UnitTestRunner.java";
/// Class name of [`UNIT_TEST_RUNNER_SOURCE`].
const UNIT_TEST_RUNNER_CLASS: &str = "UnitTestRunner";
/// Shared JUnit listener; provided by the grading image.
const TEST_RUNNER_SOURCE: &str = "TestRunner.java";
/// Source of a performance test harness.
const PERFORMANCE_TEST_SOURCE: &str = "PerformanceTest.java";
/// Class name of [`PERFORMANCE_TEST_SOURCE`].
const PERFORMANCE_TEST_CLASS: &str = "PerformanceTest";

/// Grades Java submissions with `javac` and JUnit 4.
#[derive(Debug, Clone)]
pub struct JavaBackend {
    /// Toolchain configuration.
    config:  Config,
    /// Working directory for artifacts.
    workdir: PathBuf,
}

/// Converts `Code.java` into `Code`.
fn class_name(file_name: &str) -> &str {
    file_name.strip_suffix(".java").unwrap_or(file_name)
}

impl JavaBackend {
    /// Creates a backend writing into `workdir`.
    pub fn new(config: Config, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            config,
            workdir: std::path::absolute(&workdir).unwrap_or(workdir),
        }
    }

    /// Harness for a unit test: a JUnit 4 test case with a single method.
    pub fn unit_test_source(test: &Test) -> String {
        format!(
            "import static org.hamcrest.MatcherAssert.assertThat;\nimport static \
             org.hamcrest.Matchers.*;\nimport static org.junit.Assert.assertThrows;\n\nimport \
             java.util.ArrayList;\n\nimport junit.framework.TestCase;\nimport \
             org.junit.Test;\n\npublic class UnitTest extends TestCase {{\n  @Test\n  public void \
             testUnit() {{\n    {body}\n  }}\n}}\n",
            body = test.code.lines().join("\n    "),
        )
    }

    /// Harness for a performance test: runs the body and prints the elapsed
    /// milliseconds.
    pub fn performance_test_source(test: &Test) -> String {
        format!(
            "public class PerformanceTest {{\n  public static void main(String[] args) {{\n    \
             long start = System.currentTimeMillis();\n    {body}\n    long end = \
             System.currentTimeMillis();\n    long milliseconds = end - start;\n    \
             System.out.println(\"operation took \" + milliseconds + \" ms.\");\n  }}\n}}\n",
            body = test.code.lines().join("\n    "),
        )
    }

    /// Runs `javac` over `sources`.
    async fn javac(&self, sources: Vec<OsString>) -> Result<Compilation, DispatchError> {
        let mut args: Vec<OsString> =
            self.config.java_flags().iter().map(OsString::from).collect();
        args.push("-cp".into());
        args.push(self.config.java_classpath().into());
        args.extend(sources);
        compile_with(self.config.javac(), args, &self.workdir).await
    }

    /// `java -cp CLASSPATH class`.
    fn java_args(&self, class: &str) -> Vec<OsString> {
        vec![
            "-cp".into(),
            self.config.java_classpath().into(),
            class.into(),
        ]
    }
}

impl Backend for JavaBackend {
    fn language(&self) -> Language {
        Language::Java
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn supports(&self, test: &Test) -> bool {
        test.kind != TestType::MemoryErrors
    }

    fn write(&self, test: &Test) -> Result<Artifact, DispatchError> {
        match test.kind {
            TestType::Unit => Ok(Artifact {
                files:   vec![write_file(
                    self.workdir.join(UNIT_TEST_SOURCE),
                    &Self::unit_test_source(test),
                )?],
                command: None,
            }),
            TestType::Performance => Ok(Artifact {
                files:   vec![write_file(
                    self.workdir.join(PERFORMANCE_TEST_SOURCE),
                    &Self::performance_test_source(test),
                )?],
                command: None,
            }),
            TestType::Io => write_io_files(&self.workdir, test),
            TestType::Script
            | TestType::ApprovedIncludes
            | TestType::Coverage
            | TestType::Compile
            | TestType::Style => write_script_test(&self.workdir, test),
            TestType::MemoryErrors => Err(self.unsupported(test)),
        }
    }

    async fn compile(&self, test: &Test) -> Result<Compilation, DispatchError> {
        match test.kind {
            TestType::Unit => {
                let mut sources = target_and_includes(test);
                sources.extend(
                    [UNIT_TEST_SOURCE, UNIT_TEST_RUNNER_SOURCE, TEST_RUNNER_SOURCE]
                        .map(OsString::from),
                );
                self.javac(sources).await
            }
            TestType::Performance => {
                let mut sources = target_and_includes(test);
                sources.push(PERFORMANCE_TEST_SOURCE.into());
                self.javac(sources).await
            }
            TestType::Io => self.javac(target_and_includes(test)).await,
            TestType::Script
            | TestType::ApprovedIncludes
            | TestType::Coverage
            | TestType::Compile
            | TestType::Style => Ok(Compilation::skipped()),
            TestType::MemoryErrors => Err(self.unsupported(test)),
        }
    }

    async fn run(&self, test: &Test) -> Result<PartialTestResult, DispatchError> {
        let started = Instant::now();
        let timeout = test.timeout_duration();
        let outcome = match test.kind {
            TestType::Unit => {
                run_exit_code(
                    self.config.java(),
                    &self.java_args(UNIT_TEST_RUNNER_CLASS),
                    &self.workdir,
                    timeout,
                    OutputStream::Combined,
                    false,
                )
                .await
            }
            TestType::Performance => {
                run_exit_code(
                    self.config.java(),
                    &self.java_args(PERFORMANCE_TEST_CLASS),
                    &self.workdir,
                    timeout,
                    OutputStream::Combined,
                    false,
                )
                .await
            }
            TestType::Io => {
                run_io(
                    self.config.java(),
                    &self.java_args(class_name(&test.target)),
                    &self.workdir,
                    timeout,
                )
                .await?
            }
            TestType::Script => run_script(&self.workdir, &test.script_args, timeout).await?,
            TestType::ApprovedIncludes
            | TestType::Coverage
            | TestType::Compile
            | TestType::Style => run_script(&self.workdir, "", timeout).await?,
            TestType::MemoryErrors => return Err(self.unsupported(test)),
        };
        Ok(into_partial(test, outcome, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_drop_extension() {
        assert_eq!(class_name("Code.java"), "Code");
        assert_eq!(class_name("Main"), "Main");
    }

    #[test]
    fn unit_harness_is_a_junit_test_case() {
        let mut test = Test::new("adds", 1.0, TestType::Unit);
        test.code = "assertThat(1 + 1, is(2));\nassertTrue(true);\n".into();
        let source = JavaBackend::unit_test_source(&test);
        assert!(source.contains("public class UnitTest extends TestCase {\n  @Test\n"));
        assert!(source.contains(
            "  public void testUnit() {\n    assertThat(1 + 1, is(2));\n    assertTrue(true);\n  }\n}\n"
        ));
    }

    #[test]
    fn performance_harness_reports_milliseconds() {
        let mut test = Test::new("fast", 1.0, TestType::Performance);
        test.code = "work();\n".into();
        let source = JavaBackend::performance_test_source(&test);
        assert!(source.starts_with("public class PerformanceTest {\n"));
        assert!(source.contains("    work();\n"));
        assert!(source.contains("\" ms.\""));
    }

    #[test]
    fn memory_errors_are_unsupported() {
        let backend = JavaBackend::new(Config::default(), std::env::temp_dir());
        let test = Test::new("leaks", 1.0, TestType::MemoryErrors);
        assert!(!backend.supports(&test));
        assert!(backend.write(&test).unwrap_err().is_unsupported());
    }
}
