#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Instant,
};

use super::{
    Artifact, Backend, Compilation, DispatchError, Language, PartialTestResult,
    common::{
        OutputStream, compile_with, into_partial, run_exit_code, run_io, run_script, write_file,
        write_io_files, write_script_test,
    },
};
use crate::{
    config::Config,
    spec::{Test, TestType},
    util::split_list,
};

/// Source of a unit test harness.
const UNIT_TEST_SOURCE: &str = "UnitTest.py";

/// Grades Python submissions with `unittest`.
#[derive(Debug, Clone)]
pub struct PythonBackend {
    /// Toolchain configuration.
    config:  Config,
    /// Working directory for artifacts.
    workdir: PathBuf,
}

/// Converts `module.py` into `module`.
fn module_name(file_name: &str) -> &str {
    file_name.strip_suffix(".py").unwrap_or(file_name)
}

impl PythonBackend {
    /// Creates a backend writing into `workdir`.
    pub fn new(config: Config, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            config,
            workdir: std::path::absolute(&workdir).unwrap_or(workdir),
        }
    }

    /// Harness for a unit test: star-imports the target and every include,
    /// then runs the body as the only test method.
    pub fn unit_test_source(test: &Test) -> String {
        let mut out = String::from("import unittest\n");
        out.push_str(&format!("from {} import *\n", module_name(&test.target)));
        for include in split_list(&test.include) {
            out.push_str(&format!("from {include} import *\n"));
        }
        out.push_str("class UnitTest(unittest.TestCase):\n");
        out.push_str("    def test_1(self):\n");
        for line in test.code.split('\n') {
            out.push_str(&format!("        {line}\n"));
        }
        out.push_str("if __name__ == '__main__':\n");
        out.push_str("    unittest.main()\n\n");
        out
    }

    /// Byte-compiles `files` to catch syntax errors before running.
    async fn syntax_check(&self, files: Vec<OsString>) -> Result<Compilation, DispatchError> {
        let mut args: Vec<OsString> = vec!["-m".into(), "py_compile".into()];
        args.extend(files);
        compile_with(self.config.python(), args, &self.workdir).await
    }
}

impl Backend for PythonBackend {
    fn language(&self) -> Language {
        Language::Python
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn supports(&self, test: &Test) -> bool {
        matches!(test.kind, TestType::Unit | TestType::Io | TestType::Script)
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
            TestType::Io => write_io_files(&self.workdir, test),
            TestType::Script => write_script_test(&self.workdir, test),
            _ => Err(self.unsupported(test)),
        }
    }

    async fn compile(&self, test: &Test) -> Result<Compilation, DispatchError> {
        match test.kind {
            TestType::Unit => {
                let files = vec![
                    OsString::from(UNIT_TEST_SOURCE),
                    OsString::from(&test.target),
                ];
                self.syntax_check(files).await
            }
            TestType::Io => self.syntax_check(vec![OsString::from(&test.target)]).await,
            TestType::Script => Ok(Compilation::skipped()),
            _ => Err(self.unsupported(test)),
        }
    }

    async fn run(&self, test: &Test) -> Result<PartialTestResult, DispatchError> {
        let started = Instant::now();
        let timeout = test.timeout_duration();
        let outcome = match test.kind {
            TestType::Unit => {
                run_exit_code(
                    self.config.python(),
                    &[OsString::from(UNIT_TEST_SOURCE)],
                    &self.workdir,
                    timeout,
                    OutputStream::Stderr,
                    false,
                )
                .await
            }
            TestType::Io => {
                run_io(
                    self.config.python(),
                    &[OsString::from(&test.target)],
                    &self.workdir,
                    timeout,
                )
                .await?
            }
            TestType::Script => run_script(&self.workdir, &test.script_args, timeout).await?,
            _ => return Err(self.unsupported(test)),
        };
        Ok(into_partial(test, outcome, started))
    }
}
