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
        OutputStream, RunOutcome, compile_with, into_partial, run_exit_code, run_io, run_script,
        target_and_includes, write_file, write_io_files, write_script_test,
    },
};
use crate::{
    config::Config,
    spec::{Test, TestType},
    util::split_list,
};

/// Source of a unit test harness.
const UNIT_TEST_SOURCE: &str = "unit_test.cpp";
/// Binary of a unit test harness.
const UNIT_TEST_BINARY: &str = "unit_test";
/// Source of a performance test harness.
const PERFORMANCE_TEST_SOURCE: &str = "performance_test.cpp";
/// Binary of a performance test harness.
const PERFORMANCE_TEST_BINARY: &str = "performance_test";
/// Binary built from the target of an i/o test.
const IO_TEST_BINARY: &str = "io_test";
/// Binary built from the sources of a memory errors test.
const MEMORY_ERROR_TEST_BINARY: &str = "memory_error_test";
/// Assertion header every harness includes.
const TEST_HEADER: &str = "cs12x_test.h";

/// Grades C++ submissions with `g++` and the `cs12x_test.h` assertion
/// header.
#[derive(Debug, Clone)]
pub struct CppBackend {
    /// Toolchain configuration.
    config:  Config,
    /// Working directory for artifacts.
    workdir: PathBuf,
}

impl CppBackend {
    /// Creates a backend writing into `workdir`.
    pub fn new(config: Config, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            config,
            workdir: std::path::absolute(&workdir).unwrap_or(workdir),
        }
    }

    /// `#include` lines for the target and the extra includes.
    fn includes(test: &Test, extra: &[&str]) -> String {
        let mut out = format!("#include \"{}\"\n\n", test.target);
        for include in extra.iter().copied().chain(split_list(&test.include)) {
            out.push_str(&format!("#include {include}\n"));
        }
        out.push_str(&format!("#include \"{TEST_HEADER}\"\n\n"));
        out
    }

    /// Indents the test body into the `try` block.
    fn body(test: &Test) -> String {
        test.code.lines().join("\n        ")
    }

    /// The `catch` clauses shared by both harnesses.
    fn catch_all() -> &'static str {
        concat!(
            "    } catch (const std::exception& err) {\n",
            "        std::cout << \"Caught unexpected std::exception, what: \" << err.what() << std::endl;\n",
            "        FAIL();\n",
            "    } catch (...) {\n",
            "        std::cout << \"Caught unexpected non-std::exception\" << std::endl;\n",
            "        FAIL();\n",
            "    }\n",
        )
    }

    /// Harness for a unit test: exits 0 iff every assertion passed.
    pub fn unit_test_source(test: &Test) -> String {
        format!(
            "{includes}int main() {{\n    INIT_TEST;\n    try {{\n        {body}\n{catch}    \
             RESULT(pass);\n    return pass ? 0 : 1;\n}}\n",
            includes = Self::includes(test, &[]),
            body = Self::body(test),
            catch = Self::catch_all(),
        )
    }

    /// Harness for a performance test: a unit test that also prints the
    /// elapsed microseconds.
    pub fn performance_test_source(test: &Test) -> String {
        format!(
            "{includes}int main() {{\n    INIT_TEST;\n    auto start = \
             std::chrono::steady_clock::now();\n    try {{\n        {body}\n{catch}    auto end \
             = std::chrono::steady_clock::now();\n    auto microseconds = \
             std::chrono::duration_cast<std::chrono::microseconds>(end - start).count();\n    \
             std::cout << \"operation took \" << microseconds << \" µs.\" << std::endl;\n    \
             RESULT(pass);\n    return pass ? 0 : 1;\n}}\n",
            includes = Self::includes(test, &["<iostream>", "<chrono>"]),
            body = Self::body(test),
            catch = Self::catch_all(),
        )
    }

    /// Compiles `sources` into `binary`.
    async fn compile_into(
        &self,
        binary: &str,
        sources: Vec<OsString>,
    ) -> Result<Compilation, DispatchError> {
        let mut args: Vec<OsString> = self.config.cxx_flags().iter().map(OsString::from).collect();
        args.push("-o".into());
        args.push(binary.into());
        args.extend(sources);
        compile_with(self.config.cxx(), args, &self.workdir).await
    }

    /// Runs a harness binary from the working directory.
    async fn run_binary(&self, binary: &str, test: &Test) -> RunOutcome {
        run_exit_code(
            self.workdir.join(binary),
            &[],
            &self.workdir,
            test.timeout_duration(),
            OutputStream::Stdout,
            true,
        )
        .await
    }
}

impl Backend for CppBackend {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn supports(&self, test: &Test) -> bool {
        test.kind != TestType::Style
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
            | TestType::MemoryErrors => write_script_test(&self.workdir, test),
            TestType::Style => Err(self.unsupported(test)),
        }
    }

    async fn compile(&self, test: &Test) -> Result<Compilation, DispatchError> {
        match test.kind {
            TestType::Unit => {
                self.compile_into(UNIT_TEST_BINARY, vec![UNIT_TEST_SOURCE.into()])
                    .await
            }
            TestType::Performance => {
                self.compile_into(PERFORMANCE_TEST_BINARY, vec![PERFORMANCE_TEST_SOURCE.into()])
                    .await
            }
            TestType::Io => {
                self.compile_into(IO_TEST_BINARY, target_and_includes(test))
                    .await
            }
            TestType::MemoryErrors => {
                let sources = test.approved_includes.iter().map(OsString::from).collect();
                self.compile_into(MEMORY_ERROR_TEST_BINARY, sources).await
            }
            TestType::Script | TestType::ApprovedIncludes | TestType::Coverage | TestType::Compile => {
                Ok(Compilation::skipped())
            }
            TestType::Style => Err(self.unsupported(test)),
        }
    }

    async fn run(&self, test: &Test) -> Result<PartialTestResult, DispatchError> {
        let started = Instant::now();
        let outcome = match test.kind {
            TestType::Unit => self.run_binary(UNIT_TEST_BINARY, test).await,
            TestType::Performance => self.run_binary(PERFORMANCE_TEST_BINARY, test).await,
            TestType::Io => {
                run_io(
                    self.workdir.join(IO_TEST_BINARY),
                    &[],
                    &self.workdir,
                    test.timeout_duration(),
                )
                .await?
            }
            TestType::Script => {
                run_script(&self.workdir, &test.script_args, test.timeout_duration()).await?
            }
            TestType::ApprovedIncludes
            | TestType::Coverage
            | TestType::Compile
            | TestType::MemoryErrors => {
                run_script(&self.workdir, "", test.timeout_duration()).await?
            }
            TestType::Style => return Err(self.unsupported(test)),
        };
        Ok(into_partial(test, outcome, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(code: &str) -> Test {
        let mut test = Test::new("adds", 1.0, TestType::Unit);
        test.target = "calc.h".into();
        test.include = "<vector> \"util.h\"".into();
        test.code = code.into();
        test
    }

    #[test]
    fn unit_harness_wraps_body() {
        let source = CppBackend::unit_test_source(&unit("int x = 1;\nCHECK(x == 1);\n"));
        assert!(source.starts_with("#include \"calc.h\"\n\n#include <vector>\n#include \"util.h\"\n"));
        assert!(source.contains("#include \"cs12x_test.h\"\n\nint main() {\n    INIT_TEST;\n"));
        assert!(source.contains("    try {\n        int x = 1;\n        CHECK(x == 1);\n    } catch"));
        assert!(source.ends_with("    RESULT(pass);\n    return pass ? 0 : 1;\n}\n"));
    }

    #[test]
    fn performance_harness_reports_microseconds() {
        let source = CppBackend::performance_test_source(&unit("work();\n"));
        assert!(source.contains("#include <iostream>\n#include <chrono>\n#include <vector>"));
        assert!(source.contains("steady_clock::now()"));
        assert!(source.contains("\" µs.\""));
    }

    #[test]
    fn style_is_unsupported() {
        let backend = CppBackend::new(Config::default(), std::env::temp_dir());
        let test = Test::new("style", 1.0, TestType::Style);
        assert!(!backend.supports(&test));
        assert!(backend.write(&test).unwrap_err().is_unsupported());
    }
}
