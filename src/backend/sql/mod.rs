#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// The `mysql` command-line client
pub mod client;
/// The `key: value` body of SQL tests
pub mod details;

use std::{
    collections::BTreeSet,
    ffi::OsString,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use client::{MysqlClient, Rows, SqlError};
use details::{SqlCheck, SqlDetails};

use super::{
    Artifact, Backend, Compilation, DispatchError, Language, PartialTestResult,
    common::{RunOutcome, into_partial},
};
use crate::{
    config::Config,
    constants::{SQL_CHECK_CONSTRAINT_VIOLATION, SQL_CLEANUP_SCRIPT, TIMEOUT_MSSG},
    process::{StdinSource, run_collect},
    spec::{Test, TestType},
    util::program_path,
};

/// Grades SQL submissions against a MySQL server.
///
/// Every test is a `unit` test whose body selects one [`SqlCheck`] and names
/// the scripts and tables it works on.
#[derive(Debug, Clone)]
pub struct SqlBackend {
    /// Toolchain configuration.
    config:  Config,
    /// Working directory holding the student's and the solution's scripts.
    workdir: PathBuf,
}

/// Joins every column of a row, each followed by `, `.
fn row_string(row: &[String]) -> String {
    row.iter().map(|value| format!("{value}, ")).collect()
}

/// Turns the rows of each statement into comparable row strings, kept in
/// order or as a sorted set.
fn to_result_sets(results: Vec<Rows>, ordered: bool) -> Vec<Vec<String>> {
    results
        .into_iter()
        .map(|rows| {
            let rows = rows.iter().map(|row| row_string(row));
            if ordered {
                rows.collect()
            } else {
                rows.collect::<BTreeSet<_>>().into_iter().collect()
            }
        })
        .collect()
}

/// Renders result sets one row per line, sets separated by blank lines.
fn render_result_sets(sets: &[Vec<String>]) -> String {
    let mut out = String::new();
    for set in sets {
        for row in set {
            out.push_str(row);
            out.push('\n');
        }
        out.push_str("\n\n");
    }
    out
}

/// Lowercased, trimmed values.
fn name_set<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .collect()
}

/// The first column of every row as a [`name_set`].
fn first_column_set(rows: &Rows) -> BTreeSet<String> {
    name_set(rows.iter().filter_map(|row| row.first().map(String::as_str)))
}

/// Renders a set as `{'a', 'b'}`.
fn set_repr(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        return "set()".to_string();
    }
    let items: Vec<String> = set.iter().map(|item| format!("'{item}'")).collect();
    format!("{{{}}}", items.join(", "))
}

/// Compares an expected and an actual name set.
fn compare_sets(expected: BTreeSet<String>, actual: BTreeSet<String>) -> (bool, String) {
    if expected == actual {
        (true, String::new())
    } else {
        (
            false,
            format!(
                "Expected : {}\n Got : {}\n",
                set_repr(&expected),
                set_repr(&actual)
            ),
        )
    }
}

/// One grading session: a client bound to a test's timeout plus the parsed
/// body.
struct Session<'a> {
    /// Database client.
    client:  MysqlClient,
    /// Parsed body of the test.
    details: &'a SqlDetails,
    /// The test being graded.
    test:    &'a Test,
}

impl Session<'_> {
    /// Runs the optional `setup` script.
    async fn setup_if_present(&self) -> Result<(), SqlError> {
        if let Some(setup) = self.details.get("setup") {
            self.client.run_file("", setup).await?;
        }
        Ok(())
    }

    /// Runs the comma-separated `scripts` against the test's database (or
    /// `database` when given). With a `statement:` key only that statement of
    /// the last script is kept.
    async fn run_scripts(
        &self,
        scripts: &str,
        database: Option<&str>,
    ) -> Result<Vec<Rows>, SqlError> {
        let database = database.unwrap_or(self.details.get("database").unwrap_or_default());
        let files: Vec<&str> = scripts.split(',').map(str::trim).collect();

        match (self.details.statement()?, files.split_last()) {
            (Some(statement), Some((last, earlier))) => {
                for file in earlier {
                    self.client.run_file(database, file).await?;
                }
                self.client
                    .run_statement_of_file(database, last, statement, self.details.ordered())
                    .await
            }
            _ => {
                let mut results = Vec::new();
                for file in files {
                    results.extend(self.client.run_file(database, file).await?);
                }
                Ok(results)
            }
        }
    }

    /// Dispatches to the check named by the body.
    async fn run(&self, check: SqlCheck) -> Result<(bool, String), SqlError> {
        match check {
            SqlCheck::Sql => self.sql().await,
            SqlCheck::DbName => self.db_name().await,
            SqlCheck::TableExists => self.table_exists().await,
            SqlCheck::TableColumnNames => self.table_column_names().await,
            SqlCheck::TablePrimaryKey => self.table_primary_key().await,
            SqlCheck::TableForeignKey => self.table_foreign_key().await,
            SqlCheck::TablePopulate => self.table_populate().await,
            SqlCheck::TableCheckConstraint => self.table_check_constraint().await,
        }
    }

    /// Compares the student's result sets with the solution's, if there is
    /// one. The solution runs first, before the student's scripts can change
    /// the data.
    async fn sql(&self) -> Result<(bool, String), SqlError> {
        self.client.run_file("", self.details.require("setup")?).await?;
        let ordered = self.details.ordered();

        let expected = match self.details.get("solution") {
            Some(solution) => {
                let results = self.run_scripts(solution, None).await?;
                Some(to_result_sets(results, ordered))
            }
            None => None,
        };
        let actual = to_result_sets(self.run_scripts(&self.test.target, None).await?, ordered);

        Ok(match expected {
            Some(expected) if expected == actual => (true, String::new()),
            Some(expected) => (
                false,
                format!(
                    "Expected : \n{}\n\nGot : \n{}",
                    render_result_sets(&expected),
                    render_result_sets(&actual)
                ),
            ),
            None => (true, format!("Got : \n{}", render_result_sets(&actual))),
        })
    }

    /// The student's scripts create the database.
    async fn db_name(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        self.run_scripts(&self.test.target, Some("")).await?;
        let rows = self.client.query("", "show databases").await?;

        if first_column_set(&rows).contains(&database.trim().to_lowercase()) {
            Ok((true, String::new()))
        } else {
            Ok((false, format!("database {database} not created.")))
        }
    }

    /// The student's scripts create the table.
    async fn table_exists(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        let table = self.details.require("tablename")?;
        self.setup_if_present().await?;
        self.run_scripts(&self.test.target, Some("")).await?;
        let rows = self.client.query(database, "show tables").await?;

        if first_column_set(&rows).contains(&table.trim().to_lowercase()) {
            Ok((true, String::new()))
        } else {
            Ok((false, format!("Table {table} not found in database {database}.")))
        }
    }

    /// The table has exactly the listed columns.
    async fn table_column_names(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        let table = self.details.require("tablename")?;
        let columns = self.details.require("columns")?;
        self.setup_if_present().await?;
        self.run_scripts(&self.test.target, Some("")).await?;
        let rows = self
            .client
            .query(database, &format!("describe {}", table.to_uppercase()))
            .await?;

        Ok(compare_sets(name_set(columns.split(',')), first_column_set(&rows)))
    }

    /// The table's primary key covers exactly the listed columns.
    async fn table_primary_key(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        let table = self.details.require("tablename")?;
        let columns = self.details.require("columns")?;
        self.setup_if_present().await?;
        self.run_scripts(&self.test.target, Some("")).await?;
        let stmt = format!(
            "SELECT COLUMN_NAME FROM KEY_COLUMN_USAGE WHERE TABLE_SCHEMA = '{database}' AND \
             TABLE_NAME = '{}' AND CONSTRAINT_NAME = 'PRIMARY'",
            table.to_uppercase()
        );
        let rows = self.client.query("information_schema", &stmt).await?;

        Ok(compare_sets(name_set(columns.split(',')), first_column_set(&rows)))
    }

    /// The column references exactly the listed columns of the referenced
    /// table.
    async fn table_foreign_key(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        let table = self.details.require("tablename")?;
        let columns = self.details.require("columns")?;
        let referenced_table = self.details.require("referenced_table")?;
        let referenced_columns = self.details.require("referenced_columns")?;
        self.setup_if_present().await?;
        self.run_scripts(&self.test.target, Some("")).await?;
        let stmt = format!(
            "SELECT REFERENCED_COLUMN_NAME FROM KEY_COLUMN_USAGE WHERE TABLE_SCHEMA = \
             '{database}' AND TABLE_NAME = '{}' AND referenced_table_name = '{}' AND COLUMN_NAME \
             = '{}'",
            table.to_uppercase(),
            referenced_table.to_uppercase(),
            columns.trim().to_uppercase()
        );
        let rows = self.client.query("information_schema", &stmt).await?;

        Ok(compare_sets(
            name_set(referenced_columns.split(',')),
            first_column_set(&rows),
        ))
    }

    /// The student's table holds the same rows as the solution's.
    async fn table_populate(&self) -> Result<(bool, String), SqlError> {
        let database = self.details.require("database")?;
        let table = self.details.require("tablename")?;
        let setup_sol = self.details.require("setup_sol")?;
        let database_sol = self.details.require("database_sol")?;
        let table_sol = self.details.require("tablename_sol")?;

        self.client.run_file("", self.details.require("setup")?).await?;
        self.run_scripts(&self.test.target, None).await?;
        let actual = self
            .client
            .query(database, &format!("Select * from {table}"))
            .await?;

        self.client.run_file("", setup_sol).await?;
        let expected = self
            .client
            .query(database_sol, &format!("Select * from {table_sol}"))
            .await?;

        let mut sets = to_result_sets(vec![actual, expected], false);
        let expected = sets.pop().unwrap_or_default();
        let actual = sets.pop().unwrap_or_default();
        if actual == expected {
            return Ok((true, String::new()));
        }

        let mut out = String::from("Expected : \n");
        for row in &expected {
            out.push_str(&format!("{row}\n"));
        }
        out.push_str("\n\nGot : \n");
        for row in &actual {
            out.push_str(&format!("{row}\n"));
        }
        Ok((false, out))
    }

    /// Allowed inserts succeed and forbidden inserts violate a CHECK
    /// constraint.
    async fn table_check_constraint(&self) -> Result<(bool, String), SqlError> {
        self.setup_if_present().await?;
        self.run_scripts(&self.test.target, Some("")).await?;

        if let Some(allowed) = self.details.get("allowed_inserts")
            && let Err(e) = self.client.run_file("", allowed).await
        {
            return Ok((false, format!("Allowed insert failed with error : {e}")));
        }

        if let Some(forbidden) = self.details.get("forbidden_inserts") {
            return Ok(match self.client.run_file("", forbidden).await {
                Ok(_) => (false, "Invalid data inserted successfully".to_string()),
                Err(e) => {
                    let out = e.to_string();
                    if out.contains(SQL_CHECK_CONSTRAINT_VIOLATION) {
                        (true, String::new())
                    } else {
                        (false, out)
                    }
                }
            });
        }

        Ok((true, String::new()))
    }
}

impl SqlBackend {
    /// Creates a backend whose scripts live in `workdir`.
    pub fn new(config: Config, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            config,
            workdir: std::path::absolute(&workdir).unwrap_or(workdir),
        }
    }

    /// Runs the configured start command, if any. Failures are logged; the
    /// test itself will then fail to connect.
    async fn start_server(&self, timeout: Duration) {
        let Some(command) = self.config.sql_start_command() else {
            return;
        };

        let sh = match program_path("sh") {
            Ok(sh) => sh,
            Err(e) => {
                tracing::error!("Could not start database server: {e:#}");
                return;
            }
        };
        let args = [OsString::from("-c"), OsString::from(command)];
        match run_collect(&sh, &args, StdinSource::Null, Some(&self.workdir), Some(timeout)).await {
            Ok(collected) if collected.success() => {}
            Ok(collected) => tracing::error!(
                "`{command}` exited with {}: {}",
                collected.code(),
                collected.combined().trim()
            ),
            Err(e) => tracing::error!("Could not start database server: {e}"),
        }
    }

    /// Runs `cleanup.sql` if the working directory has one.
    async fn cleanup(&self, client: &MysqlClient) {
        if !self.workdir.join(SQL_CLEANUP_SCRIPT).exists() {
            return;
        }
        if let Err(e) = client.run_file("", SQL_CLEANUP_SCRIPT).await {
            tracing::warn!("{SQL_CLEANUP_SCRIPT} failed: {e}");
        }
    }
}

impl Backend for SqlBackend {
    fn language(&self) -> Language {
        Language::Sql
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn supports(&self, test: &Test) -> bool {
        test.kind == TestType::Unit
    }

    fn write(&self, test: &Test) -> Result<Artifact, DispatchError> {
        if !self.supports(test) {
            return Err(self.unsupported(test));
        }
        Ok(Artifact::default())
    }

    async fn compile(&self, test: &Test) -> Result<Compilation, DispatchError> {
        if !self.supports(test) {
            return Err(self.unsupported(test));
        }
        Ok(Compilation::skipped())
    }

    async fn run(&self, test: &Test) -> Result<PartialTestResult, DispatchError> {
        if !self.supports(test) {
            return Err(self.unsupported(test));
        }

        let details = SqlDetails::parse(&test.code);
        let check = details
            .check_name()
            .parse::<SqlCheck>()
            .map_err(|name| DispatchError::Unsupported {
                kind:     format!("sql check `{name}`"),
                language: Language::Sql,
            })?;

        let started = Instant::now();
        let timeout = test.timeout_duration();
        self.start_server(timeout).await;

        let session = Session {
            client: MysqlClient::new(&self.config, &self.workdir, timeout),
            details: &details,
            test,
        };
        let outcome = match session.run(check).await {
            Ok((passed, output)) => RunOutcome::binary(passed, output),
            Err(SqlError::Process(e)) if e.is_timeout() => RunOutcome::failed(TIMEOUT_MSSG),
            Err(e) => RunOutcome::failed(e.to_string()),
        };
        let result = into_partial(test, outcome, started);

        self.cleanup(&session.client).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[&[&str]]) -> Rows {
        values
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn unordered_result_sets_ignore_row_order_and_duplicates() {
        let a = to_result_sets(vec![rows(&[&["1", "x"], &["2", "y"], &["1", "x"]])], false);
        let b = to_result_sets(vec![rows(&[&["2", "y"], &["1", "x"]])], false);
        assert_eq!(a, b);
        assert_eq!(render_result_sets(&a), "1, x, \n2, y, \n\n\n");
    }

    #[test]
    fn ordered_result_sets_keep_row_order() {
        let a = to_result_sets(vec![rows(&[&["1"], &["2"]])], true);
        let b = to_result_sets(vec![rows(&[&["2"], &["1"]])], true);
        assert_ne!(a, b);
    }

    #[test]
    fn name_sets_compare_case_insensitively() {
        let (passed, _) = compare_sets(name_set("ID, Name".split(',')), name_set(["id", "NAME"]));
        assert!(passed);

        let (passed, message) = compare_sets(name_set(["id"]), BTreeSet::new());
        assert!(!passed);
        assert_eq!(message, "Expected : {'id'}\n Got : set()\n");
    }

    #[test]
    fn only_unit_tests_are_supported() {
        let backend = SqlBackend::new(Config::default(), std::env::temp_dir());
        assert!(backend.supports(&Test::new("t", 1.0, TestType::Unit)));
        assert!(!backend.supports(&Test::new("t", 1.0, TestType::Io)));
    }

    #[tokio::test]
    async fn unknown_checks_are_unsupported() {
        let backend = SqlBackend::new(Config::default(), std::env::temp_dir());
        let mut test = Test::new("t", 1.0, TestType::Unit);
        test.code = "type: drop_everything\n".into();
        let err = backend.run(&test).await.unwrap_err();
        assert!(err.is_unsupported());
    }
}
