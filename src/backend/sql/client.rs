#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

use crate::{
    config::Config,
    process::{ProcessError, StdinSource, run_collect},
    util::program_path,
};

/// Printed after every statement so the rows of consecutive statements can be
/// told apart in batch output.
const END_OF_RESULT_MARKER: &str = "--specgrade-end-of-result--";

/// Rows returned by one statement, each a list of column values.
pub type Rows = Vec<Vec<String>>;

/// Failures while talking to the database.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The server rejected a statement; holds the client's error text.
    #[error("{0}")]
    Server(String),
    /// The test body lacks a key this check needs.
    #[error("missing `{0}` in test body")]
    MissingKey(String),
    /// The test body holds a value this check cannot use.
    #[error("{0}")]
    Invalid(String),
    /// A script named in the test body could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        /// Script path.
        path:   PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The client could not be located.
    #[error("{0:#}")]
    Client(anyhow::Error),
    /// The client process failed or timed out.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Removes `-- ` comments, then splits a script into its non-empty
/// statements.
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .lines()
        .map(|line| line.find("-- ").map_or(line, |start| &line[..start]))
        .collect::<Vec<_>>()
        .join(" ")
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// True if `stmt` contains the words `order` and `by`.
pub fn has_order_by(stmt: &str) -> bool {
    let words: Vec<String> = stmt.split_whitespace().map(str::to_lowercase).collect();
    words.iter().any(|w| w == "order") && words.iter().any(|w| w == "by")
}

/// Runs statements through the `mysql` command-line client.
#[derive(Debug, Clone)]
pub struct MysqlClient {
    /// Client program.
    program: String,
    /// User to connect as.
    user:    String,
    /// Server host.
    host:    String,
    /// Directory scripts are resolved against.
    workdir: PathBuf,
    /// Deadline for each client invocation.
    timeout: Duration,
}

impl MysqlClient {
    /// Creates a client from the toolchain configuration.
    pub fn new(config: &Config, workdir: &Path, timeout: Duration) -> Self {
        Self {
            program: config.mysql().to_string(),
            user: config.mysql_user().to_string(),
            host: config.mysql_host().to_string(),
            workdir: workdir.to_path_buf(),
            timeout,
        }
    }

    /// Executes `statements` in one session against `database` (none if
    /// empty) and returns the rows of each.
    pub async fn execute(&self, database: &str, statements: &[String]) -> Result<Vec<Rows>, SqlError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let mut script = String::new();
        for stmt in statements {
            script.push_str(stmt);
            script.push_str(";\n");
            script.push_str(&format!("SELECT '{END_OF_RESULT_MARKER}';\n"));
        }

        let mut args: Vec<OsString> = vec![
            "--batch".into(),
            "--skip-column-names".into(),
            format!("--user={}", self.user).into(),
            format!("--host={}", self.host).into(),
        ];
        if !database.is_empty() {
            args.push(database.into());
        }

        let program = program_path(&self.program).map_err(SqlError::Client)?;
        let collected = run_collect(
            &program,
            &args,
            StdinSource::Bytes(script.into_bytes()),
            Some(&self.workdir),
            Some(self.timeout),
        )
        .await?;

        if !collected.success() {
            return Err(SqlError::Server(collected.stderr_lossy().trim().to_string()));
        }

        let mut results = Vec::with_capacity(statements.len());
        let mut rows = Rows::new();
        for line in collected.stdout_lossy().lines() {
            if line == END_OF_RESULT_MARKER {
                results.push(std::mem::take(&mut rows));
            } else {
                rows.push(line.split('\t').map(str::to_string).collect());
            }
        }
        Ok(results)
    }

    /// Executes a single statement and returns its rows.
    pub async fn query(&self, database: &str, statement: &str) -> Result<Rows, SqlError> {
        let mut results = self.execute(database, &[statement.to_string()]).await?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Reads a script relative to the working directory.
    fn read_script(&self, file: &str) -> Result<Vec<String>, SqlError> {
        let path = self.workdir.join(file);
        std::fs::read_to_string(&path)
            .map(|script| split_statements(&script))
            .map_err(|source| SqlError::Io { path, source })
    }

    /// Executes every statement of a script file.
    pub async fn run_file(&self, database: &str, file: &str) -> Result<Vec<Rows>, SqlError> {
        let statements = self.read_script(file)?;
        self.execute(database, &statements).await
    }

    /// Executes only the `statement`-th (1-based) statement of a script
    /// file. Ordered comparisons need an `ORDER BY`; without one a single
    /// explanatory row is returned instead.
    pub async fn run_statement_of_file(
        &self,
        database: &str,
        file: &str,
        statement: usize,
        ordered: bool,
    ) -> Result<Vec<Rows>, SqlError> {
        let statements = self.read_script(file)?;
        let stmt = statements.get(statement - 1).ok_or_else(|| {
            SqlError::Invalid(format!(
                "{file} has {} statements, statement {statement} requested",
                statements.len()
            ))
        })?;

        if ordered && !has_order_by(stmt) {
            return Ok(vec![vec![vec![
                "No order clause in ordered query".to_string(),
                String::new(),
            ]]]);
        }
        self.execute(database, std::slice::from_ref(stmt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_split_after_comments_are_removed() {
        let script = "-- schema\nCREATE TABLE t (a INT); -- first\nINSERT INTO t\nVALUES (1);\n\n";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE t (a INT)", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn order_by_must_be_whole_words() {
        assert!(has_order_by("SELECT a FROM t ORDER BY a"));
        assert!(has_order_by("select a from t order\nby a"));
        assert!(!has_order_by("SELECT border FROM t"));
    }
}
