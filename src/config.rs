#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// C++ compiler used when `CXX` is unset.
const DEFAULT_CXX: &str = "g++";
/// C++ flags used when `CXX_FLAGS` is unset.
const DEFAULT_CXX_FLAGS: &str = "-std=c++17 -g";
/// Java compiler used when `JAVAC` is unset.
const DEFAULT_JAVAC: &str = "javac";
/// Java launcher used when `JAVA` is unset.
const DEFAULT_JAVA: &str = "java";
/// Classpath used when `JAVA_CLASSPATH` is unset.
const DEFAULT_JAVA_CLASSPATH: &str = ".:./lib/hamcrest-2.2.jar:./lib/junit-4.13.2.jar";
/// javac flags used when `JAVA_FLAGS` is unset.
const DEFAULT_JAVA_FLAGS: &str = "-Xlint -g";
/// Python interpreter used when `PYTHON` is unset.
const DEFAULT_PYTHON: &str = "python3";
/// MySQL client used when `MYSQL` is unset.
const DEFAULT_MYSQL: &str = "mysql";
/// MySQL user used when `MYSQL_USER` is unset.
const DEFAULT_MYSQL_USER: &str = "root";
/// MySQL host used when `MYSQL_HOST` is unset.
const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
/// Command run before every SQL test when `SQL_START_COMMAND` is unset.
const DEFAULT_SQL_START_COMMAND: &str = "service mysql start";

/// Toolchain configuration shared by every language backend.
///
/// Values come from the environment (after `.env` has been loaded by the
/// binary) and fall back to the defaults the grading images have always
/// used.
#[derive(Debug, Clone)]
pub struct Config {
    /// C++ compiler.
    cxx:               String,
    /// Flags passed to the C++ compiler before the output and sources.
    cxx_flags:         Vec<String>,
    /// Java compiler.
    javac:             String,
    /// Java launcher.
    java:              String,
    /// Classpath for both compiling and running Java tests.
    java_classpath:    String,
    /// Flags passed to javac before the classpath.
    java_flags:        Vec<String>,
    /// Python interpreter.
    python:            String,
    /// MySQL command-line client.
    mysql:             String,
    /// MySQL user.
    mysql_user:        String,
    /// MySQL host.
    mysql_host:        String,
    /// Shell command that brings the database server up, if any.
    sql_start_command: Option<String>,
}

/// Reads `key` from the environment, ignoring blank values.
fn var_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_owned(),
        _ => default.to_owned(),
    }
}

/// Splits a flag string on whitespace.
fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_owned).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cxx:               DEFAULT_CXX.to_owned(),
            cxx_flags:         split_flags(DEFAULT_CXX_FLAGS),
            javac:             DEFAULT_JAVAC.to_owned(),
            java:              DEFAULT_JAVA.to_owned(),
            java_classpath:    DEFAULT_JAVA_CLASSPATH.to_owned(),
            java_flags:        split_flags(DEFAULT_JAVA_FLAGS),
            python:            DEFAULT_PYTHON.to_owned(),
            mysql:             DEFAULT_MYSQL.to_owned(),
            mysql_user:        DEFAULT_MYSQL_USER.to_owned(),
            mysql_host:        DEFAULT_MYSQL_HOST.to_owned(),
            sql_start_command: Some(DEFAULT_SQL_START_COMMAND.to_owned()),
        }
    }
}

impl Config {
    /// Builds a configuration from environment variables.
    pub fn from_env() -> Self {
        // An explicitly empty start command disables it.
        let sql_start_command = match std::env::var("SQL_START_COMMAND") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_owned()),
            Err(_) => Some(DEFAULT_SQL_START_COMMAND.to_owned()),
        };

        Self {
            cxx: var_or("CXX", DEFAULT_CXX),
            cxx_flags: split_flags(&var_or("CXX_FLAGS", DEFAULT_CXX_FLAGS)),
            javac: var_or("JAVAC", DEFAULT_JAVAC),
            java: var_or("JAVA", DEFAULT_JAVA),
            java_classpath: var_or("JAVA_CLASSPATH", DEFAULT_JAVA_CLASSPATH),
            java_flags: split_flags(&var_or("JAVA_FLAGS", DEFAULT_JAVA_FLAGS)),
            python: var_or("PYTHON", DEFAULT_PYTHON),
            mysql: var_or("MYSQL", DEFAULT_MYSQL),
            mysql_user: var_or("MYSQL_USER", DEFAULT_MYSQL_USER),
            mysql_host: var_or("MYSQL_HOST", DEFAULT_MYSQL_HOST),
            sql_start_command,
        }
    }

    /// Returns the C++ compiler.
    pub fn cxx(&self) -> &str {
        &self.cxx
    }

    /// Returns the C++ compiler flags.
    pub fn cxx_flags(&self) -> &[String] {
        &self.cxx_flags
    }

    /// Returns the Java compiler.
    pub fn javac(&self) -> &str {
        &self.javac
    }

    /// Returns the Java launcher.
    pub fn java(&self) -> &str {
        &self.java
    }

    /// Returns the Java classpath.
    pub fn java_classpath(&self) -> &str {
        &self.java_classpath
    }

    /// Returns the javac flags.
    pub fn java_flags(&self) -> &[String] {
        &self.java_flags
    }

    /// Returns the Python interpreter.
    pub fn python(&self) -> &str {
        &self.python
    }

    /// Returns the MySQL client.
    pub fn mysql(&self) -> &str {
        &self.mysql
    }

    /// Returns the MySQL user.
    pub fn mysql_user(&self) -> &str {
        &self.mysql_user
    }

    /// Returns the MySQL host.
    pub fn mysql_host(&self) -> &str {
        &self.mysql_host
    }

    /// Returns the database start command, if one is configured.
    pub fn sql_start_command(&self) -> Option<&str> {
        self.sql_start_command.as_deref()
    }

    /// Returns a copy with a different C++ compiler.
    pub fn with_cxx(mut self, cxx: impl Into<String>) -> Self {
        self.cxx = cxx.into();
        self
    }

    /// Returns a copy with a different Python interpreter.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Returns a copy with a different MySQL client.
    pub fn with_mysql(mut self, mysql: impl Into<String>) -> Self {
        self.mysql = mysql.into();
        self
    }

    /// Returns a copy with a different (or no) database start command.
    pub fn with_sql_start_command(mut self, command: Option<String>) -> Self {
        self.sql_start_command = command;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_grading_image() {
        let config = Config::default();
        assert_eq!(config.cxx(), "g++");
        assert_eq!(config.cxx_flags(), ["-std=c++17", "-g"]);
        assert_eq!(config.java_flags(), ["-Xlint", "-g"]);
        assert_eq!(config.sql_start_command(), Some("service mysql start"));
    }

    #[test]
    fn split_flags_ignores_extra_whitespace() {
        assert_eq!(split_flags("  -O2   -Wall "), vec!["-O2", "-Wall"]);
        assert!(split_flags("").is_empty());
    }
}
