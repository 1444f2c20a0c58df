#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use super::client::SqlError;
use crate::spec::grammar::line;

/// Checks an SQL test can perform, named by the `type:` line of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCheck {
    /// Compare the result sets of the student's scripts with a solution.
    Sql,
    /// A database with the given name exists.
    DbName,
    /// A table exists in the database.
    TableExists,
    /// A table has exactly the given columns.
    TableColumnNames,
    /// A table's primary key covers exactly the given columns.
    TablePrimaryKey,
    /// A column references the given columns of another table.
    TableForeignKey,
    /// A table holds the same rows as the solution's table.
    TablePopulate,
    /// Forbidden inserts are rejected by a CHECK constraint.
    TableCheckConstraint,
}

impl SqlCheck {
    /// Every check, for lookups.
    const ALL: [SqlCheck; 8] = [
        SqlCheck::Sql,
        SqlCheck::DbName,
        SqlCheck::TableExists,
        SqlCheck::TableColumnNames,
        SqlCheck::TablePrimaryKey,
        SqlCheck::TableForeignKey,
        SqlCheck::TablePopulate,
        SqlCheck::TableCheckConstraint,
    ];

    /// The spelling used in test bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlCheck::Sql => "sql",
            SqlCheck::DbName => "db_name",
            SqlCheck::TableExists => "table_exists",
            SqlCheck::TableColumnNames => "table_column_names",
            SqlCheck::TablePrimaryKey => "table_primary_key",
            SqlCheck::TableForeignKey => "table_foreign_key",
            SqlCheck::TablePopulate => "table_populate",
            SqlCheck::TableCheckConstraint => "table_check_constraint",
        }
    }
}

impl Display for SqlCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SqlCheck::ALL
            .into_iter()
            .find(|check| check.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// The `key: value` lines of an SQL test body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlDetails {
    /// Every well-formed line; later lines win.
    entries: BTreeMap<String, String>,
}

impl SqlDetails {
    /// Collects the lines of `code` that hold exactly one colon; anything else
    /// is ignored.
    pub fn parse(code: &str) -> Self {
        let entries = code
            .lines()
            .filter_map(|l| line::tag_value(l.trim()).ok())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self { entries }
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value of `key`, or an error naming it.
    pub fn require(&self, key: &str) -> Result<&str, SqlError> {
        self.get(key)
            .ok_or_else(|| SqlError::MissingKey(key.to_string()))
    }

    /// The raw `type:` value.
    pub fn check_name(&self) -> &str {
        self.get("type").unwrap_or_default()
    }

    /// Whether result rows must match in order.
    pub fn ordered(&self) -> bool {
        self.get("ordered") == Some("true")
    }

    /// The 1-based statement of the last script to compare, if only one is.
    pub fn statement(&self) -> Result<Option<usize>, SqlError> {
        self.get("statement")
            .map(|n| {
                n.parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| SqlError::Invalid(format!("invalid statement number `{n}`")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_lines_become_details() {
        let details = SqlDetails::parse(
            "type: sql\ndatabase: shop\nsetup: setup.sql\nordered: true\nnot a pair\nurl: a:b\n",
        );
        assert_eq!(details.check_name(), "sql");
        assert_eq!(details.get("database"), Some("shop"));
        assert_eq!(details.get("url"), None);
        assert!(details.ordered());
        assert_eq!(details.statement().unwrap(), None);
        assert!(matches!(details.require("solution"), Err(SqlError::MissingKey(k)) if k == "solution"));
    }

    #[test]
    fn ordered_defaults_to_false() {
        assert!(!SqlDetails::parse("type: sql\nordered: yes").ordered());
        assert!(!SqlDetails::parse("type: sql").ordered());
    }

    #[test]
    fn statement_numbers_are_one_based() {
        assert_eq!(SqlDetails::parse("statement: 2").statement().unwrap(), Some(2));
        assert!(SqlDetails::parse("statement: 0").statement().is_err());
        assert!(SqlDetails::parse("statement: two").statement().is_err());
    }

    #[test]
    fn check_names_parse() {
        assert_eq!("table_populate".parse::<SqlCheck>(), Ok(SqlCheck::TablePopulate));
        assert_eq!("drop_table".parse::<SqlCheck>(), Err("drop_table".to_string()));
    }
}
