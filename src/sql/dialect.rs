//! SQL dialects: quoting rules, placeholders and the names they answer to

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named SQL rendering target
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    MySql,
    /// Portable ANSI SQL; has no date arithmetic
    Ansi,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Dialect::Sqlite, Dialect::Postgres, Dialect::MySql, Dialect::Ansi];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Ansi => "ansi",
        }
    }

    /// Quote an identifier; `*` is never quoted
    pub fn quote_identifier(&self, ident: &str) -> String {
        if ident == "*" {
            return ident.to_string();
        }
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a string literal
    pub fn quote_string(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        match self {
            // MySQL treats backslash as an escape inside string literals
            Self::MySql => format!("'{}'", escaped.replace('\\', "\\\\")),
            _ => format!("'{}'", escaped),
        }
    }

    /// Placeholder for the n-th (1-based) bound parameter
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    pub fn supports_ilike(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    pub fn supports_date_arithmetic(&self) -> bool {
        !matches!(self, Self::Ansi)
    }

    /// Boolean literal spelling
    pub fn boolean(&self, value: bool) -> &'static str {
        match (self, value) {
            (Self::Sqlite, true) => "1",
            (Self::Sqlite, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" | "redshift" | "duckdb" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "ansi" | "standard" => Ok(Self::Ansi),
            other => Err(EngineError::Unsupported {
                message: format!("unknown SQL dialect '{}'", other),
                dialect: Some(other.to_string()),
                construct: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(Dialect::Postgres.quote_identifier("order\"s"), "\"order\"\"s\"");
        assert_eq!(Dialect::MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Sqlite.quote_identifier("*"), "*");
        assert_eq!(Dialect::Sqlite.quote_string("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_aliases() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("duckdb".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::MySql.placeholder(2), "?");
    }
}
