//! Dialect strategy: one closed variant per supported engine, selected once at
//! connect time. Everything per-query (quoting, placeholders, RETURNING
//! support, pagination filler) is answered here so the SQL builder stays free
//! of engine branching.

use std::fmt;

/// Connection-string family, before the MySQL/MariaDB version probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialectFamily {
    Postgres,
    MySql,
    Sqlite,
}

/// One of the four supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
}

impl DialectFamily {
    /// Select the family from the connection-string prefix.
    /// Returns the offending scheme on no match.
    pub fn from_connection_string(connection_string: &str) -> Result<DialectFamily, String> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Ok(DialectFamily::Postgres)
        } else if lower.starts_with("mysql://") {
            Ok(DialectFamily::MySql)
        } else if lower.starts_with("sqlite://") {
            Ok(DialectFamily::Sqlite)
        } else {
            let scheme = connection_string
                .split("://")
                .next()
                .unwrap_or(connection_string);
            Err(scheme.to_string())
        }
    }
}

impl Dialect {
    /// Quote an identifier per the engine's rules.
    ///
    /// - PostgreSQL/SQLite: `"identifier"` (embedded quotes doubled)
    /// - MySQL/MariaDB: `` `identifier` `` (embedded backticks doubled)
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
            Dialect::MySql | Dialect::MariaDb => {
                format!("`{}`", ident.replace('`', "``"))
            }
        }
    }

    /// Placeholder for the 1-based parameter index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql | Dialect::MariaDb | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Native `INSERT ... RETURNING` support.
    pub fn supports_insert_returning(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite | Dialect::MariaDb)
    }

    /// Native `UPDATE ... RETURNING` support. MariaDB has none; updates are
    /// emulated with a follow-up SELECT.
    pub fn supports_update_returning(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Native `DELETE ... RETURNING` support.
    pub fn supports_delete_returning(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite | Dialect::MariaDb)
    }

    /// LIMIT clause required when only an offset was requested. Pagination
    /// semantics are uniform across the engines, but MySQL and SQLite refuse a
    /// bare OFFSET.
    pub fn offset_filler_limit(&self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => None,
            Dialect::MySql | Dialect::MariaDb => Some("18446744073709551615"),
            Dialect::Sqlite => Some("-1"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}
