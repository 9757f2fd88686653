//! Introspected schema model: normalized column types, columns, and tables.
//! Values here are immutable once introspection completes; the registry is a
//! connect-time snapshot and never observes later schema changes.

use serde::Serialize;

/// Normalized SQL column type, parsed from each dialect's catalog strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Boolean,
    Varchar(Option<u32>),
    Text,
    Date,
    Time,
    Timestamp,
    Json,
    Uuid,
    Blob,
    /// Dialect type with no normalized form; bound and decoded as text.
    Other(String),
}

impl SqlType {
    /// Parse a PostgreSQL `udt_name` (e.g. "int4", "timestamptz").
    pub fn from_postgres(udt: &str, max_length: Option<u32>) -> SqlType {
        match udt.to_lowercase().as_str() {
            "int2" | "smallint" | "smallserial" => SqlType::SmallInt,
            "int4" | "integer" | "serial" => SqlType::Integer,
            "int8" | "bigint" | "bigserial" => SqlType::BigInt,
            "float4" => SqlType::Real,
            "float8" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Decimal,
            "bool" | "boolean" => SqlType::Boolean,
            "varchar" | "bpchar" | "character varying" | "character" => SqlType::Varchar(max_length),
            "text" | "name" | "citext" => SqlType::Text,
            "date" => SqlType::Date,
            "time" | "timetz" => SqlType::Time,
            "timestamp" | "timestamptz" => SqlType::Timestamp,
            "json" | "jsonb" => SqlType::Json,
            "uuid" => SqlType::Uuid,
            "bytea" => SqlType::Blob,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// Parse a MySQL/MariaDB `DATA_TYPE` (e.g. "int", "datetime").
    pub fn from_mysql(data_type: &str, max_length: Option<u32>) -> SqlType {
        match data_type.to_lowercase().as_str() {
            "tinyint" | "smallint" => SqlType::SmallInt,
            "int" | "mediumint" | "integer" => SqlType::Integer,
            "bigint" => SqlType::BigInt,
            "float" => SqlType::Real,
            "double" => SqlType::Double,
            "decimal" | "numeric" => SqlType::Decimal,
            "bit" | "bool" | "boolean" => SqlType::Boolean,
            "varchar" | "char" => SqlType::Varchar(max_length),
            "text" | "tinytext" | "mediumtext" | "longtext" | "enum" => SqlType::Text,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::Timestamp,
            "json" => SqlType::Json,
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => SqlType::Blob,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// Parse a SQLite declared type (e.g. "INTEGER", "VARCHAR(42)").
    /// SQLite column types are affinities, so this matches on the leading word.
    pub fn from_sqlite(declared: &str) -> SqlType {
        let lower = declared.to_lowercase();
        let (base, len) = match lower.find('(') {
            Some(open) => {
                let len = lower[open + 1..]
                    .trim_end_matches(')')
                    .trim()
                    .parse::<u32>()
                    .ok();
                (lower[..open].trim().to_string(), len)
            }
            None => (lower.trim().to_string(), None),
        };
        match base.as_str() {
            "smallint" | "tinyint" => SqlType::SmallInt,
            "int" | "integer" | "mediumint" => SqlType::Integer,
            "bigint" | "unsigned big int" | "int8" => SqlType::BigInt,
            "real" | "float" => SqlType::Real,
            "double" | "double precision" => SqlType::Double,
            "numeric" | "decimal" => SqlType::Decimal,
            "boolean" | "bool" => SqlType::Boolean,
            "varchar" | "character" | "nchar" | "nvarchar" | "varying character" => {
                SqlType::Varchar(len)
            }
            "text" | "clob" => SqlType::Text,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::Timestamp,
            "json" => SqlType::Json,
            "blob" | "" => SqlType::Blob,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// Whether values of this type are stamped by the auto-timestamp feature.
    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Timestamp | SqlType::Date | SqlType::Time)
    }
}

/// Foreign-key relation declared on a column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRef {
    pub target_table: String,
    pub target_column: String,
}

/// One introspected column. Identity is (table, name).
#[derive(Clone, Debug, Serialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
    /// Whether the column carries a database-side default. INSERT omits
    /// defaulted columns the caller did not provide.
    pub has_default: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

/// One introspected table, columns in ordinal (introspection) order.
#[derive(Clone, Debug, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key members in column order.
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgres_types() {
        assert_eq!(SqlType::from_postgres("int4", None), SqlType::Integer);
        assert_eq!(SqlType::from_postgres("int8", None), SqlType::BigInt);
        assert_eq!(
            SqlType::from_postgres("varchar", Some(42)),
            SqlType::Varchar(Some(42))
        );
        assert_eq!(SqlType::from_postgres("timestamptz", None), SqlType::Timestamp);
        assert_eq!(SqlType::from_postgres("uuid", None), SqlType::Uuid);
    }

    #[test]
    fn parses_mysql_types() {
        assert_eq!(SqlType::from_mysql("int", None), SqlType::Integer);
        assert_eq!(SqlType::from_mysql("datetime", None), SqlType::Timestamp);
        assert_eq!(SqlType::from_mysql("longtext", None), SqlType::Text);
    }

    #[test]
    fn parses_sqlite_declared_types() {
        assert_eq!(SqlType::from_sqlite("INTEGER"), SqlType::Integer);
        assert_eq!(SqlType::from_sqlite("VARCHAR(42)"), SqlType::Varchar(Some(42)));
        assert_eq!(SqlType::from_sqlite("DATETIME"), SqlType::Timestamp);
        assert_eq!(SqlType::from_sqlite(""), SqlType::Blob);
    }
}
