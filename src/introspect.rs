//! Schema introspection: derive tables, columns, keys and relations from the
//! live database's catalogs. One implementation per dialect because the
//! catalog surfaces differ; results are normalized into [`TableInfo`].
//!
//! Any catalog failure is fatal [`MapperError::SchemaIntrospection`] — the
//! connector never builds a partial entity set.

use crate::db::Db;
use crate::dialect::Dialect;
use crate::error::{MapperError, Result};
use crate::schema::{Column, ForeignKeyRef, SqlType, TableInfo};
use crate::sql::SqlValue;
use serde_json::Value;

/// List the user tables visible on the connection.
pub async fn list_tables(db: &Db) -> Result<Vec<String>> {
    let sql = match db.dialect() {
        Dialect::Postgres => {
            "SELECT table_name AS table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name"
        }
        Dialect::MySql | Dialect::MariaDb => {
            "SELECT table_name AS table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
             ORDER BY table_name"
        }
        Dialect::Sqlite => {
            "SELECT name AS table_name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        }
    };
    let rows = db
        .fetch_all(sql, &[])
        .await
        .map_err(|e| MapperError::introspection(format!("listing tables: {}", e)))?;
    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        match get_str(row, "table_name") {
            Some(name) => tables.push(name),
            None => {
                return Err(MapperError::introspection(
                    "catalog returned a table without a name",
                ))
            }
        }
    }
    Ok(tables)
}

/// Introspect one table: columns in ordinal order with nullability, defaults,
/// auto-increment, primary-key membership and foreign keys.
pub async fn table_info(db: &Db, table: &str) -> Result<TableInfo> {
    tracing::debug!(table = %table, dialect = %db.dialect(), "introspecting table");
    match db.dialect() {
        Dialect::Postgres => postgres_table_info(db, table).await,
        Dialect::MySql | Dialect::MariaDb => mysql_table_info(db, table).await,
        Dialect::Sqlite => sqlite_table_info(db, table).await,
    }
    .map_err(|e| match e {
        MapperError::SchemaIntrospection(_) => e,
        other => MapperError::introspection(format!("table '{}': {}", table, other)),
    })
}

async fn postgres_table_info(db: &Db, table: &str) -> Result<TableInfo> {
    let columns_sql = "SELECT column_name AS column_name, \
            udt_name AS udt_name, \
            character_maximum_length AS character_maximum_length, \
            is_nullable AS is_nullable, \
            column_default AS column_default, \
            COALESCE((SELECT true FROM pg_catalog.pg_class c \
                JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid \
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                WHERE n.nspname = columns.table_schema \
                  AND c.relname = columns.table_name \
                  AND a.attname = columns.column_name \
                  AND a.attidentity IN ('a', 'd')), false) AS is_identity \
         FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 \
         ORDER BY ordinal_position";
    let rows = db
        .fetch_all(columns_sql, &[SqlValue::Text(Some(table.to_string()))])
        .await?;

    let pk_sql = "SELECT a.attname AS column_name \
         FROM pg_catalog.pg_constraint c \
         JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
         JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid \
         WHERE n.nspname = 'public' AND t.relname = $1 \
           AND c.contype = 'p' AND a.attnum = ANY(c.conkey) \
         ORDER BY array_position(c.conkey, a.attnum)";
    let pk_rows = db
        .fetch_all(pk_sql, &[SqlValue::Text(Some(table.to_string()))])
        .await?;
    let pk_names: Vec<String> = pk_rows
        .iter()
        .filter_map(|r| get_str(r, "column_name"))
        .collect();

    let fk_sql = "SELECT a.attname AS column_name, \
            rt.relname AS target_table, \
            ra.attname AS target_column \
         FROM pg_catalog.pg_constraint c \
         JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
         JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
         JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid \
         JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = c.conkey[1] \
         JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = c.confkey[1] \
         WHERE n.nspname = 'public' AND t.relname = $1 AND c.contype = 'f'";
    let fk_rows = db
        .fetch_all(fk_sql, &[SqlValue::Text(Some(table.to_string()))])
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = require_str(row, "column_name")?;
        let udt = require_str(row, "udt_name")?;
        let max_length = get_u32(row, "character_maximum_length");
        let default = get_str(row, "column_default");
        let is_identity = get_bool(row, "is_identity");
        let is_serial = default
            .as_deref()
            .map(|d| d.starts_with("nextval("))
            .unwrap_or(false);
        columns.push(Column {
            sql_type: SqlType::from_postgres(&udt, max_length),
            nullable: get_str(row, "is_nullable").as_deref() == Some("YES"),
            is_primary_key: pk_names.contains(&name),
            is_auto_increment: is_identity || is_serial,
            has_default: default.is_some() || is_identity,
            foreign_key: find_fk(&fk_rows, &name),
            name,
        });
    }
    Ok(TableInfo {
        name: table.to_string(),
        columns,
    })
}

async fn mysql_table_info(db: &Db, table: &str) -> Result<TableInfo> {
    let columns_sql = "SELECT column_name AS column_name, \
            data_type AS data_type, \
            character_maximum_length AS character_maximum_length, \
            is_nullable AS is_nullable, \
            column_default AS column_default, \
            column_key AS column_key, \
            extra AS extra \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? \
         ORDER BY ordinal_position";
    let rows = db
        .fetch_all(columns_sql, &[SqlValue::Text(Some(table.to_string()))])
        .await?;

    let fk_sql = "SELECT column_name AS column_name, \
            referenced_table_name AS target_table, \
            referenced_column_name AS target_column \
         FROM information_schema.key_column_usage \
         WHERE table_schema = DATABASE() AND table_name = ? \
           AND referenced_table_name IS NOT NULL";
    let fk_rows = db
        .fetch_all(fk_sql, &[SqlValue::Text(Some(table.to_string()))])
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = require_str(row, "column_name")?;
        let data_type = require_str(row, "data_type")?;
        let extra = get_str(row, "extra").unwrap_or_default().to_lowercase();
        let is_auto_increment = extra.contains("auto_increment");
        let default = get_str(row, "column_default");
        columns.push(Column {
            sql_type: SqlType::from_mysql(&data_type, get_u32(row, "character_maximum_length")),
            nullable: get_str(row, "is_nullable")
                .map(|v| v.eq_ignore_ascii_case("YES"))
                .unwrap_or(false),
            is_primary_key: get_str(row, "column_key")
                .map(|v| v.eq_ignore_ascii_case("PRI"))
                .unwrap_or(false),
            is_auto_increment,
            has_default: default.is_some() || is_auto_increment,
            foreign_key: find_fk(&fk_rows, &name),
            name,
        });
    }
    Ok(TableInfo {
        name: table.to_string(),
        columns,
    })
}

async fn sqlite_table_info(db: &Db, table: &str) -> Result<TableInfo> {
    // PRAGMA takes no bind parameters; the table name comes from
    // sqlite_master and is still quoted like any identifier.
    let quoted = Dialect::Sqlite.quote(table);
    let rows = db
        .fetch_all(&format!("PRAGMA table_info({})", quoted), &[])
        .await?;
    let fk_rows = db
        .fetch_all(&format!("PRAGMA foreign_key_list({})", quoted), &[])
        .await?;

    let foreign_keys: Vec<Value> = fk_rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "column_name": get_str(row, "from"),
                "target_table": get_str(row, "table"),
                // a missing "to" means the reference is to the target's
                // primary key; resolve to the conventional id column
                "target_column": get_str(row, "to").unwrap_or_else(|| "id".to_string()),
            })
        })
        .collect();

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = require_str(row, "name")?;
        let declared = get_str(row, "type").unwrap_or_default();
        let sql_type = SqlType::from_sqlite(&declared);
        let pk_position = get_i64(row, "pk").unwrap_or(0);
        let is_primary_key = pk_position > 0;
        // INTEGER PRIMARY KEY is a rowid alias: the only auto-increment case
        // detected for SQLite. Bare rowid tables stay unsupported.
        let is_rowid_alias = is_primary_key && sql_type == SqlType::Integer;
        let has_default = !matches!(row.get("dflt_value"), None | Some(Value::Null));
        columns.push(Column {
            sql_type,
            nullable: get_i64(row, "notnull").unwrap_or(0) == 0 && !is_primary_key,
            is_primary_key,
            is_auto_increment: is_rowid_alias,
            has_default: has_default || is_rowid_alias,
            foreign_key: find_fk(&foreign_keys, &name),
            name,
        });
    }
    Ok(TableInfo {
        name: table.to_string(),
        columns,
    })
}

fn find_fk(fk_rows: &[Value], column: &str) -> Option<ForeignKeyRef> {
    fk_rows.iter().find_map(|row| {
        let col = get_str(row, "column_name")?;
        if col != column {
            return None;
        }
        Some(ForeignKeyRef {
            target_table: get_str(row, "target_table")?,
            target_column: get_str(row, "target_column")?,
        })
    })
}

/// Fetch a string cell, reconciling catalogs that fold identifier case
/// (MySQL/MariaDB) by falling back to a case-insensitive key match.
fn get_str(row: &Value, key: &str) -> Option<String> {
    let obj = row.as_object()?;
    let value = obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn require_str(row: &Value, key: &str) -> Result<String> {
    get_str(row, key)
        .ok_or_else(|| MapperError::introspection(format!("catalog row is missing '{}'", key)))
}

fn get_bool(row: &Value, key: &str) -> bool {
    let Some(obj) = row.as_object() else {
        return false;
    };
    let value = obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    });
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

fn get_i64(row: &Value, key: &str) -> Option<i64> {
    row.as_object()?.get(key)?.as_i64()
}

fn get_u32(row: &Value, key: &str) -> Option<u32> {
    let obj = row.as_object()?;
    let value = obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })?;
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}
