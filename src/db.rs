//! Live connection handle shared by every entity: a tagged pool over the
//! supported drivers plus the raw parameterized-query surface. Rows cross the
//! boundary as JSON objects keyed by column name.

use crate::dialect::Dialect;
use crate::error::{MapperError, Result};
use crate::sql::SqlValue;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
enum Pool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Outcome of a non-returning statement.
#[derive(Clone, Copy, Debug)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated key reported by the driver, where the engine has one
    /// (MySQL/MariaDB `LAST_INSERT_ID()`, SQLite rowid).
    pub last_insert_id: Option<i64>,
}

/// Shared database handle. Cheap to clone; the connector owns its lifecycle
/// and `dispose()` is idempotent. After disposal every call fails fast with
/// [`MapperError::ConnectionClosed`] instead of hanging on a drained pool.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
    dialect: Dialect,
    closed: Arc<AtomicBool>,
}

impl Db {
    pub(crate) fn postgres(pool: PgPool) -> Self {
        Db {
            pool: Pool::Postgres(pool),
            dialect: Dialect::Postgres,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `dialect` is MySql or MariaDb, decided by the connect-time version probe.
    pub(crate) fn mysql(pool: MySqlPool, dialect: Dialect) -> Self {
        Db {
            pool: Pool::MySql(pool),
            dialect,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn sqlite(pool: SqlitePool) -> Self {
        Db {
            pool: Pool::Sqlite(pool),
            dialect: Dialect::Sqlite,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MapperError::ConnectionClosed);
        }
        Ok(())
    }

    /// Close the pool. Idempotent; the first call wins and later calls are
    /// no-ops.
    pub async fn dispose(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(dialect = %self.dialect, "disposing connection");
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::MySql(pool) => pool.close().await,
            Pool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Run a statement and fetch every row as a JSON object.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Value>> {
        self.ensure_open()?;
        tracing::debug!(sql = %sql, params = ?params, "query");
        let rows = match &self.pool {
            Pool::Postgres(pool) => bind_pg(sql, params)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(pg_row_to_json).collect()),
            Pool::MySql(pool) => bind_mysql(sql, params)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(mysql_row_to_json).collect()),
            Pool::Sqlite(pool) => bind_sqlite(sql, params)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(sqlite_row_to_json).collect()),
        };
        rows.map_err(|e| self.query_error(sql, e))
    }

    /// Run a statement and fetch at most one row.
    pub async fn fetch_optional(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Value>> {
        self.ensure_open()?;
        tracing::debug!(sql = %sql, params = ?params, "query");
        let row = match &self.pool {
            Pool::Postgres(pool) => bind_pg(sql, params)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(pg_row_to_json)),
            Pool::MySql(pool) => bind_mysql(sql, params)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(mysql_row_to_json)),
            Pool::Sqlite(pool) => bind_sqlite(sql, params)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(sqlite_row_to_json)),
        };
        row.map_err(|e| self.query_error(sql, e))
    }

    /// Run a statement for its side effect.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        self.ensure_open()?;
        tracing::debug!(sql = %sql, params = ?params, "query");
        let done = match &self.pool {
            Pool::Postgres(pool) => {
                bind_pg(sql, params).execute(pool).await.map(|r| ExecResult {
                    rows_affected: r.rows_affected(),
                    last_insert_id: None,
                })
            }
            Pool::MySql(pool) => bind_mysql(sql, params)
                .execute(pool)
                .await
                .map(|r| ExecResult {
                    rows_affected: r.rows_affected(),
                    last_insert_id: Some(r.last_insert_id() as i64),
                }),
            Pool::Sqlite(pool) => bind_sqlite(sql, params)
                .execute(pool)
                .await
                .map(|r| ExecResult {
                    rows_affected: r.rows_affected(),
                    last_insert_id: Some(r.last_insert_rowid()),
                }),
        };
        done.map_err(|e| self.query_error(sql, e))
    }

    fn query_error(&self, sql: &str, e: sqlx::Error) -> MapperError {
        tracing::error!(sql = %sql, error = %e, "query error");
        MapperError::Db(e)
    }
}

fn bind_pg<'q>(
    sql: &'q str,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = match p {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

fn bind_mysql<'q>(
    sql: &'q str,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = match p {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

fn bind_sqlite<'q>(
    sql: &'q str,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = match p {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

fn pg_row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), pg_cell(row, col.name()));
    }
    Value::Object(map)
}

fn pg_cell(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    // TODO: decode numeric columns via the sqlx bigdecimal feature instead of
    // falling through to null
    Value::Null
}

fn mysql_row_to_json(row: &MySqlRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), mysql_cell(row, col.name()));
    }
    Value::Object(map)
}

fn mysql_cell(row: &MySqlRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<u64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

fn sqlite_row_to_json(row: &SqliteRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), sqlite_cell(row, col.name()));
    }
    Value::Object(map)
}

fn sqlite_cell(row: &SqliteRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    Value::Null
}
