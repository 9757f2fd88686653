//! The connector: opens the dialect connection, introspects the schema,
//! builds one entity per table, wires hooks, and owns the registry.

use crate::db::Db;
use crate::dialect::{Dialect, DialectFamily};
use crate::entity::Entity;
use crate::error::{MapperError, Result};
use crate::hooks::{BoxFuture, EntityHooks};
use crate::introspect;
use serde_json::Value;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Callback invoked with the open connection before introspection, so the
/// caller can seed or alter schema. An error here disposes the connection and
/// aborts the connect with no entities built.
pub type OnDatabaseLoad = Box<dyn FnOnce(Db) -> BoxFuture<Result<()>> + Send>;

/// Per-table ignore rule: skip the whole table, or redact named columns.
#[derive(Clone, Debug)]
pub enum IgnoreRule {
    Table,
    Columns(HashSet<String>),
}

/// Connect-time configuration. Validated, not deserialized, here.
pub struct MapperConfig {
    /// Required. The prefix selects the dialect: `postgres://`, `mysql://`
    /// (MariaDB detected by version probe) or `sqlite://`
    /// (`sqlite://:memory:` for an ephemeral database).
    pub connection_string: String,
    /// Tables to skip entirely or columns to redact, keyed by table name.
    pub ignore: HashMap<String, IgnoreRule>,
    /// Stamp `created_at`/`updated_at` columns when present in the schema.
    pub auto_timestamp: bool,
    /// Hooks applied during the connect phase, keyed by table or singular
    /// entity name.
    pub hooks: HashMap<String, EntityHooks>,
    pub on_database_load: Option<OnDatabaseLoad>,
    /// Pool size for the server dialects. SQLite always uses a single
    /// connection so writes serialize instead of corrupting.
    pub max_connections: u32,
}

impl MapperConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        MapperConfig {
            connection_string: connection_string.into(),
            ignore: HashMap::new(),
            auto_timestamp: true,
            hooks: HashMap::new(),
            on_database_load: None,
            max_connections: 5,
        }
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig::new("")
    }
}

/// Box an async closure for [`MapperConfig::on_database_load`].
pub fn on_database_load<F, Fut>(f: F) -> OnDatabaseLoad
where
    F: FnOnce(Db) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |db| Box::pin(f(db)))
}

/// The connected entity registry. Read-only after the connect phase; hook
/// application rewrites operation slots, never the registry itself.
pub struct Mapper {
    /// Raw parameterized-query surface, for ad-hoc SQL outside the generated
    /// CRUD operations.
    pub db: Db,
    entities: HashMap<String, Entity>,
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Mapper {
    /// Entities keyed by singular name.
    pub fn entities(&self) -> &HashMap<String, Entity> {
        &self.entities
    }

    /// Look up an entity by singular name, falling back to table name.
    pub fn entity(&self, name: &str) -> Result<&Entity> {
        find_entity(&self.entities, name).ok_or_else(|| MapperError::UnknownEntity(name.to_string()))
    }

    /// Compose hooks onto an entity's operations. Repeated calls stack
    /// left-to-right: each composition wraps the previous function value.
    pub fn add_entity_hooks(&self, name: &str, hooks: EntityHooks) -> Result<()> {
        let entity = self.entity(name)?;
        entity.apply_hooks(&hooks);
        Ok(())
    }

    /// Dispose the underlying connection. Idempotent; afterwards every entity
    /// operation fails with [`MapperError::ConnectionClosed`].
    pub async fn dispose(&self) {
        self.db.dispose().await;
    }
}

/// Open the connection, snapshot the schema, and build the entity registry.
///
/// Fatal at this stage (connection disposed before the error propagates):
/// unreachable database, failing `on_database_load`, catalog query errors,
/// tables with zero or composite primary keys, singular-name collisions.
pub async fn connect(config: MapperConfig) -> Result<Mapper> {
    let MapperConfig {
        connection_string,
        ignore,
        auto_timestamp,
        hooks,
        on_database_load,
        max_connections,
    } = config;
    if connection_string.is_empty() {
        return Err(MapperError::MissingConnectionString);
    }
    let family = DialectFamily::from_connection_string(&connection_string)
        .map_err(MapperError::UnsupportedDialect)?;
    let max_connections = max_connections.max(1);

    let db = match family {
        DialectFamily::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(&connection_string)
                .await?;
            Db::postgres(pool)
        }
        DialectFamily::MySql => {
            let pool = MySqlPoolOptions::new()
                .max_connections(max_connections)
                .connect(&connection_string)
                .await?;
            let db = Db::mysql(pool.clone(), Dialect::MySql);
            match probe_mariadb(&db).await {
                Ok(true) => Db::mysql(pool, Dialect::MariaDb),
                Ok(false) => db,
                Err(e) => {
                    db.dispose().await;
                    return Err(e);
                }
            }
        }
        DialectFamily::Sqlite => {
            let rest = connection_string
                .strip_prefix("sqlite://")
                .unwrap_or(&connection_string);
            let options = if rest == ":memory:" {
                SqliteConnectOptions::from_str("sqlite::memory:")?
            } else {
                SqliteConnectOptions::from_str(&connection_string)?.create_if_missing(true)
            };
            // single connection, never reaped: a replacement connection
            // would observe a fresh (empty) in-memory database
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;
            Db::sqlite(pool)
        }
    };
    tracing::info!(dialect = %db.dialect(), "connected");

    match build_registry(&db, ignore, auto_timestamp, hooks, on_database_load).await {
        Ok(entities) => Ok(Mapper { db, entities }),
        Err(e) => {
            db.dispose().await;
            Err(e)
        }
    }
}

/// MariaDB ships the MySQL wire protocol; only the version banner tells the
/// two apart, and the distinction drives RETURNING emulation.
async fn probe_mariadb(db: &Db) -> Result<bool> {
    let rows = db.fetch_all("SELECT VERSION() AS version", &[]).await?;
    let version = rows
        .first()
        .and_then(|row| row.get("version"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    tracing::debug!(version = %version, "mysql family version probe");
    Ok(version.contains("maria"))
}

async fn build_registry(
    db: &Db,
    ignore: HashMap<String, IgnoreRule>,
    auto_timestamp: bool,
    hooks: HashMap<String, EntityHooks>,
    on_database_load: Option<OnDatabaseLoad>,
) -> Result<HashMap<String, Entity>> {
    if let Some(load) = on_database_load {
        load(db.clone()).await?;
    }

    let tables = introspect::list_tables(db).await?;
    let mut entities: HashMap<String, Entity> = HashMap::new();
    for table in tables {
        let ignored_columns = match ignore.get(&table) {
            Some(IgnoreRule::Table) => continue,
            Some(IgnoreRule::Columns(columns)) => columns.clone(),
            None => HashSet::new(),
        };
        let info = introspect::table_info(db, &table).await?;
        let entity = Entity::build(db.clone(), info, auto_timestamp, &ignored_columns)?;
        let key = entity.singular_name().to_string();
        if entities.contains_key(&key) {
            return Err(MapperError::DuplicateEntity(key));
        }
        tracing::debug!(table = %entity.name(), entity = %key, "registered entity");
        entities.insert(key, entity);
    }

    for (name, hook_set) in &hooks {
        match find_entity(&entities, name) {
            Some(entity) => entity.apply_hooks(hook_set),
            None => tracing::warn!(entity = %name, "hooks configured for unknown entity"),
        }
    }
    Ok(entities)
}

fn find_entity<'a>(entities: &'a HashMap<String, Entity>, name: &str) -> Option<&'a Entity> {
    entities
        .get(name)
        .or_else(|| entities.values().find(|e| e.name() == name))
}
