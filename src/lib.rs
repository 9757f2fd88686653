//! # dbmap
//!
//! Schema-introspecting entity mapper: point it at an existing PostgreSQL,
//! MySQL, MariaDB or SQLite database and get a typed CRUD surface for every
//! discovered table, with no mapping files.
//!
//! - **Introspection-first**: tables, columns, nullability, primary keys and
//!   foreign keys are derived from the live catalogs at connect time.
//! - **One contract, four dialects**: placeholders, quoting, auto-increment
//!   detection and RETURNING emulation differ per engine; entities do not.
//! - **Injection-safe by construction**: identifiers are quoted, values only
//!   ever travel as bind parameters.
//! - **Hookable**: wrap any generated operation with your own before/after
//!   logic without losing its signature or error behavior.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbmap::{connect, FindOptions, MapperConfig};
//!
//! #[tokio::main]
//! async fn main() -> dbmap::Result<()> {
//!     let mapper = connect(MapperConfig::new("sqlite://data.db")).await?;
//!     let pages = mapper.entity("page")?;
//!     let rows = pages.find(FindOptions::default()).await?;
//!     println!("{} pages", rows.len());
//!     mapper.dispose().await;
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod inflection;
pub mod introspect;
pub mod mapper;
pub mod schema;
pub mod sql;

// Re-exports for convenient access
pub use db::{Db, ExecResult};
pub use dialect::Dialect;
pub use entity::{
    Condition, Criteria, DeleteOptions, Entity, FindOptions, InsertOptions, Operator, OrderBy,
    Record, SaveOptions, UpdateManyOptions,
};
pub use error::{MapperError, Result};
pub use hooks::{
    delete_hook, find_hook, insert_hook, save_hook, update_many_hook, wrap, BoxFuture, EntityHooks,
};
pub use mapper::{connect, on_database_load, IgnoreRule, Mapper, MapperConfig, OnDatabaseLoad};
pub use schema::{Column, ForeignKeyRef, SqlType, TableInfo};
pub use sql::{SqlBuilder, SqlValue};
