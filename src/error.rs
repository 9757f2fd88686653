//! Typed errors for the mapper and its entity operations.

use thiserror::Error;

/// Main error type for connect-time and per-operation failures.
#[derive(Error, Debug)]
pub enum MapperError {
    /// `connection_string` was empty or missing.
    #[error("connection string is required")]
    MissingConnectionString,

    /// Connection string prefix did not match a supported dialect.
    #[error("unsupported dialect: '{0}' (expected postgres://, mysql:// or sqlite://)")]
    UnsupportedDialect(String),

    /// A catalog query failed during introspection. Fatal at connect time.
    #[error("schema introspection failed: {0}")]
    SchemaIntrospection(String),

    /// A table exposed zero or more than one primary-key candidate.
    #[error("cannot find a single primary key for table '{0}'")]
    MissingPrimaryKey(String),

    /// Two tables singularized to the same registry key.
    #[error("duplicate entity name '{0}'")]
    DuplicateEntity(String),

    /// Entity lookup by singular or table name found nothing.
    #[error("cannot find entity '{0}'")]
    UnknownEntity(String),

    /// A criteria, projection or order-by field is not a column of the entity.
    #[error("unknown field '{field}' for entity '{entity}'")]
    InvalidField { entity: String, field: String },

    /// Save by primary key matched no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted after `dispose()`.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Transport or query error reported by the driver. Never retried here.
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl MapperError {
    /// Introspection failure with table/dialect context.
    pub fn introspection(detail: impl Into<String>) -> Self {
        MapperError::SchemaIntrospection(detail.into())
    }

    pub fn invalid_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        MapperError::InvalidField {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, MapperError>;
