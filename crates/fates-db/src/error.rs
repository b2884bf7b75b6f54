//! Database error types and mapping into the engine taxonomy

use thiserror::Error;

use fates_types::FatesError;

/// Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Database layer errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Row decode error: {0}")]
    Decode(String),
}

/// Map a sqlx error into the engine taxonomy.
///
/// Everything the driver reports is transient from the engine's point of
/// view; constraint-specific handling happens in the repositories, where
/// the domain meaning of a violation is known.
pub fn db_err(err: sqlx::Error) -> FatesError {
    FatesError::transient(format!("database error: {err}"))
}

/// Whether an error is a unique-constraint violation (PostgreSQL 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
