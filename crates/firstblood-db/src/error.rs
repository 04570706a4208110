//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. At the arbitration boundary every variant
//! collapses into [`StoreError::Unavailable`]: the arbitrator only needs to
//! know that the write could not be attempted.

use firstblood_core::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A per-challenge lock stayed busy past the wait limit.
    #[error("timed out waiting for lock {key}")]
    LockTimeout {
        /// The contended lock key.
        key: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        Self::unavailable(e.to_string())
    }
}

/// Whether `e` is a unique-constraint violation (`SQLSTATE 23505`).
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
