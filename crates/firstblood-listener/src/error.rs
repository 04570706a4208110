//! Error types for the listener binary.
//!
//! [`ListenerError`] wraps every failure mode of startup and the
//! notification loop so `main` can propagate with `?`. Arbitration failures
//! are not among them: those are logged per notification and never stop
//! the service.

/// Top-level error for the listener binary.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: firstblood_core::ConfigError,
    },

    /// Connecting to or migrating a store failed.
    #[error("store error: {source}")]
    Db {
        /// The underlying data layer error.
        #[from]
        source: firstblood_db::DbError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },
}
