//! Data layer for first blood arbitration (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` holds the `awards` table and its unique constraint on
//! (`category`, `name`), the authoritative guard against duplicate awards.
//! `Dragonfly` is only used by the lock-based store.
//!
//! # Stores
//!
//! ```text
//! Arbitrator
//!     |
//!     +-- PgAwardStore       (INSERT ... SELECT ... WHERE NOT EXISTS, own transaction)
//!     |
//!     +-- LockedAwardStore   (Dragonfly lock -> SELECT -> INSERT -> unlock)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, migrations
//! - [`award_store`] -- Conditional insert and award queries
//! - [`dragonfly`] -- `Dragonfly` per-key locks
//! - [`locked_store`] -- Lock-based store
//! - [`error`] -- Shared error types

pub mod award_store;
pub mod dragonfly;
pub mod error;
pub mod locked_store;
pub mod postgres;

// Re-export primary types for convenience.
pub use award_store::{AwardRow, PgAwardStore};
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use locked_store::LockedAwardStore;
pub use postgres::{PostgresConfig, PostgresPool};
