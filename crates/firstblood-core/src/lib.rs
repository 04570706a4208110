//! First blood arbitration core.
//!
//! Decides which of many concurrent completions of a challenge was first and
//! persists that decision exactly once. The crate holds no lock of its own:
//! the [`AwardStore`] contract requires an atomic, immediately committed
//! conditional insert, and the store's uniqueness constraint on
//! (`category`, `name`) is the only synchronization point.
//!
//! # Pipeline
//!
//! ```text
//! CompletionNotification
//!     |
//!     +-- CompletionListener  (filters challenge types, spawns, never blocks)
//!         |
//!         +-- Arbitrator      (validates, builds the award, maps the outcome)
//!             |
//!             +-- AwardStore::insert_if_absent  (one atomic conditional write)
//! ```
//!
//! # Modules
//!
//! - [`arbitrator`] -- The arbitration entry point
//! - [`store`] -- The award store contract
//! - [`memory`] -- In-process store for tests and local runs
//! - [`listener`] -- Completion listener and outcome sinks
//! - [`config`] -- YAML configuration

pub mod arbitrator;
pub mod config;
pub mod listener;
pub mod memory;
pub mod store;

pub use arbitrator::{ArbitrationError, Arbitrator};
pub use config::{AwardConfig, ConfigError, FirstBloodConfig};
pub use listener::{CompletionListener, OutcomeSink};
pub use memory::InMemoryAwardStore;
pub use store::{AwardStore, InsertOutcome, StoreError};
