//! Store selection.
//!
//! The arbitrator is generic over its store; the service picks one of the
//! two realizations at startup from `arbitration.strategy`.

use std::time::Duration;

use firstblood_core::config::{ArbitrationConfig, ArbitrationStrategy, InfrastructureConfig};
use firstblood_core::{AwardStore, InsertOutcome, StoreError};
use firstblood_db::{DbError, DragonflyPool, LockedAwardStore, PgAwardStore, PostgresPool};
use firstblood_types::{AwardKey, AwardRecord, NewAward};
use tracing::{info, warn};

/// The store chosen by configuration.
#[derive(Clone)]
pub enum ConfiguredStore {
    /// Single-statement conditional insert.
    ConditionalInsert(PgAwardStore),
    /// Dragonfly lock around read-check-write.
    DistributedLock(LockedAwardStore),
}

impl ConfiguredStore {
    /// Build the store for `arbitration.strategy`, connecting to Dragonfly
    /// only when the lock strategy needs it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if Dragonfly cannot be reached.
    pub async fn connect(
        postgres: &PostgresPool,
        arbitration: &ArbitrationConfig,
        infra: &InfrastructureConfig,
    ) -> Result<Self, DbError> {
        match arbitration.strategy {
            ArbitrationStrategy::ConditionalInsert => {
                info!("Using conditional insert arbitration");
                Ok(Self::ConditionalInsert(postgres.award_store()))
            }
            ArbitrationStrategy::DistributedLock => {
                let locks = DragonflyPool::connect(&infra.dragonfly_url).await?;
                info!(
                    lock_ttl_ms = arbitration.lock_ttl_ms,
                    lock_wait_ms = arbitration.lock_wait_ms,
                    "Using distributed lock arbitration"
                );
                Ok(Self::DistributedLock(LockedAwardStore::new(
                    postgres.award_store(),
                    locks,
                    Duration::from_millis(arbitration.lock_ttl_ms),
                    Duration::from_millis(arbitration.lock_wait_ms),
                )))
            }
        }
    }

    /// Release connections held outside the `PostgreSQL` pool.
    pub async fn close(&self) {
        if let Self::DistributedLock(store) = self {
            if let Err(e) = store.locks().close().await {
                warn!(error = %e, "Failed to close Dragonfly connection");
            }
        }
    }
}

impl AwardStore for ConfiguredStore {
    async fn insert_if_absent(&self, award: &NewAward) -> Result<InsertOutcome, StoreError> {
        match self {
            Self::ConditionalInsert(store) => store.insert_if_absent(award).await,
            Self::DistributedLock(store) => store.insert_if_absent(award).await,
        }
    }

    async fn find_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, StoreError> {
        match self {
            Self::ConditionalInsert(store) => store.find_award(key).await,
            Self::DistributedLock(store) => store.find_award(key).await,
        }
    }
}
