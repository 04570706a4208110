//! Award store guarded by a per-challenge `Dragonfly` lock.
//!
//! The alternative to the single-statement conditional insert: take an
//! exclusive lock keyed by the award key, read, insert if absent, and
//! release the lock whatever happened. The unique constraint on `awards`
//! still rejects a duplicate if a lock expires mid-write.

use std::time::Duration;

use firstblood_core::{AwardStore, InsertOutcome, StoreError};
use firstblood_types::{AwardKey, AwardRecord, NewAward};
use tokio::time::Instant;
use uuid::Uuid;

use crate::award_store::PgAwardStore;
use crate::dragonfly::{lock_key, DragonflyPool};
use crate::error::DbError;

/// Pause between attempts on a busy lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Read-check-write under an exclusive per-key lock.
#[derive(Clone)]
pub struct LockedAwardStore {
    awards: PgAwardStore,
    locks: DragonflyPool,
    lock_ttl: Duration,
    lock_wait: Duration,
}

impl LockedAwardStore {
    /// Create a locked store.
    ///
    /// `lock_ttl` must exceed the longest expected write; `lock_wait` bounds
    /// how long a caller queues behind another holder.
    pub const fn new(
        awards: PgAwardStore,
        locks: DragonflyPool,
        lock_ttl: Duration,
        lock_wait: Duration,
    ) -> Self {
        Self {
            awards,
            locks,
            lock_ttl,
            lock_wait,
        }
    }

    /// The underlying `PostgreSQL` store.
    pub const fn awards(&self) -> &PgAwardStore {
        &self.awards
    }

    /// The `Dragonfly` lock handle.
    pub const fn locks(&self) -> &DragonflyPool {
        &self.locks
    }

    async fn acquire(&self, key: &str, token: &str) -> Result<(), DbError> {
        let deadline = Instant::now()
            .checked_add(self.lock_wait)
            .unwrap_or_else(Instant::now);

        loop {
            if self.locks.try_lock(key, token, self.lock_ttl).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DbError::LockTimeout {
                    key: key.to_owned(),
                });
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    async fn read_check_write(&self, award: &NewAward) -> Result<Option<AwardRecord>, DbError> {
        if self.awards.get_award(&award.key()).await?.is_some() {
            return Ok(None);
        }
        self.awards.insert_award(award).await
    }
}

impl AwardStore for LockedAwardStore {
    async fn insert_if_absent(&self, award: &NewAward) -> Result<InsertOutcome, StoreError> {
        let key = lock_key(&award.key());
        let token = Uuid::now_v7().to_string();

        self.acquire(&key, &token).await?;

        let result = self.read_check_write(award).await;

        match self.locks.unlock(&key, &token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(lock = key, "Award lock expired before release"),
            Err(e) => tracing::warn!(lock = key, error = %e, "Failed to release award lock"),
        }

        let inserted = result?;
        Ok(inserted.map_or(InsertOutcome::AlreadyPresent, InsertOutcome::Inserted))
    }

    async fn find_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, StoreError> {
        Ok(self.awards.get_award(key).await?)
    }
}
