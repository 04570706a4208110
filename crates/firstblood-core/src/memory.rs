//! In-process award store.
//!
//! Backs the arbitrator in unit tests and single-process runs. The map sits
//! behind one mutex, so check and insert are a single critical section, the
//! in-process analogue of the database's unique constraint. An outage can be
//! simulated with [`InMemoryAwardStore::set_available`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use firstblood_types::{AwardKey, AwardRecord, ClaimantId, NewAward};

use crate::store::{AwardStore, InsertOutcome, StoreError};

/// Award store kept in memory.
#[derive(Debug)]
pub struct InMemoryAwardStore {
    awards: Mutex<BTreeMap<AwardKey, AwardRecord>>,
    available: AtomicBool,
    insert_attempts: AtomicUsize,
}

impl Default for InMemoryAwardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAwardStore {
    /// Create an empty, available store.
    pub const fn new() -> Self {
        Self {
            awards: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            insert_attempts: AtomicUsize::new(0),
        }
    }

    /// Toggle a simulated outage. While unavailable every call fails with
    /// [`StoreError::Unavailable`] and nothing is written.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of conditional inserts that reached the store.
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// All stored awards, ordered by key. Still readable after a panic
    /// poisoned the map.
    pub fn awards(&self) -> Vec<AwardRecord> {
        self.awards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Awards held by one claimant.
    pub fn awards_for_claimant(&self, claimant: &ClaimantId) -> Vec<AwardRecord> {
        self.awards()
            .into_iter()
            .filter(|award| &award.claimant_id == claimant)
            .collect()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store is offline"))
        }
    }
}

impl AwardStore for InMemoryAwardStore {
    async fn insert_if_absent(&self, award: &NewAward) -> Result<InsertOutcome, StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut awards = self
            .awards
            .lock()
            .map_err(|e| StoreError::unavailable(format!("award map poisoned: {e}")))?;

        let key = award.key();
        if awards.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let record = award.clone().into_record(Utc::now());
        awards.insert(key, record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn find_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, StoreError> {
        self.check_available()?;
        let awards = self
            .awards
            .lock()
            .map_err(|e| StoreError::unavailable(format!("award map poisoned: {e}")))?;
        Ok(awards.get(key).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use firstblood_types::{AwardId, ChallengeRef};

    use super::*;

    fn award(challenge: &ChallengeRef, claimant: &str) -> NewAward {
        let key = AwardKey::for_challenge(challenge);
        NewAward {
            id: AwardId::new(),
            claimant_id: ClaimantId::new(claimant),
            name: key.name,
            description: String::new(),
            value: 1,
            category: key.category,
            icon: None,
        }
    }

    #[tokio::test]
    async fn second_insert_for_same_key_is_rejected() {
        let store = InMemoryAwardStore::new();
        let challenge = ChallengeRef::new("crypto", "rsa-1");

        let first = store.insert_if_absent(&award(&challenge, "A")).await;
        assert!(matches!(first, Ok(InsertOutcome::Inserted(_))));

        let second = store.insert_if_absent(&award(&challenge, "B")).await;
        assert_eq!(second, Ok(InsertOutcome::AlreadyPresent));

        assert_eq!(store.awards().len(), 1);
        assert_eq!(store.insert_attempts(), 2);
    }

    #[tokio::test]
    async fn offline_store_writes_nothing() {
        let store = InMemoryAwardStore::new();
        store.set_available(false);

        let result = store
            .insert_if_absent(&award(&ChallengeRef::new("web", "xss"), "A"))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        assert!(store.awards().is_empty());
    }

    #[tokio::test]
    async fn find_award_returns_holder() {
        let store = InMemoryAwardStore::new();
        let challenge = ChallengeRef::new("rev", "crackme");
        let _ = store.insert_if_absent(&award(&challenge, "A")).await;

        let found = store
            .find_award(&AwardKey::for_challenge(&challenge))
            .await
            .ok()
            .flatten();
        assert_eq!(
            found.map(|r| r.claimant_id),
            Some(ClaimantId::new("A"))
        );
        assert_eq!(store.awards_for_claimant(&ClaimantId::new("B")).len(), 0);
    }

    #[tokio::test]
    async fn poisoned_map_keeps_reporting_its_awards() {
        let store = Arc::new(InMemoryAwardStore::new());
        let challenge = ChallengeRef::new("misc", "sanity");
        let inserted = store.insert_if_absent(&award(&challenge, "A")).await;
        assert!(matches!(inserted, Ok(InsertOutcome::Inserted(_))));

        let poisoner = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.awards.lock().unwrap();
            panic!("poison the award map");
        })
        .join();
        assert!(joined.is_err());
        assert!(store.awards.is_poisoned());

        let awards = store.awards();
        assert_eq!(awards.len(), 1);
        assert_eq!(
            awards.first().map(|a| a.claimant_id.clone()),
            Some(ClaimantId::new("A"))
        );
    }
}
