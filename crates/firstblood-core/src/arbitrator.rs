//! The award arbitrator.
//!
//! [`Arbitrator::arbitrate`] is the single entry point the completion
//! listener calls. It is safe to call redundantly and from any number of
//! processes at once: all coordination is delegated to one conditional
//! write against the [`AwardStore`].

use firstblood_types::{
    ArbitrationOutcome, AwardId, AwardKey, AwardRecord, ChallengeRef, ClaimantId, NewAward,
};
use tracing::{debug, info, warn};

use crate::config::AwardConfig;
use crate::store::{AwardStore, InsertOutcome, StoreError};

/// Errors that can occur during arbitration.
///
/// Losing the race is not an error; it is [`ArbitrationOutcome::AlreadyAwarded`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArbitrationError {
    /// A required input was empty. Rejected before touching the store.
    #[error("invalid input: {field} must not be empty")]
    InvalidInput {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The conditional write could not be attempted.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

/// Decides which completion of a challenge is first and records it once.
#[derive(Debug)]
pub struct Arbitrator<S> {
    store: S,
    award: AwardConfig,
}

impl<S: AwardStore> Arbitrator<S> {
    /// Create an arbitrator over `store`, stamping awards with `award`.
    pub const fn new(store: S, award: AwardConfig) -> Self {
        Self { store, award }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Try to award first blood for `challenge` to `claimant`.
    ///
    /// Returns [`ArbitrationOutcome::Awarded`] with the new record if this
    /// call created it, [`ArbitrationOutcome::AlreadyAwarded`] otherwise.
    /// Which of several truly concurrent callers wins is decided by the
    /// store, not by arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::InvalidInput`] for blank identifiers and
    /// [`ArbitrationError::StoreUnavailable`] if the write could not be
    /// attempted. Retrying after either is always safe.
    pub async fn arbitrate(
        &self,
        challenge: &ChallengeRef,
        claimant: &ClaimantId,
    ) -> Result<ArbitrationOutcome, ArbitrationError> {
        validate(challenge, claimant)?;

        let award = self.build_award(challenge, claimant);

        match self.store.insert_if_absent(&award).await {
            Ok(InsertOutcome::Inserted(record)) => {
                info!(
                    challenge = %challenge,
                    claimant = %claimant,
                    award_id = %record.id,
                    "First blood awarded"
                );
                Ok(ArbitrationOutcome::Awarded(record))
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                debug!(
                    challenge = %challenge,
                    claimant = %claimant,
                    "First blood already awarded"
                );
                Ok(ArbitrationOutcome::AlreadyAwarded)
            }
            Err(e) => {
                warn!(
                    challenge = %challenge,
                    claimant = %claimant,
                    error = %e,
                    "First blood arbitration failed"
                );
                Err(e.into())
            }
        }
    }

    /// The current first blood holder for `challenge`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ArbitrationError::InvalidInput`] for a blank challenge and
    /// [`ArbitrationError::StoreUnavailable`] if the store cannot be read.
    pub async fn holder(
        &self,
        challenge: &ChallengeRef,
    ) -> Result<Option<AwardRecord>, ArbitrationError> {
        validate_challenge(challenge)?;
        let key = AwardKey::for_challenge(challenge);
        Ok(self.store.find_award(&key).await?)
    }

    fn build_award(&self, challenge: &ChallengeRef, claimant: &ClaimantId) -> NewAward {
        let key = AwardKey::for_challenge(challenge);
        NewAward {
            id: AwardId::new(),
            claimant_id: claimant.clone(),
            name: key.name,
            description: self.award.description.clone(),
            value: self.award.value,
            category: key.category,
            icon: self.award.icon.clone(),
        }
    }
}

/// Reject blank identifiers before any store call.
pub(crate) fn validate(
    challenge: &ChallengeRef,
    claimant: &ClaimantId,
) -> Result<(), ArbitrationError> {
    validate_challenge(challenge)?;
    if claimant.is_blank() {
        return Err(ArbitrationError::InvalidInput {
            field: "claimant_id",
        });
    }
    Ok(())
}

fn validate_challenge(challenge: &ChallengeRef) -> Result<(), ArbitrationError> {
    if challenge.category.trim().is_empty() {
        return Err(ArbitrationError::InvalidInput {
            field: "challenge.category",
        });
    }
    if challenge.name.trim().is_empty() {
        return Err(ArbitrationError::InvalidInput {
            field: "challenge.name",
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Arc;

    use firstblood_types::FIRST_BLOOD_CATEGORY;

    use super::*;
    use crate::memory::InMemoryAwardStore;

    fn arbitrator() -> Arbitrator<InMemoryAwardStore> {
        Arbitrator::new(InMemoryAwardStore::new(), AwardConfig::default())
    }

    #[tokio::test]
    async fn first_claimant_wins_second_loses() {
        let arb = arbitrator();
        let challenge = ChallengeRef::new("pwn", "baby-rop");

        let a = arb.arbitrate(&challenge, &ClaimantId::new("A")).await.unwrap();
        let ArbitrationOutcome::Awarded(record) = a else {
            panic!("A should win, got {a:?}");
        };
        assert_eq!(record.claimant_id, ClaimantId::new("A"));
        assert_eq!(record.name, "First Blood for pwn/baby-rop");
        assert_eq!(record.category, FIRST_BLOOD_CATEGORY);
        assert_eq!(record.value, 1);

        let b = arb.arbitrate(&challenge, &ClaimantId::new("B")).await.unwrap();
        assert_eq!(b, ArbitrationOutcome::AlreadyAwarded);

        assert_eq!(arb.store().awards().len(), 1);
    }

    #[tokio::test]
    async fn same_claimant_twice_is_idempotent() {
        let arb = arbitrator();
        let challenge = ChallengeRef::new("web", "sqli");
        let claimant = ClaimantId::new("A");

        let first = arb.arbitrate(&challenge, &claimant).await.unwrap();
        let second = arb.arbitrate(&challenge, &claimant).await.unwrap();

        assert!(first.is_awarded());
        assert_eq!(second, ArbitrationOutcome::AlreadyAwarded);
        assert_eq!(arb.store().awards().len(), 1);
    }

    #[tokio::test]
    async fn distinct_challenges_do_not_interfere() {
        let arb = arbitrator();

        let a = arb
            .arbitrate(&ChallengeRef::new("pwn", "baby-rop"), &ClaimantId::new("A"))
            .await
            .unwrap();
        let b = arb
            .arbitrate(&ChallengeRef::new("pwn", "heap-2"), &ClaimantId::new("B"))
            .await
            .unwrap();

        assert!(a.is_awarded());
        assert!(b.is_awarded());
        assert_eq!(arb.store().awards().len(), 2);
    }

    #[tokio::test]
    async fn config_values_are_copied_onto_the_record() {
        let award = AwardConfig {
            description: "first!".to_owned(),
            value: 25,
            icon: None,
        };
        let arb = Arbitrator::new(InMemoryAwardStore::new(), award);

        let outcome = arb
            .arbitrate(&ChallengeRef::new("misc", "sanity"), &ClaimantId::new("A"))
            .await
            .unwrap();
        let ArbitrationOutcome::Awarded(record) = outcome else {
            panic!("expected an award");
        };
        assert_eq!(record.description, "first!");
        assert_eq!(record.value, 25);
        assert_eq!(record.icon, None);
    }

    #[tokio::test]
    async fn blank_inputs_never_reach_the_store() {
        let arb = arbitrator();

        let cases = [
            (ChallengeRef::new("", "x"), ClaimantId::new("A"), "challenge.category"),
            (ChallengeRef::new("pwn", "  "), ClaimantId::new("A"), "challenge.name"),
            (ChallengeRef::new("pwn", "x"), ClaimantId::new(""), "claimant_id"),
        ];
        for (challenge, claimant, field) in cases {
            let result = arb.arbitrate(&challenge, &claimant).await;
            assert_eq!(result, Err(ArbitrationError::InvalidInput { field }));
        }

        assert_eq!(arb.store().insert_attempts(), 0);
        assert!(arb.store().awards().is_empty());
    }

    #[tokio::test]
    async fn outage_is_reported_and_recoverable() {
        let arb = arbitrator();
        let challenge = ChallengeRef::new("crypto", "xor");

        arb.store().set_available(false);
        let failed = arb.arbitrate(&challenge, &ClaimantId::new("A")).await;
        assert!(matches!(failed, Err(ArbitrationError::StoreUnavailable(_))));
        assert!(arb.store().awards().is_empty());

        arb.store().set_available(true);
        let retried = arb.arbitrate(&challenge, &ClaimantId::new("A")).await.unwrap();
        assert!(retried.is_awarded());
        assert_eq!(arb.store().awards().len(), 1);
    }

    #[tokio::test]
    async fn holder_reports_the_winner() {
        let arb = arbitrator();
        let challenge = ChallengeRef::new("forensics", "pcap");

        assert_eq!(arb.holder(&challenge).await.unwrap(), None);

        let _ = arb.arbitrate(&challenge, &ClaimantId::new("A")).await.unwrap();
        let _ = arb.arbitrate(&challenge, &ClaimantId::new("B")).await.unwrap();

        let holder = arb.holder(&challenge).await.unwrap().unwrap();
        assert_eq!(holder.claimant_id, ClaimantId::new("A"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_claimants_yield_exactly_one_winner() {
        const CLAIMANTS: usize = 64;

        let arb = Arc::new(arbitrator());
        let challenge = ChallengeRef::new("pwn", "race-me");

        let mut handles = Vec::with_capacity(CLAIMANTS);
        for i in 0..CLAIMANTS {
            let arb = Arc::clone(&arb);
            let challenge = challenge.clone();
            handles.push(tokio::spawn(async move {
                arb.arbitrate(&challenge, &ClaimantId::new(format!("team-{i}")))
                    .await
            }));
        }

        let mut awarded = 0_usize;
        let mut already = 0_usize;
        for handle in handles {
            match handle.await.expect("task panicked").expect("arbitration failed") {
                ArbitrationOutcome::Awarded(_) => awarded += 1,
                ArbitrationOutcome::AlreadyAwarded => already += 1,
            }
        }

        assert_eq!(awarded, 1);
        assert_eq!(already, CLAIMANTS - 1);
        assert_eq!(arb.store().awards().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_races_on_many_challenges() {
        let arb = Arc::new(arbitrator());

        let mut handles = Vec::new();
        for c in 0..10 {
            for t in 0..8 {
                let arb = Arc::clone(&arb);
                handles.push(tokio::spawn(async move {
                    let challenge = ChallengeRef::new("misc", format!("chal-{c}"));
                    arb.arbitrate(&challenge, &ClaimantId::new(format!("team-{t}")))
                        .await
                }));
            }
        }

        let mut awarded = 0_usize;
        for handle in handles {
            if handle.await.expect("task panicked").expect("arbitration failed").is_awarded() {
                awarded += 1;
            }
        }

        assert_eq!(awarded, 10);
        assert_eq!(arb.store().awards().len(), 10);
    }
}
