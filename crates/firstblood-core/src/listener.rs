//! Completion listener.
//!
//! The host confirms a solve and publishes a [`CompletionNotification`].
//! [`CompletionListener::on_completion`] filters it by challenge type and
//! rejects blank identifiers, then runs arbitration on a spawned task and
//! returns at once, so a slow or failing store never delays the host's
//! acknowledgment of the solve. Outcomes go to an [`OutcomeSink`] chosen once
//! at startup, on the same task, so awaiting the returned handle also awaits
//! the sink.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use firstblood_types::{ArbitrationOutcome, CompletionNotification};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::arbitrator::{self, ArbitrationError, Arbitrator};
use crate::store::AwardStore;

/// Receiver of arbitration results.
///
/// Awaited on the arbitration task after every attempt, winning or not.
/// Implementations must not block the thread; publish or log and return.
pub trait OutcomeSink: Send + Sync + 'static {
    /// Handle the result of arbitrating `notification`.
    fn on_outcome(
        &self,
        notification: &CompletionNotification,
        result: &Result<ArbitrationOutcome, ArbitrationError>,
    ) -> impl Future<Output = ()> + Send;
}

/// Routes completion notifications into the arbitrator.
pub struct CompletionListener<S, O> {
    arbitrator: Arc<Arbitrator<S>>,
    challenge_types: BTreeSet<String>,
    sink: Arc<O>,
}

impl<S, O> CompletionListener<S, O>
where
    S: AwardStore + 'static,
    O: OutcomeSink,
{
    /// Create a listener that arbitrates completions of the given challenge
    /// types and reports to `sink`.
    pub fn new<I>(arbitrator: Arc<Arbitrator<S>>, challenge_types: I, sink: Arc<O>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            arbitrator,
            challenge_types: challenge_types.into_iter().map(Into::into).collect(),
            sink,
        }
    }

    /// The shared arbitrator.
    pub const fn arbitrator(&self) -> &Arc<Arbitrator<S>> {
        &self.arbitrator
    }

    /// Whether completions of this notification's challenge type are tracked.
    pub fn is_tracked(&self, notification: &CompletionNotification) -> bool {
        self.challenge_types.contains(&notification.challenge_type)
    }

    /// Handle one confirmed completion.
    ///
    /// Returns `None` if the challenge type is not tracked or an identifier
    /// is blank; nothing is spawned and the sink is not called. Otherwise
    /// spawns the arbitration on the current tokio runtime and returns its
    /// handle without waiting for it. Store failures are logged and handed
    /// to the sink, never retried here.
    pub fn on_completion(&self, notification: CompletionNotification) -> Option<JoinHandle<()>> {
        if !self.is_tracked(&notification) {
            debug!(
                challenge = %notification.challenge,
                challenge_type = notification.challenge_type,
                "Ignoring completion of untracked challenge type"
            );
            return None;
        }

        if let Err(e) = arbitrator::validate(&notification.challenge, &notification.claimant_id) {
            warn!(
                challenge = %notification.challenge,
                claimant = %notification.claimant_id,
                error = %e,
                "Ignoring completion with blank identifiers"
            );
            return None;
        }

        let arbitrator = Arc::clone(&self.arbitrator);
        let sink = Arc::clone(&self.sink);

        Some(tokio::spawn(async move {
            let result = arbitrator
                .arbitrate(&notification.challenge, &notification.claimant_id)
                .await;

            if let Err(e) = &result {
                warn!(
                    challenge = %notification.challenge,
                    claimant = %notification.claimant_id,
                    solved_at = %notification.solved_at,
                    error = %e,
                    "Completion acknowledged without first blood arbitration"
                );
            }

            sink.on_outcome(&notification, &result).await;
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::future;
    use std::sync::Mutex;

    use chrono::Utc;
    use firstblood_types::{AwardKey, AwardRecord, ChallengeRef, ClaimantId, NewAward};
    use tokio::sync::Notify;

    use super::*;
    use crate::config::AwardConfig;
    use crate::memory::InMemoryAwardStore;
    use crate::store::{InsertOutcome, StoreError};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ClaimantId, Result<ArbitrationOutcome, ArbitrationError>)>>,
    }

    impl OutcomeSink for Recorder {
        fn on_outcome(
            &self,
            notification: &CompletionNotification,
            result: &Result<ArbitrationOutcome, ArbitrationError>,
        ) -> impl Future<Output = ()> + Send {
            self.seen
                .lock()
                .unwrap()
                .push((notification.claimant_id.clone(), result.clone()));
            future::ready(())
        }
    }

    /// Holds every insert until the gate is opened.
    struct GatedStore {
        inner: InMemoryAwardStore,
        gate: Arc<Notify>,
    }

    impl AwardStore for GatedStore {
        async fn insert_if_absent(&self, award: &NewAward) -> Result<InsertOutcome, StoreError> {
            self.gate.notified().await;
            self.inner.insert_if_absent(award).await
        }

        async fn find_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, StoreError> {
            self.inner.find_award(key).await
        }
    }

    fn notification(claimant: &str, challenge_type: &str) -> CompletionNotification {
        CompletionNotification {
            challenge: ChallengeRef::new("pwn", "baby-rop"),
            claimant_id: ClaimantId::new(claimant),
            challenge_type: challenge_type.to_owned(),
            solved_at: Utc::now(),
        }
    }

    fn listener<S: AwardStore + 'static>(
        store: S,
    ) -> (CompletionListener<S, Recorder>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let arbitrator = Arc::new(Arbitrator::new(store, AwardConfig::default()));
        let listener =
            CompletionListener::new(arbitrator, ["standard", "dynamic"], Arc::clone(&recorder));
        (listener, recorder)
    }

    #[tokio::test]
    async fn untracked_types_are_ignored() {
        let (listener, recorder) = listener(InMemoryAwardStore::new());

        let handle = listener.on_completion(notification("A", "manual"));
        assert!(handle.is_none());
        assert_eq!(listener.arbitrator().store().insert_attempts(), 0);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tracked_completions_are_arbitrated() {
        let (listener, recorder) = listener(InMemoryAwardStore::new());

        listener
            .on_completion(notification("A", "standard"))
            .expect("standard is tracked")
            .await
            .unwrap();
        listener
            .on_completion(notification("B", "dynamic"))
            .expect("dynamic is tracked")
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], (_, Ok(ArbitrationOutcome::Awarded(_)))));
        assert_eq!(seen[1], (ClaimantId::new("B"), Ok(ArbitrationOutcome::AlreadyAwarded)));
    }

    #[tokio::test]
    async fn blank_identifiers_are_rejected_before_spawning() {
        let (listener, recorder) = listener(InMemoryAwardStore::new());

        let mut blank_name = notification("A", "standard");
        blank_name.challenge = ChallengeRef::new("pwn", "  ");

        assert!(listener.on_completion(notification(" ", "standard")).is_none());
        assert!(listener.on_completion(blank_name).is_none());
        assert_eq!(listener.arbitrator().store().insert_attempts(), 0);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_store_does_not_hold_up_on_completion() {
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: InMemoryAwardStore::new(),
            gate: Arc::clone(&gate),
        };
        let (listener, recorder) = listener(store);

        let handle = listener
            .on_completion(notification("A", "standard"))
            .expect("standard is tracked");

        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        assert!(recorder.seen.lock().unwrap().is_empty());

        gate.notify_one();
        handle.await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert!(matches!(
            seen.first(),
            Some((_, Ok(ArbitrationOutcome::Awarded(_))))
        ));
        assert_eq!(listener.arbitrator().store().inner.awards().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_reaches_the_sink_without_panicking() {
        let store = InMemoryAwardStore::new();
        store.set_available(false);
        let (listener, recorder) = listener(store);

        listener
            .on_completion(notification("A", "standard"))
            .expect("standard is tracked")
            .await
            .expect("failure must not panic the task");

        let seen = recorder.seen.lock().unwrap();
        assert!(matches!(
            seen.first(),
            Some((_, Err(ArbitrationError::StoreUnavailable(_))))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_of_completions_awards_once() {
        let (listener, recorder) = listener(InMemoryAwardStore::new());

        let handles: Vec<_> = (0..50)
            .filter_map(|i| listener.on_completion(notification(&format!("team-{i}"), "standard")))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let seen = recorder.seen.lock().unwrap();
        let awarded = seen.iter().filter(|(_, r)| matches!(r, Ok(o) if o.is_awarded())).count();
        assert_eq!(seen.len(), 50);
        assert_eq!(awarded, 1);
        assert_eq!(listener.arbitrator().store().awards().len(), 1);
    }
}
