//! NATS integration for completion intake and award announcements.
//!
//! The host publishes a [`CompletionNotification`] on the completion subject
//! (default `ctf.challenge.solved`), optionally as a request. The listener
//! replies with a [`CompletionAck`] straight away, before arbitration
//! finishes, and announces each new award on
//! `{award_subject_prefix}.{category}.{name}`.

use firstblood_core::{ArbitrationError, OutcomeSink};
use firstblood_types::{ArbitrationOutcome, AwardRecord, ChallengeRef, CompletionNotification};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ListenerError;

/// Reply sent to the host for every completion request, parsable or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionAck {
    /// The completion was received. Always `true`.
    pub acknowledged: bool,
    /// Whether first blood arbitration was started for it.
    pub arbitrating: bool,
}

impl CompletionAck {
    /// Ack for a completion; `arbitrating` is whether a task was spawned.
    pub const fn received(arbitrating: bool) -> Self {
        Self {
            acknowledged: true,
            arbitrating,
        }
    }

    /// Ack for a payload that could not be parsed. The host's completion
    /// stands; only first blood is skipped.
    pub const fn malformed() -> Self {
        Self::received(false)
    }
}

/// NATS client wrapper for the listener.
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, ListenerError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ListenerError::Nats {
                message: format!("failed to connect to {url}: {e}"),
            })?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Subscribe to completion notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Nats`] if the subscription fails.
    pub async fn subscribe_completions(
        &self,
        subject: &str,
    ) -> Result<async_nats::Subscriber, ListenerError> {
        let subscriber = self
            .client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| ListenerError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        info!(subject = subject, "subscribed to completion notifications");
        Ok(subscriber)
    }

    /// Reply to a completion request.
    ///
    /// Only queues the reply on the connection; failures are logged and the
    /// host's own completion flow does not depend on the reply arriving.
    pub async fn acknowledge(&self, reply: async_nats::Subject, ack: CompletionAck) {
        let payload = match serde_json::to_vec(&ack) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize completion ack");
                return;
            }
        };
        if let Err(e) = self.client.publish(reply.clone(), payload.into()).await {
            warn!(subject = %reply, error = %e, "failed to send completion ack");
        }
    }

    /// Build an [`AwardPublisher`] sharing this connection.
    pub fn award_publisher(&self, subject_prefix: &str) -> AwardPublisher {
        AwardPublisher {
            client: self.client.clone(),
            subject_prefix: subject_prefix.to_owned(),
        }
    }

    /// Flush pending publishes.
    pub async fn flush(&self) {
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "failed to flush NATS connection");
        }
    }
}

/// Publishes every new award to NATS.
pub struct AwardPublisher {
    client: async_nats::Client,
    subject_prefix: String,
}

impl AwardPublisher {
    /// Subject a record for `challenge` is announced on.
    pub fn subject_for(&self, challenge: &ChallengeRef) -> String {
        award_subject(&self.subject_prefix, challenge)
    }

    async fn publish(&self, subject: String, record: &AwardRecord) {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(award_id = %record.id, error = %e, "failed to serialize award");
                return;
            }
        };
        if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
            warn!(subject = subject, error = %e, "failed to publish award");
        }
    }
}

impl OutcomeSink for AwardPublisher {
    async fn on_outcome(
        &self,
        notification: &CompletionNotification,
        result: &Result<ArbitrationOutcome, ArbitrationError>,
    ) {
        if let Ok(ArbitrationOutcome::Awarded(record)) = result {
            let subject = self.subject_for(&notification.challenge);
            debug!(subject = subject, award_id = %record.id, "announcing award");
            self.publish(subject, record).await;
        }
    }
}

/// `{prefix}.{category}.{name}` with each challenge part made token-safe.
pub fn award_subject(prefix: &str, challenge: &ChallengeRef) -> String {
    format!(
        "{prefix}.{}.{}",
        subject_token(&challenge.category),
        subject_token(&challenge.name)
    )
}

/// Replace characters NATS treats as separators or wildcards.
fn subject_token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_subject_uses_category_and_name() {
        let subject = award_subject("firstblood.awarded", &ChallengeRef::new("pwn", "baby-rop"));
        assert_eq!(subject, "firstblood.awarded.pwn.baby-rop");
    }

    #[test]
    fn award_subject_escapes_separators_and_wildcards() {
        let subject = award_subject(
            "firstblood.awarded",
            &ChallengeRef::new("web 2.0", "a*b>c"),
        );
        assert_eq!(subject, "firstblood.awarded.web_2_0.a_b_c");
    }

    #[test]
    fn ack_serializes_flags() {
        let json = serde_json::to_value(CompletionAck::received(true)).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({ "acknowledged": true, "arbitrating": true }))
        );
    }

    #[test]
    fn malformed_payload_is_still_acknowledged() {
        let ack = CompletionAck::malformed();
        assert!(ack.acknowledged);
        assert!(!ack.arbitrating);
    }
}
