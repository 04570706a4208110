//! Completion notifications delivered by the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::award::ChallengeRef;
use crate::ids::ClaimantId;

/// A confirmed challenge completion.
///
/// Published by the host on the completion subject once it has accepted a
/// solve. `challenge_type` is the host's challenge kind (`standard`,
/// `dynamic`, ...) and decides whether the completion is tracked at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompletionNotification {
    /// The completed challenge.
    pub challenge: ChallengeRef,
    /// Who completed it.
    pub claimant_id: ClaimantId,
    /// Host-side challenge kind.
    pub challenge_type: String,
    /// When the host confirmed the completion.
    pub solved_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_payload() {
        let payload = r#"{
            "challenge": { "category": "pwn", "name": "baby-rop" },
            "claimant_id": "team-7",
            "challenge_type": "standard",
            "solved_at": "2026-03-01T12:00:00Z"
        }"#;
        let parsed: Result<CompletionNotification, _> = serde_json::from_str(payload);
        let Ok(notification) = parsed else {
            panic!("payload should parse: {parsed:?}");
        };
        assert_eq!(notification.challenge, ChallengeRef::new("pwn", "baby-rop"));
        assert_eq!(notification.claimant_id.as_str(), "team-7");
        assert_eq!(notification.challenge_type, "standard");
    }
}
