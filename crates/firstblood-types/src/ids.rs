//! Identifier types.
//!
//! Award records get a UUID v7 (time-ordered) id generated app-side so the
//! conditional insert can return the full row without a second round-trip.
//! Claimants are foreign references owned by the host application, so their
//! ids stay opaque strings.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for a persisted award record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AwardId(pub Uuid);

impl AwardId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AwardId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AwardId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AwardId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<AwardId> for Uuid {
    fn from(id: AwardId) -> Self {
        id.0
    }
}

/// Opaque identifier of the party (team or user) claiming an award.
///
/// Never validated against the host's user table; the arbitrator only
/// rejects blank values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct ClaimantId(pub String);

impl ClaimantId {
    /// Wrap a host-supplied claimant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for ClaimantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClaimantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ClaimantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_ids_are_unique() {
        let a = AwardId::new();
        let b = AwardId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn award_id_display_matches_uuid() {
        let id = AwardId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn claimant_id_serializes_as_plain_string() {
        let id = ClaimantId::new("team-42");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"team-42\""));
    }

    #[test]
    fn blank_claimant_ids() {
        assert!(ClaimantId::new("").is_blank());
        assert!(ClaimantId::new("  \t").is_blank());
        assert!(!ClaimantId::new("7").is_blank());
    }
}
