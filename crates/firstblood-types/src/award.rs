//! Challenge references, award keys, and award records.
//!
//! A first blood award is deduplicated on the pair (`category`, `name`),
//! where `category` is always [`FIRST_BLOOD_CATEGORY`] and `name` is derived
//! from the challenge by [`award_name`]. The award store carries a unique
//! constraint on that pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{AwardId, ClaimantId};

/// Award category tag that marks a record as a first blood award.
pub const FIRST_BLOOD_CATEGORY: &str = "FirstBlood";

/// Reference to a completable challenge, identified by category and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChallengeRef {
    /// Challenge category (e.g. `pwn`, `web`).
    pub category: String,
    /// Challenge name, unique within its category.
    pub name: String,
}

impl ChallengeRef {
    /// Build a challenge reference.
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }
}

impl core::fmt::Display for ChallengeRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// Derive the award name for a challenge.
///
/// ```
/// use firstblood_types::{award_name, ChallengeRef};
///
/// let challenge = ChallengeRef::new("pwn", "baby-rop");
/// assert_eq!(award_name(&challenge), "First Blood for pwn/baby-rop");
/// ```
pub fn award_name(challenge: &ChallengeRef) -> String {
    format!("First Blood for {}/{}", challenge.category, challenge.name)
}

/// Deduplication key of an award: (`category`, `name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AwardKey {
    /// Award category, [`FIRST_BLOOD_CATEGORY`] for every key built here.
    pub category: String,
    /// Award name derived from the challenge.
    pub name: String,
}

impl AwardKey {
    /// The first blood key for a challenge.
    pub fn for_challenge(challenge: &ChallengeRef) -> Self {
        Self {
            category: FIRST_BLOOD_CATEGORY.to_owned(),
            name: award_name(challenge),
        }
    }
}

/// Column values for an award that has not been persisted yet.
///
/// `created_at` is absent because the store sets it at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAward {
    /// Id the record will carry if the insert wins.
    pub id: AwardId,
    /// Claimant receiving the award.
    pub claimant_id: ClaimantId,
    /// Award name, half of the deduplication key.
    pub name: String,
    /// Static description copied from configuration.
    pub description: String,
    /// Point value copied from configuration.
    pub value: i32,
    /// Award category, the other half of the deduplication key.
    pub category: String,
    /// Icon reference copied from configuration.
    pub icon: Option<String>,
}

impl NewAward {
    /// The deduplication key of this award.
    pub fn key(&self) -> AwardKey {
        AwardKey {
            category: self.category.clone(),
            name: self.name.clone(),
        }
    }

    /// Turn the pending award into a persisted record stamped at `created_at`.
    pub fn into_record(self, created_at: DateTime<Utc>) -> AwardRecord {
        AwardRecord {
            id: self.id,
            claimant_id: self.claimant_id,
            name: self.name,
            description: self.description,
            value: self.value,
            category: self.category,
            icon: self.icon,
            created_at,
        }
    }
}

/// A persisted award. Never updated, never deleted by the arbitrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AwardRecord {
    /// Record id.
    pub id: AwardId,
    /// Claimant that drew first blood.
    pub claimant_id: ClaimantId,
    /// Award name (`First Blood for {category}/{name}`).
    pub name: String,
    /// Static description.
    pub description: String,
    /// Point value.
    pub value: i32,
    /// Award category.
    pub category: String,
    /// Icon reference.
    pub icon: Option<String>,
    /// Store-side creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AwardRecord {
    /// The deduplication key of this record.
    pub fn key(&self) -> AwardKey {
        AwardKey {
            category: self.category.clone(),
            name: self.name.clone(),
        }
    }
}

/// Result of one arbitration attempt.
///
/// Losing the race is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ArbitrationOutcome {
    /// This attempt created the award.
    Awarded(AwardRecord),
    /// An award for the challenge already existed.
    AlreadyAwarded,
}

impl ArbitrationOutcome {
    /// Whether this attempt won.
    pub const fn is_awarded(&self) -> bool {
        matches!(self, Self::Awarded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(challenge: &ChallengeRef, claimant: &str) -> NewAward {
        let key = AwardKey::for_challenge(challenge);
        NewAward {
            id: AwardId::new(),
            claimant_id: ClaimantId::new(claimant),
            name: key.name,
            description: "first".to_owned(),
            value: 1,
            category: key.category,
            icon: None,
        }
    }

    #[test]
    fn award_name_includes_category_and_name() {
        let challenge = ChallengeRef::new("pwn", "baby-rop");
        assert_eq!(award_name(&challenge), "First Blood for pwn/baby-rop");
    }

    #[test]
    fn key_is_first_blood_category() {
        let key = AwardKey::for_challenge(&ChallengeRef::new("web", "sqli-1"));
        assert_eq!(key.category, FIRST_BLOOD_CATEGORY);
        assert_eq!(key.name, "First Blood for web/sqli-1");
    }

    #[test]
    fn distinct_challenges_have_distinct_keys() {
        let a = AwardKey::for_challenge(&ChallengeRef::new("pwn", "baby-rop"));
        let b = AwardKey::for_challenge(&ChallengeRef::new("pwn", "heap-1"));
        let c = AwardKey::for_challenge(&ChallengeRef::new("rev", "baby-rop"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn record_keeps_pending_values() {
        let challenge = ChallengeRef::new("pwn", "baby-rop");
        let award = pending(&challenge, "A");
        let key = award.key();
        let id = award.id;
        let record = award.into_record(Utc::now());
        assert_eq!(record.id, id);
        assert_eq!(record.key(), key);
        assert_eq!(record.claimant_id.as_str(), "A");
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ArbitrationOutcome::AlreadyAwarded).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({ "outcome": "already_awarded" }))
        );

        let record = pending(&ChallengeRef::new("pwn", "baby-rop"), "A").into_record(Utc::now());
        let awarded = ArbitrationOutcome::Awarded(record);
        assert!(awarded.is_awarded());
        let value = serde_json::to_value(&awarded).ok();
        let tag = value
            .as_ref()
            .and_then(|v| v.get("outcome"))
            .and_then(serde_json::Value::as_str);
        assert_eq!(tag, Some("awarded"));
    }
}
