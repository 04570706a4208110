//! Shared type definitions for first blood arbitration.
//!
//! Everything that crosses a crate or process boundary lives here: the
//! challenge and claimant references carried by completion notifications,
//! the award record persisted by the store, and the arbitration outcome.
//! Types flow to `TypeScript` via `ts-rs` for scoreboard front-ends.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers (UUID-backed award ids, opaque claimant ids)
//! - [`award`] -- Challenge references, award keys, and award records
//! - [`notification`] -- Completion notifications delivered by the host

pub mod award;
pub mod ids;
pub mod notification;

// Re-export all public types at crate root for convenience.
pub use award::{
    award_name, ArbitrationOutcome, AwardKey, AwardRecord, ChallengeRef, NewAward,
    FIRST_BLOOD_CATEGORY,
};
pub use ids::{AwardId, ClaimantId};
pub use notification::CompletionNotification;
