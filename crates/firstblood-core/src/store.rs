//! The award store contract.
//!
//! The arbitrator owns no lock; correctness rests entirely on the store
//! honouring [`AwardStore::insert_if_absent`]:
//!
//! - The non-existence check and the insert are one indivisible operation
//!   for every other caller of the same operation.
//! - The write commits before the call returns, on a connection and
//!   transaction of the store's own. No caller transaction can be passed in,
//!   so an ambient per-request transaction never delays its visibility.
//! - A uniqueness constraint on (`category`, `name`) backs the check, and a
//!   violation of it is reported as [`InsertOutcome::AlreadyPresent`].

use std::future::Future;

use firstblood_types::{AwardKey, AwardRecord, NewAward};

/// Errors a store may report. Losing the race is not one of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The write could not be attempted or the store is unreachable.
    #[error("award store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No award with the key existed; this record was written and committed.
    Inserted(AwardRecord),
    /// An award with the key already existed. Nothing was written.
    AlreadyPresent,
}

impl InsertOutcome {
    /// Rows affected by the insert (0 or 1).
    pub const fn rows_affected(&self) -> u64 {
        match self {
            Self::Inserted(_) => 1,
            Self::AlreadyPresent => 0,
        }
    }
}

/// A persistent table of award records.
pub trait AwardStore: Send + Sync {
    /// Insert `award` only if no record with the same (`category`, `name`)
    /// exists, atomically, committing before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the write could not be
    /// attempted. No partial record may remain after an error.
    fn insert_if_absent(
        &self,
        award: &NewAward,
    ) -> impl Future<Output = Result<InsertOutcome, StoreError>> + Send;

    /// Look up the award holding `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be read.
    fn find_award(
        &self,
        key: &AwardKey,
    ) -> impl Future<Output = Result<Option<AwardRecord>, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_affected_matches_outcome() {
        assert_eq!(InsertOutcome::AlreadyPresent.rows_affected(), 0);
    }

    #[test]
    fn unavailable_message_is_kept() {
        let err = StoreError::unavailable("connection refused");
        assert_eq!(err.to_string(), "award store unavailable: connection refused");
    }
}
