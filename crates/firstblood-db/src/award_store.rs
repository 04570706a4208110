//! Award persistence on the `awards` table.
//!
//! [`PgAwardStore::insert_if_absent`] is the conditional write the
//! arbitrator relies on. It is one statement:
//!
//! ```sql
//! INSERT INTO awards (...)
//! SELECT $1, ..., $7
//! WHERE NOT EXISTS (SELECT 1 FROM awards WHERE category = $6 AND name = $3)
//! ON CONFLICT (category, name) DO NOTHING
//! RETURNING ...
//! ```
//!
//! At `READ COMMITTED` two concurrent statements can both see the
//! `NOT EXISTS` predicate as true. The unique constraint on
//! (`category`, `name`) then makes the second one wait on the first's index
//! entry and resolve to `DO NOTHING`, so exactly one row is returned across
//! all callers. The statement runs in a transaction of its own, begun on a
//! pooled connection and committed before returning; callers cannot hand
//! in their own transaction.

use chrono::{DateTime, Utc};
use firstblood_core::{AwardStore, InsertOutcome, StoreError};
use firstblood_types::{
    AwardId, AwardKey, AwardRecord, ClaimantId, NewAward, FIRST_BLOOD_CATEGORY,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{is_unique_violation, DbError};

/// Operations on the `awards` table.
#[derive(Clone)]
pub struct PgAwardStore {
    pool: PgPool,
}

impl PgAwardStore {
    /// Create a store drawing connections from `pool`.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert `award` unless its (`category`, `name`) already exists.
    ///
    /// Returns the inserted row, or `None` if an award with the key was
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a connection cannot be acquired or
    /// the statement fails for a reason other than the uniqueness predicate.
    pub async fn conditional_insert(&self, award: &NewAward) -> Result<Option<AwardRecord>, DbError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AwardRow>(
            r"INSERT INTO awards (id, claimant_id, name, description, value, category, icon)
              SELECT $1::UUID, $2::TEXT, $3::TEXT, $4::TEXT, $5::INTEGER, $6::TEXT, $7::TEXT
              WHERE NOT EXISTS (
                  SELECT 1 FROM awards WHERE category = $6::TEXT AND name = $3::TEXT
              )
              ON CONFLICT (category, name) DO NOTHING
              RETURNING id, claimant_id, name, description, value, category, icon, created_at",
        )
        .bind(award.id.into_inner())
        .bind(award.claimant_id.as_str())
        .bind(&award.name)
        .bind(&award.description)
        .bind(award.value)
        .bind(&award.category)
        .bind(award.icon.as_deref())
        .fetch_optional(&mut *tx)
        .await;

        let row = match row {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        tracing::debug!(
            award_name = award.name,
            inserted = row.is_some(),
            "Conditional award insert committed"
        );

        Ok(row.map(AwardRow::into_record))
    }

    /// Insert `award` with a plain `INSERT`.
    ///
    /// Only safe under an exclusive per-key lock; the unique constraint
    /// still rejects a duplicate, which is reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails for any other reason.
    pub async fn insert_award(&self, award: &NewAward) -> Result<Option<AwardRecord>, DbError> {
        let result = sqlx::query_as::<_, AwardRow>(
            r"INSERT INTO awards (id, claimant_id, name, description, value, category, icon)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              RETURNING id, claimant_id, name, description, value, category, icon, created_at",
        )
        .bind(award.id.into_inner())
        .bind(award.claimant_id.as_str())
        .bind(&award.name)
        .bind(&award.description)
        .bind(award.value)
        .bind(&award.category)
        .bind(award.icon.as_deref())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(Some(row.into_record())),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up the award holding `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, DbError> {
        let row = sqlx::query_as::<_, AwardRow>(
            r"SELECT id, claimant_id, name, description, value, category, icon, created_at
              FROM awards
              WHERE category = $1 AND name = $2",
        )
        .bind(&key.category)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AwardRow::into_record))
    }

    /// Count the awards holding `key`. Never more than one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_awards(&self, key: &AwardKey) -> Result<i64, DbError> {
        let row: (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM awards WHERE category = $1 AND name = $2",
        )
        .bind(&key.category)
        .bind(&key.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// All first blood awards won by `claimant`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn awards_for_claimant(
        &self,
        claimant: &ClaimantId,
    ) -> Result<Vec<AwardRecord>, DbError> {
        let rows = sqlx::query_as::<_, AwardRow>(
            r"SELECT id, claimant_id, name, description, value, category, icon, created_at
              FROM awards
              WHERE claimant_id = $1 AND category = $2
              ORDER BY created_at",
        )
        .bind(claimant.as_str())
        .bind(FIRST_BLOOD_CATEGORY)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AwardRow::into_record).collect())
    }
}

impl AwardStore for PgAwardStore {
    async fn insert_if_absent(&self, award: &NewAward) -> Result<InsertOutcome, StoreError> {
        let inserted = self.conditional_insert(award).await?;
        Ok(inserted.map_or(InsertOutcome::AlreadyPresent, InsertOutcome::Inserted))
    }

    async fn find_award(&self, key: &AwardKey) -> Result<Option<AwardRecord>, StoreError> {
        Ok(self.get_award(key).await?)
    }
}

/// A row from the `awards` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AwardRow {
    /// Award UUID.
    pub id: Uuid,
    /// Claimant id.
    pub claimant_id: String,
    /// Award name.
    pub name: String,
    /// Award description.
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

impl AwardRow {
    /// Convert into the shared record type.
    pub fn into_record(self) -> AwardRecord {
        AwardRecord {
            id: AwardId::from(self.id),
            claimant_id: ClaimantId::from(self.claimant_id),
            name: self.name,
            description: self.description,
            value: self.value,
            category: self.category,
            icon: self.icon,
            created_at: self.created_at,
        }
    }
}
