//! Occurrence cache persistence.
//!
//! The [`OccurrenceStore`] trait is the seam to whatever table backs the
//! cache; [`MemoryOccurrenceStore`] is the in-memory implementation used
//! in tests.
//!
//! The store is the keeper of two invariants the cache relies on:
//!
//! - `max_number` is a **high-water mark** maintained independently of row
//!   deletion, so occurrence numbers freed by deleting `pending` rows are
//!   never handed out again
//! - `delete_pending` touches only `pending` rows; terminal rows are
//!   history

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use promo_core::{CampaignId, OccurrenceId};

use super::{Occurrence, OccurrenceStatus};
use crate::error::{Error, Result};

/// Insert payload for one occurrence row.
#[derive(Debug, Clone, Copy)]
pub struct NewOccurrence {
    /// The recurring parent campaign.
    pub parent_id: CampaignId,
    /// Monotonic per-parent sequence number.
    pub number: u32,
    /// Occurrence window start (UTC).
    pub starts_at: DateTime<Utc>,
    /// Occurrence window end (UTC).
    pub ends_at: DateTime<Utc>,
}

/// Persistence seam for the occurrence cache.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Deletes the parent's `pending` rows, returning how many were
    /// removed. Terminal rows are never touched.
    async fn delete_pending(&self, parent_id: CampaignId) -> Result<usize>;

    /// Inserts a batch of `pending` rows, returning how many were
    /// inserted. Advances the parent's number high-water mark.
    async fn insert_batch(&self, rows: Vec<NewOccurrence>) -> Result<usize>;

    /// Returns the parent's occurrence-number high-water mark (0 when no
    /// occurrence was ever inserted). Never decreases, even when rows are
    /// deleted.
    async fn max_number(&self, parent_id: CampaignId) -> Result<u32>;

    /// Returns how many terminal (`active` or `failed`) rows the parent
    /// has.
    async fn count_history(&self, parent_id: CampaignId) -> Result<u32>;

    /// Returns `pending` rows starting at or before `before`, ordered by
    /// start time.
    async fn list_due(&self, before: DateTime<Utc>) -> Result<Vec<Occurrence>>;

    /// Returns all rows for a parent, ordered by occurrence number.
    async fn list_for_parent(&self, parent_id: CampaignId) -> Result<Vec<Occurrence>>;

    /// Marks a `pending` row materialized into the given instance.
    async fn mark_materialized(
        &self,
        occurrence_id: OccurrenceId,
        instance_id: CampaignId,
    ) -> Result<()>;

    /// Marks a `pending` row failed with the materializer's error.
    async fn mark_failed(&self, occurrence_id: OccurrenceId, error: String) -> Result<()>;
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("occurrence store lock poisoned")
}

/// In-memory occurrence store for testing.
#[derive(Debug, Default)]
pub struct MemoryOccurrenceStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<OccurrenceId, Occurrence>,
    high_water: HashMap<CampaignId, u32>,
    next_id: u64,
}

impl MemoryOccurrenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OccurrenceStore for MemoryOccurrenceStore {
    async fn delete_pending(&self, parent_id: CampaignId) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let before = inner.rows.len();
        inner
            .rows
            .retain(|_, row| !(row.parent_id == parent_id && row.status == OccurrenceStatus::Pending));
        Ok(before - inner.rows.len())
    }

    async fn insert_batch(&self, rows: Vec<NewOccurrence>) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let count = rows.len();
        for row in rows {
            inner.next_id += 1;
            let id = OccurrenceId::new(inner.next_id);
            let mark = inner.high_water.entry(row.parent_id).or_insert(0);
            *mark = (*mark).max(row.number);
            inner.rows.insert(
                id,
                Occurrence {
                    id,
                    parent_id: row.parent_id,
                    number: row.number,
                    starts_at: row.starts_at,
                    ends_at: row.ends_at,
                    status: OccurrenceStatus::Pending,
                    instance_id: None,
                    error: None,
                },
            );
        }
        Ok(count)
    }

    async fn max_number(&self, parent_id: CampaignId) -> Result<u32> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.high_water.get(&parent_id).copied().unwrap_or(0))
    }

    async fn count_history(&self, parent_id: CampaignId) -> Result<u32> {
        let inner = self.inner.read().map_err(poison_err)?;
        let count = inner
            .rows
            .values()
            .filter(|row| row.parent_id == parent_id && row.status != OccurrenceStatus::Pending)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn list_due(&self, before: DateTime<Utc>) -> Result<Vec<Occurrence>> {
        let inner = self.inner.read().map_err(poison_err)?;
        let mut due: Vec<Occurrence> = inner
            .rows
            .values()
            .filter(|row| row.status == OccurrenceStatus::Pending && row.starts_at <= before)
            .cloned()
            .collect();
        due.sort_by_key(|row| row.starts_at);
        Ok(due)
    }

    async fn list_for_parent(&self, parent_id: CampaignId) -> Result<Vec<Occurrence>> {
        let inner = self.inner.read().map_err(poison_err)?;
        let mut rows: Vec<Occurrence> = inner
            .rows
            .values()
            .filter(|row| row.parent_id == parent_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.number);
        Ok(rows)
    }

    async fn mark_materialized(
        &self,
        occurrence_id: OccurrenceId,
        instance_id: CampaignId,
    ) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let Some(row) = inner.rows.get_mut(&occurrence_id) else {
            return Err(Error::OccurrenceNotFound { occurrence_id });
        };
        row.status = OccurrenceStatus::Active;
        row.instance_id = Some(instance_id);
        Ok(())
    }

    async fn mark_failed(&self, occurrence_id: OccurrenceId, error: String) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let Some(row) = inner.rows.get_mut(&occurrence_id) else {
            return Err(Error::OccurrenceNotFound { occurrence_id });
        };
        row.status = OccurrenceStatus::Failed;
        row.error = Some(error);
        Ok(())
    }
}
