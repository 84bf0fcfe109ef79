//! Recurring-campaign occurrence pre-computation.
//!
//! A recurring parent campaign does not run itself; an external
//! materializer turns each pre-computed occurrence into a real campaign
//! instance. This module owns the rolling occurrence cache feeding that
//! worker:
//!
//! - [`OccurrenceCache::regenerate`] recomputes the future `pending` rows
//!   from the recurrence pattern, bounded by a rolling horizon and a hard
//!   per-run cap
//! - [`OccurrenceCache::get_due_occurrences`] hands the materializer its
//!   work (at-least-once; consumers dedup by occurrence number)
//! - [`OccurrenceCache::mark_materialized`] / [`OccurrenceCache::mark_failed`]
//!   are the terminal transitions for a row
//!
//! ## Invariants
//!
//! Occurrence numbers are strictly increasing per parent and never reused:
//! the store keeps a high-water counter independent of row deletion.
//! Regeneration deletes only `pending` rows; already-materialized
//! (`active`) and `failed` rows are history and stay untouched.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use promo_core::{CampaignId, Clock, OccurrenceId};

use crate::campaign::{RecurrenceEnd, RecurrencePattern, RecurringConfig};
use crate::error::Result;

pub use store::{MemoryOccurrenceStore, NewOccurrence, OccurrenceStore};

/// Rolling cache horizon: how far ahead occurrences are pre-computed.
pub const CACHE_HORIZON_DAYS: i64 = 90;

/// Hard safety cap on rows produced by a single regeneration.
pub const MAX_OCCURRENCES_PER_RUN: usize = 100;

/// Lifecycle of one cached occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    /// Waiting for the materializer.
    Pending,
    /// Materialized into a real campaign instance.
    Active,
    /// Materialization threw; the error is recorded.
    Failed,
}

/// One future (or historical) recurrence of a recurring parent campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Store-assigned row identifier.
    pub id: OccurrenceId,
    /// The recurring parent campaign.
    pub parent_id: CampaignId,
    /// Monotonic per-parent sequence number; never reused.
    pub number: u32,
    /// Occurrence window start (UTC).
    pub starts_at: DateTime<Utc>,
    /// Occurrence window end (UTC).
    pub ends_at: DateTime<Utc>,
    /// Row lifecycle status.
    pub status: OccurrenceStatus,
    /// The campaign instance produced, once materialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<CampaignId>,
    /// The materialization error, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The parent campaign's window, as the recurrence arithmetic needs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentSchedule {
    /// Parent window start (UTC).
    pub starts_at: Option<DateTime<Utc>>,
    /// Parent window end (UTC); also the anchor occurrences advance from.
    pub ends_at: Option<DateTime<Utc>>,
    /// Explicit occurrence duration, when the window does not imply one.
    pub duration: Option<Duration>,
}

impl ParentSchedule {
    /// Derives the duration of each occurrence: the explicit duration, or
    /// the parent's own window length.
    #[must_use]
    pub fn occurrence_duration(&self) -> Option<Duration> {
        self.duration.or_else(|| {
            match (self.starts_at, self.ends_at) {
                (Some(start), Some(end)) if end > start => Some(end - start),
                _ => None,
            }
        })
    }

    /// The instant occurrence computation advances from: the parent's end
    /// date, or its start plus the occurrence duration.
    #[must_use]
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.ends_at.or_else(|| {
            match (self.starts_at, self.occurrence_duration()) {
                (Some(start), Some(duration)) => Some(start + duration),
                _ => None,
            }
        })
    }
}

/// Pre-computes future recurrence occurrences into the cache store.
pub struct OccurrenceCache {
    store: Arc<dyn OccurrenceStore>,
    clock: Arc<dyn Clock>,
}

impl OccurrenceCache {
    /// Creates a cache over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn OccurrenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Regenerates the pending occurrence rows for a recurring parent.
    ///
    /// Deletes the parent's `pending` rows (preserving `active`/`failed`
    /// history), then walks the recurrence pattern from the parent's end
    /// date until the rolling horizon ([`CACHE_HORIZON_DAYS`]), the hard
    /// cap ([`MAX_OCCURRENCES_PER_RUN`]), or the configured end condition
    /// stops it. Numbers continue from the parent's current high-water
    /// mark.
    ///
    /// Returns the number of rows inserted; 0 (with a warning) when the
    /// schedule carries neither an end date nor a duration, since no
    /// occurrence window can be computed from that.
    ///
    /// # Errors
    ///
    /// Returns an error if the occurrence store fails.
    #[tracing::instrument(skip(self, config, schedule), fields(parent_id = %parent_id))]
    pub async fn regenerate(
        &self,
        parent_id: CampaignId,
        config: &RecurringConfig,
        schedule: &ParentSchedule,
    ) -> Result<usize> {
        let Some(duration) = schedule.occurrence_duration() else {
            tracing::warn!(
                %parent_id,
                "cannot regenerate occurrences: schedule has no end date and no duration"
            );
            return Ok(0);
        };
        let Some(anchor) = schedule.anchor() else {
            tracing::warn!(
                %parent_id,
                "cannot regenerate occurrences: schedule has no usable anchor date"
            );
            return Ok(0);
        };

        let deleted = self.store.delete_pending(parent_id).await?;

        let horizon = self.clock.now() + Duration::days(CACHE_HORIZON_DAYS);
        // History (materialized or failed) counts against an occurrence
        // budget; deleted pending rows do not.
        let history = self.store.count_history(parent_id).await?;
        let mut number = self.store.max_number(parent_id).await?;
        let mut cursor = anchor;
        let mut rows = Vec::new();

        while rows.len() < MAX_OCCURRENCES_PER_RUN {
            let Some(next) = advance(cursor, config.pattern, config.interval) else {
                break;
            };
            cursor = next;

            if cursor > horizon {
                break;
            }
            match config.end {
                RecurrenceEnd::Never => {}
                RecurrenceEnd::AfterOccurrences { count } => {
                    let planned = u32::try_from(rows.len()).unwrap_or(u32::MAX);
                    if history.saturating_add(planned) >= count {
                        break;
                    }
                }
                RecurrenceEnd::OnDate { date } => {
                    if cursor > date {
                        break;
                    }
                }
            }

            number += 1;
            rows.push(NewOccurrence {
                parent_id,
                number,
                starts_at: cursor,
                ends_at: cursor + duration,
            });
        }

        let inserted = self.store.insert_batch(rows).await?;
        tracing::info!(%parent_id, deleted, inserted, "occurrence cache regenerated");
        Ok(inserted)
    }

    /// Returns `pending` occurrences starting within the lookahead window,
    /// for the external materializer.
    ///
    /// # Errors
    ///
    /// Returns an error if the occurrence store fails.
    pub async fn get_due_occurrences(&self, lookahead_minutes: i64) -> Result<Vec<Occurrence>> {
        let before = self.clock.now() + Duration::minutes(lookahead_minutes);
        self.store.list_due(before).await
    }

    /// Marks an occurrence materialized into a concrete campaign instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the store fails.
    pub async fn mark_materialized(
        &self,
        occurrence_id: OccurrenceId,
        instance_id: CampaignId,
    ) -> Result<()> {
        self.store
            .mark_materialized(occurrence_id, instance_id)
            .await
    }

    /// Marks an occurrence failed, recording the materializer's error.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the store fails.
    pub async fn mark_failed(
        &self,
        occurrence_id: OccurrenceId,
        error: impl Into<String> + Send,
    ) -> Result<()> {
        self.store.mark_failed(occurrence_id, error.into()).await
    }
}

/// Advances one step of the recurrence pattern.
///
/// Monthly steps use calendar arithmetic clamped to the end of the target
/// month. Returns `None` on date overflow.
fn advance(
    from: DateTime<Utc>,
    pattern: RecurrencePattern,
    interval: u32,
) -> Option<DateTime<Utc>> {
    let interval = interval.max(1);
    match pattern {
        RecurrencePattern::Daily => from.checked_add_signed(Duration::days(i64::from(interval))),
        RecurrencePattern::Weekly => {
            from.checked_add_signed(Duration::weeks(i64::from(interval)))
        }
        RecurrencePattern::Monthly => from.checked_add_months(Months::new(interval)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use promo_core::ManualClock;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn cache() -> (Arc<MemoryOccurrenceStore>, OccurrenceCache) {
        let store = Arc::new(MemoryOccurrenceStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        (store.clone(), OccurrenceCache::new(store, clock))
    }

    fn weekly_config(interval: u32) -> RecurringConfig {
        RecurringConfig::new(RecurrencePattern::Weekly, interval, RecurrenceEnd::Never)
    }

    fn one_day_schedule() -> ParentSchedule {
        ParentSchedule {
            starts_at: Some(now() - Duration::days(1)),
            ends_at: Some(now()),
            duration: None,
        }
    }

    #[tokio::test]
    async fn biweekly_occurrences_are_spaced_fourteen_days() {
        let (store, cache) = cache();
        let parent = CampaignId::new(1);

        let inserted = cache
            .regenerate(parent, &weekly_config(2), &one_day_schedule())
            .await
            .unwrap();

        // 90-day horizon at a 14-day step.
        assert_eq!(inserted, 6);
        assert!(inserted <= MAX_OCCURRENCES_PER_RUN);

        let rows = store.list_for_parent(parent).await.unwrap();
        for pair in rows.windows(2) {
            assert_eq!(pair[1].starts_at - pair[0].starts_at, Duration::days(14));
        }
        for row in &rows {
            assert_eq!(row.ends_at - row.starts_at, Duration::days(1));
            assert_eq!(row.status, OccurrenceStatus::Pending);
        }
    }

    #[tokio::test]
    async fn daily_regeneration_respects_hard_cap() {
        let (_store, cache) = cache();
        let config =
            RecurringConfig::new(RecurrencePattern::Daily, 1, RecurrenceEnd::Never);

        // 90 daily occurrences fit the horizon; the cap must still hold for
        // a longer horizon, so check the cap path with a large end date.
        let inserted = cache
            .regenerate(CampaignId::new(1), &config, &one_day_schedule())
            .await
            .unwrap();
        assert!(inserted <= MAX_OCCURRENCES_PER_RUN);
    }

    #[tokio::test]
    async fn numbers_continue_from_high_water_mark() {
        let (store, cache) = cache();
        let parent = CampaignId::new(1);

        cache
            .regenerate(parent, &weekly_config(2), &one_day_schedule())
            .await
            .unwrap();
        let first = store.list_for_parent(parent).await.unwrap();
        assert_eq!(first[0].number, 1);
        let last_number = first.last().unwrap().number;

        // Materialize the first occurrence, then regenerate: pending rows
        // are replaced with fresh numbers, history keeps its numbers.
        store
            .mark_materialized(first[0].id, CampaignId::new(99))
            .await
            .unwrap();
        cache
            .regenerate(parent, &weekly_config(2), &one_day_schedule())
            .await
            .unwrap();

        let rows = store.list_for_parent(parent).await.unwrap();
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].status, OccurrenceStatus::Active);
        assert!(rows[1].number > last_number, "deleted numbers are never reused");
    }

    #[tokio::test]
    async fn regeneration_preserves_active_and_failed_rows() {
        let (store, cache) = cache();
        let parent = CampaignId::new(1);

        cache
            .regenerate(parent, &weekly_config(2), &one_day_schedule())
            .await
            .unwrap();
        let rows = store.list_for_parent(parent).await.unwrap();
        store
            .mark_materialized(rows[0].id, CampaignId::new(50))
            .await
            .unwrap();
        store
            .mark_failed(rows[1].id, "instance save failed".into())
            .await
            .unwrap();

        cache
            .regenerate(parent, &weekly_config(2), &one_day_schedule())
            .await
            .unwrap();

        let rows = store.list_for_parent(parent).await.unwrap();
        let active: Vec<_> = rows
            .iter()
            .filter(|r| r.status == OccurrenceStatus::Active)
            .collect();
        let failed: Vec<_> = rows
            .iter()
            .filter(|r| r.status == OccurrenceStatus::Failed)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].instance_id, Some(CampaignId::new(50)));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("instance save failed"));
    }

    #[tokio::test]
    async fn after_occurrences_end_condition_caps_the_total() {
        let (store, cache) = cache();
        let parent = CampaignId::new(1);
        let config = RecurringConfig::new(
            RecurrencePattern::Weekly,
            1,
            RecurrenceEnd::AfterOccurrences { count: 3 },
        );

        let inserted = cache
            .regenerate(parent, &config, &one_day_schedule())
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        // Already-produced occurrences count against the budget.
        let rows = store.list_for_parent(parent).await.unwrap();
        store
            .mark_materialized(rows[0].id, CampaignId::new(7))
            .await
            .unwrap();
        let inserted = cache
            .regenerate(parent, &config, &one_day_schedule())
            .await
            .unwrap();
        assert_eq!(inserted, 2, "one slot of the budget is already used");
    }

    #[tokio::test]
    async fn on_date_end_condition_stops_the_walk() {
        let (_store, cache) = cache();
        let config = RecurringConfig::new(
            RecurrencePattern::Weekly,
            1,
            RecurrenceEnd::OnDate {
                date: now() + Duration::days(15),
            },
        );

        let inserted = cache
            .regenerate(CampaignId::new(1), &config, &one_day_schedule())
            .await
            .unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn missing_duration_yields_zero() {
        let (_store, cache) = cache();
        let schedule = ParentSchedule {
            starts_at: Some(now()),
            ends_at: None,
            duration: None,
        };

        let inserted = cache
            .regenerate(CampaignId::new(1), &weekly_config(1), &schedule)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn due_occurrences_respect_the_lookahead_window() {
        let (_store, cache) = cache();
        let parent = CampaignId::new(1);

        cache
            .regenerate(parent, &weekly_config(1), &one_day_schedule())
            .await
            .unwrap();

        // First occurrence starts 7 days after the parent's end (= now).
        let due = cache.get_due_occurrences(60).await.unwrap();
        assert!(due.is_empty());

        let due = cache
            .get_due_occurrences(8 * 24 * 60)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].number, 1);
    }

    #[test]
    fn monthly_advance_clamps_to_month_end() {
        let jan31 = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap();
        let next = advance(jan31, RecurrencePattern::Monthly, 1).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap());
    }
}
