//! In-memory job queue implementation for testing.
//!
//! Registrations live in process memory; [`MemoryJobQueue::due`] lets tests
//! play the external job runner by draining jobs whose fire time has
//! passed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use promo_core::CampaignId;

use super::{JobId, JobKind, JobQueue, ScheduledJob};
use crate::error::{Error, Result};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("job queue lock poisoned")
}

/// In-memory job queue for testing.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: RwLock<Vec<ScheduledJob>>,
    next_id: AtomicU64,
}

impl MemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all registrations, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn all(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.jobs.read().map_err(poison_err)?.clone())
    }

    /// Removes and returns every job whose fire time has passed.
    ///
    /// Test harnesses use this to act as the external job runner.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let (fired, remaining): (Vec<_>, Vec<_>) =
            jobs.iter().copied().partition(|job| job.fire_at <= now);
        *jobs = remaining;
        Ok(fired)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn schedule_single(
        &self,
        fire_at: DateTime<Utc>,
        kind: JobKind,
        campaign_id: CampaignId,
    ) -> Result<Option<JobId>> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.push(ScheduledJob {
            id,
            kind,
            campaign_id,
            fire_at,
        });
        Ok(Some(id))
    }

    async fn unschedule(&self, kind: JobKind, campaign_id: CampaignId) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.retain(|job| !(job.kind == kind && job.campaign_id == campaign_id));
        Ok(())
    }

    async fn jobs_for(&self, campaign_id: CampaignId) -> Result<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs
            .iter()
            .filter(|job| job.campaign_id == campaign_id)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn schedule_and_list() {
        let queue = MemoryJobQueue::new();
        let id = CampaignId::new(1);

        queue
            .schedule_single(now() + Duration::hours(1), JobKind::Activate, id)
            .await
            .unwrap();
        queue
            .schedule_single(now() + Duration::hours(2), JobKind::Deactivate, id)
            .await
            .unwrap();

        let jobs = queue.jobs_for(id).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind, JobKind::Activate);
        assert_eq!(jobs[1].kind, JobKind::Deactivate);
    }

    #[tokio::test]
    async fn unschedule_matches_kind_and_campaign() {
        let queue = MemoryJobQueue::new();
        let one = CampaignId::new(1);
        let two = CampaignId::new(2);

        queue
            .schedule_single(now(), JobKind::Activate, one)
            .await
            .unwrap();
        queue
            .schedule_single(now(), JobKind::Activate, two)
            .await
            .unwrap();

        queue.unschedule(JobKind::Activate, one).await.unwrap();

        assert!(queue.jobs_for(one).await.unwrap().is_empty());
        assert_eq!(queue.jobs_for(two).await.unwrap().len(), 1);

        // Idempotent on repeat.
        queue.unschedule(JobKind::Activate, one).await.unwrap();
    }

    #[tokio::test]
    async fn due_drains_only_past_jobs() {
        let queue = MemoryJobQueue::new();
        let id = CampaignId::new(1);

        queue
            .schedule_single(now() - Duration::minutes(5), JobKind::Activate, id)
            .await
            .unwrap();
        queue
            .schedule_single(now() + Duration::minutes(5), JobKind::Deactivate, id)
            .await
            .unwrap();

        let fired = queue.due(now()).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, JobKind::Activate);

        let remaining = queue.jobs_for(id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, JobKind::Deactivate);
    }
}
