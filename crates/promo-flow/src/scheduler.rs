//! One-shot timer management for campaign schedules.
//!
//! The event scheduler translates a campaign's absolute `starts_at`/`ends_at`
//! into exactly the one-shot jobs needed to flip its status at the right
//! wall-clock moment, without relying purely on a periodic poll:
//!
//! - **Activate timer**: registered for draft/scheduled campaigns with a
//!   future start date
//! - **Deactivate timer**: registered for any non-terminal campaign with a
//!   future end date — an active campaign with an end date must always have
//!   a live expiration timer or it will never expire automatically
//!
//! Re-scheduling is always clear-then-set, so the edit flows can call
//! [`EventScheduler::schedule_campaign_events`] repeatedly as dates change
//! without ever accumulating duplicate timers. A job whose target timestamp
//! is already in the past is never registered; the underlying job facility
//! either rejects those or fires them instantly, and this component avoids
//! that ambiguity entirely.
//!
//! The fired-timer handlers delegate to the [`CampaignManager`] and swallow
//! every error into logging: a failed scheduled activation must never crash
//! the job runner, and the reconciliation loop is the designed fallback.

use std::sync::Arc;

use promo_core::{CampaignId, Clock};

use crate::campaign::CampaignStatus;
use crate::error::Result;
use crate::jobs::{JobKind, JobQueue};
use crate::manager::{CampaignManager, ReconcileOutcome};
use crate::state::TransitionContext;
use crate::store::CampaignStore;

/// Registers and clears the per-campaign one-shot timers.
pub struct EventScheduler {
    store: Arc<dyn CampaignStore>,
    jobs: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
}

impl EventScheduler {
    /// Creates a scheduler over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CampaignStore>,
        jobs: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, jobs, clock }
    }

    /// (Re)registers the activate/deactivate timers for a campaign.
    ///
    /// Returns `Ok(false)` when the campaign does not exist (or is
    /// soft-deleted); the caller has nothing to schedule and nothing
    /// failed. Terminal statuses are a successful no-op: no future timer
    /// is ever appropriate for them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the job facility fails.
    #[tracing::instrument(skip(self), fields(campaign_id = %campaign_id))]
    pub async fn schedule_campaign_events(&self, campaign_id: CampaignId) -> Result<bool> {
        let Some(campaign) = self.store.find(campaign_id).await? else {
            tracing::debug!(%campaign_id, "not scheduling events for unknown campaign");
            return Ok(false);
        };
        if campaign.is_deleted() {
            tracing::debug!(%campaign_id, "not scheduling events for deleted campaign");
            return Ok(false);
        }

        if campaign.status.no_future_events() {
            return Ok(true);
        }

        // Idempotent re-scheduling: edit flows call this repeatedly as
        // dates change, so stale timers must go before new ones land.
        self.clear_campaign_events(campaign_id).await?;

        let now = self.clock.now();

        if matches!(
            campaign.status,
            CampaignStatus::Draft | CampaignStatus::Scheduled
        ) {
            if let Some(starts_at) = campaign.starts_at {
                if starts_at > now {
                    self.jobs
                        .schedule_single(starts_at, JobKind::Activate, campaign_id)
                        .await?;
                }
            }
        }

        if let Some(ends_at) = campaign.ends_at {
            if ends_at > now {
                self.jobs
                    .schedule_single(ends_at, JobKind::Deactivate, campaign_id)
                    .await?;
            }
        }

        Ok(true)
    }

    /// Unconditionally removes the activate and deactivate registrations
    /// for a campaign. Idempotent; a no-op when none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the job facility fails.
    pub async fn clear_campaign_events(&self, campaign_id: CampaignId) -> Result<()> {
        self.jobs.unschedule(JobKind::Activate, campaign_id).await?;
        self.jobs
            .unschedule(JobKind::Deactivate, campaign_id)
            .await?;
        Ok(())
    }

    /// Entry point for a fired activate timer.
    ///
    /// Invoked by the external job runner at the scheduled moment. All
    /// errors are logged and swallowed; the safety-net loop picks up
    /// anything this misses.
    pub async fn handle_activation_event(
        &self,
        manager: &CampaignManager,
        campaign_id: CampaignId,
    ) {
        if let Err(error) = manager
            .activate(campaign_id, TransitionContext::auto_scheduled())
            .await
        {
            tracing::error!(%campaign_id, %error, "scheduled activation failed");
        }
    }

    /// Entry point for a fired deactivate timer.
    ///
    /// Invoked by the external job runner at the scheduled moment. All
    /// errors are logged and swallowed; the safety-net loop picks up
    /// anything this misses.
    pub async fn handle_deactivation_event(
        &self,
        manager: &CampaignManager,
        campaign_id: CampaignId,
    ) {
        if let Err(error) = manager
            .expire(campaign_id, TransitionContext::auto_expired())
            .await
        {
            tracing::error!(%campaign_id, %error, "scheduled deactivation failed");
        }
    }

    /// Stable entry point for the external cron layer's periodic safety
    /// check; wraps the manager's reconciliation loop.
    pub async fn run_safety_check(&self, manager: &CampaignManager) -> ReconcileOutcome {
        manager.process_scheduled_campaigns().await
    }
}
