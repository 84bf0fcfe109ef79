//! Campaign status transitions.
//!
//! The [`StateManager`] is the single authority for whether and how a
//! campaign's status may change, and for firing all status-change side
//! effects exactly once. It separates three concerns:
//!
//! - **Legality**: the static edge table on
//!   [`CampaignStatus::can_transition_to`]
//! - **Feasibility**: guard conditions on the target status (future start
//!   date for `scheduled`, no standing future end date for `expired`)
//! - **Side effects**: hooks, timer (re)registration, logging, and the
//!   structured event published to the external bus
//!
//! The reconciliation loop and the user-facing activate/pause/expire calls
//! all go through [`StateManager::transition`], so the same invariants hold
//! regardless of trigger.
//!
//! Business-data validation (name, discount configuration, product
//! selection) is explicitly not this component's job; it happens upstream
//! before `transition` is ever called.

use std::sync::Arc;

use chrono::Duration;

use promo_core::{ActorId, Clock};

use crate::campaign::{Campaign, CampaignStatus};
use crate::error::{Error, Result};
use crate::events::{EventRecord, EventSink, LifecycleEvent, LifecycleHooks, TransitionReason};
use crate::jobs::{JobKind, JobQueue};

/// Lead time for the ending-soon notification timer.
pub const ENDING_SOON_LEAD: Duration = Duration::hours(24);

/// Who asked for a transition, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    /// Why the transition happened.
    pub reason: TransitionReason,
    /// The acting user; ignored for system-driven reasons.
    pub actor: Option<ActorId>,
}

impl TransitionContext {
    /// A transition requested by a human actor.
    #[must_use]
    pub const fn manual(actor: ActorId) -> Self {
        Self {
            reason: TransitionReason::Manual,
            actor: Some(actor),
        }
    }

    /// A transition with an explicit reason and optional actor.
    #[must_use]
    pub const fn new(reason: TransitionReason, actor: Option<ActorId>) -> Self {
        Self { reason, actor }
    }

    /// The reconciliation/timer path starting a scheduled campaign.
    #[must_use]
    pub const fn auto_scheduled() -> Self {
        Self {
            reason: TransitionReason::AutoScheduled,
            actor: None,
        }
    }

    /// The reconciliation/timer path ending a campaign.
    #[must_use]
    pub const fn auto_expired() -> Self {
        Self {
            reason: TransitionReason::AutoExpired,
            actor: None,
        }
    }
}

/// Orchestrates status transitions: legality, guards, mutation, side effects.
pub struct StateManager {
    clock: Arc<dyn Clock>,
    jobs: Arc<dyn JobQueue>,
    events: Arc<dyn EventSink>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl StateManager {
    /// Creates a state manager over the given collaborators.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        jobs: Arc<dyn JobQueue>,
        events: Arc<dyn EventSink>,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> Self {
        Self {
            clock,
            jobs,
            events,
            hooks,
        }
    }

    /// Returns true if the edge `from -> to` is legal.
    ///
    /// Identical from/to is always allowed (no-op). Never errors; the
    /// status set is closed, so there is no unknown-status case.
    #[must_use]
    pub fn can_transition(&self, from: CampaignStatus, to: CampaignStatus) -> bool {
        from.can_transition_to(to)
    }

    /// Transitions a campaign to a new status.
    ///
    /// The campaign must already be persisted (side effects are keyed by
    /// its numeric ID). On success the status, `updated_at`, and
    /// `updated_by` are mutated in place; the caller persists the result.
    ///
    /// `updated_by` is cleared for system-driven reasons
    /// (`auto_scheduled`/`auto_expired`) and set to the acting user
    /// otherwise; that null is how downstream code tells an automatic
    /// transition from a manual one.
    ///
    /// Timer registration failures are logged and do not fail the
    /// transition; the reconciliation loop is the designed fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatusTransition`] for an illegal edge or a
    /// failed guard condition, without mutating the campaign.
    #[tracing::instrument(
        skip(self, campaign, context),
        fields(campaign_id = ?campaign.id, from = %campaign.status, to = %to, reason = %context.reason)
    )]
    pub async fn transition(
        &self,
        campaign: &mut Campaign,
        to: CampaignStatus,
        context: TransitionContext,
    ) -> Result<()> {
        let from = campaign.status;

        if !self.can_transition(from, to) {
            return Err(Error::invalid_transition(
                from,
                to,
                "no edge in transition table",
            ));
        }

        if from == to {
            return Ok(());
        }

        let now = self.clock.now();

        // Guard conditions are specific to the target status only.
        match to {
            CampaignStatus::Scheduled => {
                let starts_in_future = campaign.starts_at.is_some_and(|start| start > now);
                if !starts_in_future {
                    return Err(Error::invalid_transition(
                        from,
                        to,
                        "scheduled status requires a start date in the future",
                    ));
                }
            }
            CampaignStatus::Expired => {
                // Manual expiry must not preempt a legitimate future end date.
                if campaign.ends_at.is_some_and(|end| end > now) {
                    return Err(Error::invalid_transition(
                        from,
                        to,
                        "end date is still in the future",
                    ));
                }
            }
            _ => {}
        }

        let Some(campaign_id) = campaign.id else {
            return Err(Error::Core(promo_core::Error::Internal {
                message: "cannot transition an unsaved campaign".into(),
            }));
        };

        self.hooks.before_transition(campaign, to, &context);

        campaign.status = to;
        campaign.updated_at = now;
        campaign.updated_by = if context.reason.is_system() {
            None
        } else {
            context.actor
        };

        self.hooks.after_transition(campaign, from, &context);

        match to {
            CampaignStatus::Active => {
                self.register_end_timers(campaign).await;
            }
            CampaignStatus::Expired | CampaignStatus::Archived => {
                self.clear_campaign_jobs(campaign_id).await;
            }
            _ => {}
        }

        tracing::info!(
            campaign_id = %campaign_id,
            from = %from,
            to = %to,
            reason = %context.reason,
            actor = ?campaign.updated_by,
            "campaign status changed"
        );

        self.events.publish(EventRecord::new(
            LifecycleEvent::StateChanged {
                campaign_id,
                from,
                to,
                actor: campaign.updated_by,
                reason: context.reason,
            },
            now,
        ));

        Ok(())
    }

    /// Applies any time-driven transition that is due.
    ///
    /// This is the reconciliation primitive: a scheduled campaign whose
    /// start has passed becomes active (`auto_scheduled`); an active or
    /// paused campaign whose end has passed becomes expired
    /// (`auto_expired`). Returns whether a transition occurred; transition
    /// errors are swallowed as `false` and retried on the next tick.
    pub async fn auto_transition(&self, campaign: &mut Campaign) -> bool {
        let now = self.clock.now();

        let (target, context) = match campaign.status {
            CampaignStatus::Scheduled if campaign.start_has_passed(now) => {
                (CampaignStatus::Active, TransitionContext::auto_scheduled())
            }
            CampaignStatus::Active | CampaignStatus::Paused if campaign.end_has_passed(now) => {
                (CampaignStatus::Expired, TransitionContext::auto_expired())
            }
            _ => return false,
        };

        match self.transition(campaign, target, context).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    campaign_id = ?campaign.id,
                    target = %target,
                    %error,
                    "auto transition failed; will retry on next tick"
                );
                false
            }
        }
    }

    /// (Re)registers the expiration and ending-soon timers for a campaign
    /// that just became active. Clear-then-set keeps re-entry idempotent.
    async fn register_end_timers(&self, campaign: &Campaign) {
        let Some(campaign_id) = campaign.id else {
            return;
        };
        let now = self.clock.now();

        for kind in [JobKind::Deactivate, JobKind::EndingSoon] {
            if let Err(error) = self.jobs.unschedule(kind, campaign_id).await {
                tracing::warn!(%campaign_id, %kind, %error, "failed to clear timer");
            }
        }

        let Some(ends_at) = campaign.ends_at else {
            return;
        };

        if ends_at > now {
            if let Err(error) = self
                .jobs
                .schedule_single(ends_at, JobKind::Deactivate, campaign_id)
                .await
            {
                tracing::warn!(%campaign_id, %error, "failed to register expiration timer");
            }
        }

        let notice_at = ends_at - ENDING_SOON_LEAD;
        if notice_at > now {
            if let Err(error) = self
                .jobs
                .schedule_single(notice_at, JobKind::EndingSoon, campaign_id)
                .await
            {
                tracing::warn!(%campaign_id, %error, "failed to register ending-soon timer");
            }
        }
    }

    /// Clears every outstanding per-campaign job when the campaign enters
    /// a terminal status.
    async fn clear_campaign_jobs(&self, campaign_id: promo_core::CampaignId) {
        for kind in [
            JobKind::Deactivate,
            JobKind::EndingSoon,
            JobKind::RotateProducts,
        ] {
            if let Err(error) = self.jobs.unschedule(kind, campaign_id).await {
                tracing::warn!(%campaign_id, %kind, %error, "failed to clear job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignSpec;
    use crate::events::{MemorySink, NoopHooks};
    use crate::jobs::memory::MemoryJobQueue;
    use chrono::{DateTime, TimeZone, Utc};
    use promo_core::{CampaignId, ManualClock};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        jobs: Arc<MemoryJobQueue>,
        sink: Arc<MemorySink>,
        state: StateManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(now()));
        let jobs = Arc::new(MemoryJobQueue::new());
        let sink = Arc::new(MemorySink::new());
        let state = StateManager::new(
            clock.clone(),
            jobs.clone(),
            sink.clone(),
            Arc::new(NoopHooks),
        );
        Fixture {
            clock,
            jobs,
            sink,
            state,
        }
    }

    fn persisted_campaign(status: CampaignStatus) -> Campaign {
        let mut campaign = Campaign::from_spec(
            CampaignSpec {
                name: "Summer Sale".into(),
                ..CampaignSpec::default()
            },
            now(),
        )
        .unwrap();
        campaign.id = Some(CampaignId::new(1));
        campaign.version = 1;
        campaign.status = status;
        campaign
    }

    #[tokio::test]
    async fn illegal_edge_is_rejected_without_mutation() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Expired);

        let err = f
            .state
            .transition(
                &mut campaign,
                CampaignStatus::Active,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidStatusTransition { .. }));
        assert_eq!(campaign.status, CampaignStatus::Expired);
        assert!(f.sink.records().is_empty());
    }

    #[tokio::test]
    async fn self_transition_is_a_noop_success() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Draft);
        let updated_at = campaign.updated_at;

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Draft,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        assert_eq!(campaign.updated_at, updated_at);
        assert!(f.sink.records().is_empty());
    }

    #[tokio::test]
    async fn scheduling_requires_future_start() {
        let f = fixture();

        let mut campaign = persisted_campaign(CampaignStatus::Draft);
        assert!(f
            .state
            .transition(
                &mut campaign,
                CampaignStatus::Scheduled,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .is_err());

        campaign.starts_at = Some(now() - chrono::Duration::minutes(1));
        assert!(f
            .state
            .transition(
                &mut campaign,
                CampaignStatus::Scheduled,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .is_err());

        campaign.starts_at = Some(now() + chrono::Duration::hours(1));
        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Scheduled,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn manual_expiry_cannot_preempt_future_end_date() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Active);
        campaign.ends_at = Some(now() + chrono::Duration::days(1));

        let err = f
            .state
            .transition(
                &mut campaign,
                CampaignStatus::Expired,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still in the future"));

        // Once the end date passes, expiry goes through.
        f.clock.advance(chrono::Duration::days(2));
        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Expired,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Expired);
    }

    #[tokio::test]
    async fn expiry_with_no_end_date_is_allowed() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Active);
        campaign.ends_at = None;

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Expired,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Expired);
    }

    #[tokio::test]
    async fn system_transitions_leave_updated_by_unset() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Scheduled);
        campaign.starts_at = Some(now() - chrono::Duration::minutes(5));
        campaign.updated_by = Some(ActorId::new(9));

        assert!(f.state.auto_transition(&mut campaign).await);
        assert_eq!(campaign.status, CampaignStatus::Active);
        assert_eq!(campaign.updated_by, None);
    }

    #[tokio::test]
    async fn manual_transitions_record_the_actor() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Active);

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Paused,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        assert_eq!(campaign.updated_by, Some(ActorId::new(9)));
    }

    #[tokio::test]
    async fn activation_registers_end_timers() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Draft);
        campaign.ends_at = Some(now() + chrono::Duration::days(3));

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Active,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        let jobs = f.jobs.jobs_for(CampaignId::new(1)).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().any(|j| j.kind == JobKind::Deactivate
            && j.fire_at == now() + chrono::Duration::days(3)));
        assert!(jobs.iter().any(|j| j.kind == JobKind::EndingSoon
            && j.fire_at == now() + chrono::Duration::days(3) - ENDING_SOON_LEAD));
    }

    #[tokio::test]
    async fn ending_soon_is_skipped_when_already_inside_the_window() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Draft);
        campaign.ends_at = Some(now() + chrono::Duration::hours(6));

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Active,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        let jobs = f.jobs.jobs_for(CampaignId::new(1)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Deactivate);
    }

    #[tokio::test]
    async fn terminal_transitions_clear_outstanding_jobs() {
        let f = fixture();
        let campaign_id = CampaignId::new(1);
        let mut campaign = persisted_campaign(CampaignStatus::Active);

        f.jobs
            .schedule_single(now() + chrono::Duration::days(1), JobKind::Deactivate, campaign_id)
            .await
            .unwrap();
        f.jobs
            .schedule_single(
                now() + chrono::Duration::hours(1),
                JobKind::RotateProducts,
                campaign_id,
            )
            .await
            .unwrap();

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Archived,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        assert!(f.jobs.jobs_for(campaign_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transitions_publish_state_changed_events() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Active);

        f.state
            .transition(
                &mut campaign,
                CampaignStatus::Paused,
                TransitionContext::manual(ActorId::new(9)),
            )
            .await
            .unwrap();

        let records = f.sink.records();
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].event,
            LifecycleEvent::StateChanged {
                from: CampaignStatus::Active,
                to: CampaignStatus::Paused,
                actor: Some(actor),
                ..
            } if actor == ActorId::new(9)
        ));
    }

    #[tokio::test]
    async fn auto_transition_returns_false_when_nothing_is_due() {
        let f = fixture();
        let mut campaign = persisted_campaign(CampaignStatus::Active);
        campaign.ends_at = Some(now() + chrono::Duration::days(1));

        assert!(!f.state.auto_transition(&mut campaign).await);
        assert_eq!(campaign.status, CampaignStatus::Active);
    }
}
