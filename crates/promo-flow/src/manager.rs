//! The campaign manager façade.
//!
//! Every caller (admin controllers, the external job runner, cron) mutates
//! campaign lifecycle through the [`CampaignManager`]; nothing else writes
//! campaign rows. The manager owns:
//!
//! - the create/update/delete/duplicate surface with its validation
//! - the activate/pause/archive/expire surface, delegating the actual
//!   transition to the [`StateManager`]
//! - the **reconciliation loop** ([`CampaignManager::process_scheduled_campaigns`]),
//!   the safety net that catches anything the one-shot timers missed
//!
//! ## Concurrency
//!
//! The reconciliation loop runs under a 60-second TTL lock so overlapping
//! cron runs cannot double-activate a campaign. Everything else relies on
//! idempotent re-checks instead of locking: version-match-on-write gives
//! each status commit compare-and-swap semantics, and the loser of a
//! benign race (the row is already in the target status) reports success
//! rather than an error. Side effects behind that success path — timer
//! re-registration (clear-then-set) and event publication (structural
//! idempotency keys) — are safe to fire twice.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use promo_core::{ActorId, CampaignId, Clock, ProcessLock, TransientStore};

use crate::campaign::{
    Campaign, CampaignSpec, CampaignStatus, CampaignUpdate, CompilationMethod, SelectionType,
    slugify,
};
use crate::error::{Error, Result};
use crate::events::{EventRecord, EventSink, LifecycleEvent, LifecycleHooks};
use crate::jobs::{JobKind, JobQueue};
use crate::metrics::{labels, names};
use crate::scheduler::EventScheduler;
use crate::selector::ProductSelector;
use crate::state::{StateManager, TransitionContext};
use crate::store::CampaignStore;

/// Transient-store key guarding the reconciliation loop.
pub const PROCESS_CAMPAIGNS_LOCK_KEY: &str = "scd_process_campaigns_lock";

/// TTL of the reconciliation lock; the backstop for crashed holders.
pub const PROCESS_CAMPAIGNS_LOCK_TTL: Duration = Duration::seconds(60);

/// How many recently-expired notices are retained for admin notices.
pub const RECENTLY_EXPIRED_CAP: usize = 50;

/// Why a reconciliation run did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another process holds the reconciliation lock.
    Locked,
}

/// Batch result of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Campaigns activated this run.
    pub activated: Vec<CampaignId>,
    /// Campaigns expired this run.
    pub expired: Vec<CampaignId>,
    /// Per-campaign failures; one entry never aborts the rest.
    pub errors: Vec<String>,
    /// Set when the run was skipped entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl ReconcileOutcome {
    /// An outcome for a run that was skipped because the lock was held.
    #[must_use]
    pub fn skipped_locked() -> Self {
        Self {
            skipped: Some(SkipReason::Locked),
            ..Self::default()
        }
    }

    /// Returns true if the run was skipped entirely.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// One entry of the transient recently-expired history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredNotice {
    /// The campaign that expired.
    pub campaign_id: CampaignId,
    /// Its display name at expiry time.
    pub name: String,
    /// When it expired.
    pub expired_at: DateTime<Utc>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("recently-expired history lock poisoned")
}

/// The façade orchestrating campaign lifecycle.
pub struct CampaignManager {
    store: Arc<dyn CampaignStore>,
    jobs: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    selector: Arc<dyn ProductSelector>,
    state: StateManager,
    scheduler: EventScheduler,
    lock: ProcessLock,
    recently_expired: RwLock<VecDeque<ExpiredNotice>>,
}

impl CampaignManager {
    /// Creates a manager over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CampaignStore>,
        jobs: Arc<dyn JobQueue>,
        transient: Arc<dyn TransientStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        hooks: Arc<dyn LifecycleHooks>,
        selector: Arc<dyn ProductSelector>,
    ) -> Self {
        let state = StateManager::new(
            Arc::clone(&clock),
            Arc::clone(&jobs),
            Arc::clone(&events),
            hooks,
        );
        let scheduler =
            EventScheduler::new(Arc::clone(&store), Arc::clone(&jobs), Arc::clone(&clock));
        let lock = ProcessLock::new(transient, PROCESS_CAMPAIGNS_LOCK_KEY);

        Self {
            store,
            jobs,
            clock,
            events,
            selector,
            state,
            scheduler,
            lock,
            recently_expired: RwLock::new(VecDeque::new()),
        }
    }

    /// Returns the event scheduler bound to this manager's collaborators,
    /// for the external job runner and cron layer.
    #[must_use]
    pub const fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Returns a campaign by ID, if it exists and is not soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self
            .store
            .find(campaign_id)
            .await?
            .filter(|campaign| !campaign.is_deleted()))
    }

    /// Creates a campaign.
    ///
    /// Applies defaults (draft status, priority 5), derives a unique slug,
    /// persists, and wires up scheduling:
    ///
    /// - created directly active with a dynamic selection or filter
    ///   conditions, the product selection compiles synchronously and the
    ///   activation event fires now rather than waiting for a later
    ///   activation
    /// - any non-terminal status gets its one-shot timers registered
    /// - if the start date has already passed (the author sat on a review
    ///   screen past the intended start), the campaign is activated
    ///   immediately instead of waiting for the next timer or
    ///   reconciliation tick; the status is re-read first so a concurrent
    ///   activation counts as success, not an error
    ///
    /// Scheduling failures are logged and non-fatal; the reconciliation
    /// loop is the designed fallback.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed data and storage errors
    /// from the persistence layer.
    #[tracing::instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create(&self, spec: CampaignSpec) -> Result<Campaign> {
        let now = self.clock.now();
        let mut campaign = Campaign::from_spec(spec, now)?;
        campaign.slug = self.unique_slug(&campaign.slug).await?;

        if campaign.status == CampaignStatus::Active {
            self.validate_activation_readiness(&campaign)?;
        }

        self.store.save(&mut campaign).await?;
        let campaign_id = persisted_id(&campaign)?;

        tracing::info!(%campaign_id, slug = %campaign.slug, status = %campaign.status, "campaign created");

        if campaign.status == CampaignStatus::Active
            && (campaign.selection.is_dynamic() || !campaign.conditions.is_empty())
        {
            // Compile now; a later activation event will never come for a
            // campaign born active.
            match self.compile_products(&mut campaign).await {
                Ok(()) => {
                    if let Err(error) = self.store.save(&mut campaign).await {
                        tracing::warn!(%campaign_id, %error, "failed to persist compiled selection");
                    }
                }
                Err(error) => {
                    tracing::warn!(%campaign_id, %error, "product compilation failed at create");
                }
            }
            self.publish(LifecycleEvent::Activated { campaign_id });
        }

        if !campaign.status.no_future_events() {
            if let Err(error) = self.scheduler.schedule_campaign_events(campaign_id).await {
                tracing::warn!(%campaign_id, %error, "failed to schedule campaign events");
            }
        }

        // Immediate catch-up: the intended start may already be behind us.
        // A window that is entirely over is left to the reconciliation
        // loop, which expires it without a transient activation.
        if campaign.status == CampaignStatus::Scheduled
            && campaign.start_has_passed(now)
            && !campaign.end_has_passed(now)
        {
            match self.store.find(campaign_id).await? {
                Some(fresh) if fresh.status == CampaignStatus::Scheduled => {
                    if let Err(error) = self
                        .activate(campaign_id, TransitionContext::auto_scheduled())
                        .await
                    {
                        tracing::warn!(%campaign_id, %error, "immediate catch-up activation failed");
                    }
                }
                Some(fresh) if fresh.status == CampaignStatus::Active => {
                    tracing::info!(%campaign_id, "campaign already activated concurrently");
                }
                _ => {}
            }
            if let Some(fresh) = self.store.find(campaign_id).await? {
                return Ok(fresh);
            }
        }

        Ok(campaign)
    }

    /// Updates a campaign.
    ///
    /// If the update changes the status, the edge is validated against the
    /// transition table (defense in depth alongside the state manager's
    /// own check). After persisting, timers are re-scheduled for live
    /// statuses and cleared for terminal ones.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, validation errors, transition errors
    /// for an illegal status edge, and storage errors.
    #[tracing::instrument(skip(self, update), fields(campaign_id = %campaign_id))]
    pub async fn update(
        &self,
        campaign_id: CampaignId,
        update: CampaignUpdate,
        actor: Option<ActorId>,
    ) -> Result<Campaign> {
        let mut campaign = self.load(campaign_id).await?;

        if let Some(new_status) = update.status {
            if new_status != campaign.status && !campaign.status.can_transition_to(new_status) {
                return Err(Error::invalid_transition(
                    campaign.status,
                    new_status,
                    "no edge in transition table",
                ));
            }
        }

        campaign.apply_update(update, self.clock.now())?;
        campaign.updated_by = actor;
        self.store.save(&mut campaign).await?;

        match campaign.status {
            CampaignStatus::Draft
            | CampaignStatus::Scheduled
            | CampaignStatus::Active
            | CampaignStatus::Paused => {
                if let Err(error) = self.scheduler.schedule_campaign_events(campaign_id).await {
                    tracing::warn!(%campaign_id, %error, "failed to re-schedule campaign events");
                }
            }
            CampaignStatus::Expired | CampaignStatus::Archived => {
                if let Err(error) = self.scheduler.clear_campaign_events(campaign_id).await {
                    tracing::warn!(%campaign_id, %error, "failed to clear campaign events");
                }
            }
        }

        Ok(campaign)
    }

    /// Activates a campaign.
    ///
    /// Verifies the transition is legal, validates activation readiness
    /// (a configured discount and some product targeting), resolves the
    /// product selection when it needs (re)compilation, then commits the
    /// transition. A concurrent activation detected at commit time is
    /// treated as success.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, `Validation` for unready campaigns,
    /// `InvalidStatusTransition` when activation is not legal from the
    /// current status, and storage errors.
    #[tracing::instrument(skip(self), fields(campaign_id = %campaign_id, reason = %context.reason))]
    pub async fn activate(
        &self,
        campaign_id: CampaignId,
        context: TransitionContext,
    ) -> Result<Campaign> {
        let mut campaign = self.load(campaign_id).await?;

        if campaign.status == CampaignStatus::Active {
            return Ok(campaign);
        }
        if !campaign.status.can_transition_to(CampaignStatus::Active) {
            return Err(Error::invalid_transition(
                campaign.status,
                CampaignStatus::Active,
                "cannot activate from this status",
            ));
        }
        self.validate_activation_readiness(&campaign)?;

        // An active campaign must never apply discounts over a stale or
        // empty resolved selection, so compilation happens before the
        // status flips.
        if campaign.needs_recompilation() {
            self.compile_products(&mut campaign).await?;
        }

        let outcome = self
            .commit_transition(campaign, CampaignStatus::Active, context)
            .await?;
        counter!(
            names::CAMPAIGNS_ACTIVATED_TOTAL,
            labels::REASON => context.reason.to_string(),
        )
        .increment(1);
        self.publish(LifecycleEvent::Activated { campaign_id });
        Ok(outcome)
    }

    /// Pauses a campaign. The end date still stands while paused.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, transition errors, and storage errors.
    pub async fn pause(
        &self,
        campaign_id: CampaignId,
        context: TransitionContext,
    ) -> Result<Campaign> {
        let (campaign, changed) = self
            .change_campaign_status(campaign_id, CampaignStatus::Paused, context)
            .await?;
        if changed {
            self.publish(LifecycleEvent::Paused { campaign_id });
        }
        Ok(campaign)
    }

    /// Archives a campaign and clears its outstanding jobs.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, transition errors, and storage errors.
    pub async fn archive(
        &self,
        campaign_id: CampaignId,
        context: TransitionContext,
    ) -> Result<Campaign> {
        let (campaign, changed) = self
            .change_campaign_status(campaign_id, CampaignStatus::Archived, context)
            .await?;
        if changed {
            self.publish(LifecycleEvent::Archived { campaign_id });
        }
        Ok(campaign)
    }

    /// Expires a campaign and records it in the recently-expired history.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, transition errors (including a standing
    /// future end date), and storage errors.
    pub async fn expire(
        &self,
        campaign_id: CampaignId,
        context: TransitionContext,
    ) -> Result<Campaign> {
        let (campaign, changed) = self
            .change_campaign_status(campaign_id, CampaignStatus::Expired, context)
            .await?;
        if changed {
            counter!(
                names::CAMPAIGNS_EXPIRED_TOTAL,
                labels::REASON => context.reason.to_string(),
            )
            .increment(1);
            self.publish(LifecycleEvent::Expired { campaign_id });
            self.record_expired(&campaign)?;
        }
        Ok(campaign)
    }

    /// Soft-deletes a campaign and clears its jobs.
    ///
    /// The row stays in the store with `deleted_at` set; status queries
    /// and reconciliation no longer see it.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound` and storage errors.
    pub async fn delete(&self, campaign_id: CampaignId, actor: Option<ActorId>) -> Result<()> {
        let mut campaign = self.load(campaign_id).await?;
        campaign.soft_delete(self.clock.now());
        campaign.updated_by = actor;
        self.store.save(&mut campaign).await?;

        self.clear_all_jobs(campaign_id).await;
        tracing::info!(%campaign_id, "campaign soft-deleted");
        Ok(())
    }

    /// Hard-deletes a campaign row and clears its jobs.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn delete_permanently(&self, campaign_id: CampaignId) -> Result<bool> {
        let removed = self.store.delete(campaign_id).await?;
        self.clear_all_jobs(campaign_id).await;
        if removed {
            tracing::info!(%campaign_id, "campaign deleted");
        }
        Ok(removed)
    }

    /// Clones a campaign into a fresh draft.
    ///
    /// The copy gets a new UUID, a distinct "Name (Copy)"-style name and
    /// slug, zeroed counters, and **no schedule**: duplicated campaigns
    /// never inherit `starts_at`/`ends_at`, so they cannot silently
    /// reactivate with already-expired dates. Overrides apply on top,
    /// except the status, which is always draft.
    ///
    /// # Errors
    ///
    /// Returns `CampaignNotFound`, validation errors from the overrides,
    /// and storage errors.
    #[tracing::instrument(skip(self, overrides), fields(campaign_id = %campaign_id))]
    pub async fn duplicate(
        &self,
        campaign_id: CampaignId,
        overrides: Option<CampaignUpdate>,
        actor: Option<ActorId>,
    ) -> Result<Campaign> {
        let source = self.load(campaign_id).await?;
        let now = self.clock.now();

        let mut copy = source.clone();
        copy.id = None;
        copy.uuid = Uuid::new_v4();
        copy.version = 0;
        copy.status = CampaignStatus::Draft;
        copy.starts_at = None;
        copy.ends_at = None;
        copy.compiled_at = None;
        copy.compilation_method = None;
        copy.deleted_at = None;
        copy.created_at = now;
        copy.updated_at = now;
        copy.created_by = actor;
        copy.updated_by = actor;
        copy.reset_counters();

        let (name, slug) = self.copy_name_and_slug(&source.name).await?;
        copy.name = name;
        copy.slug = slug;

        if let Some(overrides) = overrides {
            copy.apply_update(overrides, now)?;
            copy.status = CampaignStatus::Draft;
        }

        self.store.save(&mut copy).await?;
        tracing::info!(source = %campaign_id, copy = ?copy.id, "campaign duplicated");
        Ok(copy)
    }

    /// The reconciliation loop: the safety net for missed or delayed
    /// timers.
    ///
    /// Under a 60-second TTL lock (skipping the whole run when another
    /// process holds it):
    ///
    /// 1. every `scheduled` campaign is checked **expiration before
    ///    activation** — one already past its end date expires directly
    ///    instead of transiently activating;
    /// 2. every `active` and `paused` campaign past its end date expires
    ///    (an end date is an absolute deadline regardless of manual
    ///    pause).
    ///
    /// Individual campaign failures land in `errors` and never abort the
    /// rest. The lock is released on every path; its TTL is the backstop
    /// if this process dies mid-run.
    #[tracing::instrument(skip(self))]
    pub async fn process_scheduled_campaigns(&self) -> ReconcileOutcome {
        counter!(names::RECONCILE_RUNS_TOTAL).increment(1);

        let lease = match self.lock.try_acquire(PROCESS_CAMPAIGNS_LOCK_TTL).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!("reconciliation skipped: lock already held");
                counter!(names::RECONCILE_SKIPPED_TOTAL, labels::REASON => "locked").increment(1);
                return ReconcileOutcome::skipped_locked();
            }
            Err(error) => {
                tracing::error!(%error, "failed to acquire reconciliation lock");
                return ReconcileOutcome {
                    errors: vec![format!("lock acquisition failed: {error}")],
                    ..ReconcileOutcome::default()
                };
            }
        };

        let outcome = self.reconcile_tick().await;

        if let Err(error) = lease.release().await {
            tracing::warn!(%error, "failed to release reconciliation lock; TTL will reclaim it");
        }

        if !outcome.errors.is_empty() {
            let count = u64::try_from(outcome.errors.len()).unwrap_or(0);
            counter!(names::RECONCILE_ERRORS_TOTAL).increment(count);
        }
        tracing::info!(
            activated = outcome.activated.len(),
            expired = outcome.expired.len(),
            errors = outcome.errors.len(),
            "reconciliation run finished"
        );

        outcome
    }

    /// Returns the transient history of recently-expired campaigns,
    /// newest last, capped at [`RECENTLY_EXPIRED_CAP`].
    ///
    /// # Errors
    ///
    /// Returns an error if the history lock is poisoned.
    pub fn recently_expired(&self) -> Result<Vec<ExpiredNotice>> {
        Ok(self
            .recently_expired
            .read()
            .map_err(poison_err)?
            .iter()
            .cloned()
            .collect())
    }

    // --- internals ---

    /// Loads a live (non-deleted) campaign or fails with not-found.
    async fn load(&self, campaign_id: CampaignId) -> Result<Campaign> {
        self.get(campaign_id)
            .await?
            .ok_or(Error::CampaignNotFound { campaign_id })
    }

    /// The critical section of the reconciliation loop.
    async fn reconcile_tick(&self) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let now = self.clock.now();

        match self.store.list_by_status(CampaignStatus::Scheduled).await {
            Ok(scheduled) => {
                for campaign in scheduled {
                    let Ok(campaign_id) = persisted_id(&campaign) else {
                        continue;
                    };
                    if campaign.end_has_passed(now) {
                        // Already over: expire directly, never activate first.
                        match self
                            .expire(campaign_id, TransitionContext::auto_expired())
                            .await
                        {
                            Ok(_) => outcome.expired.push(campaign_id),
                            Err(error) => outcome
                                .errors
                                .push(format!("expire {campaign_id}: {error}")),
                        }
                    } else if campaign.start_has_passed(now) {
                        match self
                            .activate(campaign_id, TransitionContext::auto_scheduled())
                            .await
                        {
                            Ok(_) => outcome.activated.push(campaign_id),
                            Err(error) => outcome
                                .errors
                                .push(format!("activate {campaign_id}: {error}")),
                        }
                    }
                }
            }
            Err(error) => outcome
                .errors
                .push(format!("listing scheduled campaigns: {error}")),
        }

        for status in [CampaignStatus::Active, CampaignStatus::Paused] {
            match self.store.list_by_status(status).await {
                Ok(rows) => {
                    for campaign in rows {
                        let Ok(campaign_id) = persisted_id(&campaign) else {
                            continue;
                        };
                        if campaign.end_has_passed(now) {
                            match self
                                .expire(campaign_id, TransitionContext::auto_expired())
                                .await
                            {
                                Ok(_) => outcome.expired.push(campaign_id),
                                Err(error) => outcome
                                    .errors
                                    .push(format!("expire {campaign_id}: {error}")),
                            }
                        }
                    }
                }
                Err(error) => outcome
                    .errors
                    .push(format!("listing {status} campaigns: {error}")),
            }
        }

        outcome
    }

    /// Shared commit path for status changes: legality re-check, state
    /// manager transition, versioned save with benign-race detection, and
    /// the status-changed event. The flag reports whether this call
    /// actually changed anything (false for an already-in-target no-op),
    /// so callers do not re-fire per-status side effects.
    async fn change_campaign_status(
        &self,
        campaign_id: CampaignId,
        target: CampaignStatus,
        context: TransitionContext,
    ) -> Result<(Campaign, bool)> {
        let campaign = self.load(campaign_id).await?;

        if campaign.status == target {
            return Ok((campaign, false));
        }
        // Defense in depth alongside the state manager's own check.
        if !campaign.status.can_transition_to(target) {
            return Err(Error::invalid_transition(
                campaign.status,
                target,
                "no edge in transition table",
            ));
        }

        let campaign = self.commit_transition(campaign, target, context).await?;
        Ok((campaign, true))
    }

    /// Runs the state-manager transition and persists it, resolving the
    /// benign concurrent-writer race by re-reading.
    async fn commit_transition(
        &self,
        mut campaign: Campaign,
        target: CampaignStatus,
        context: TransitionContext,
    ) -> Result<Campaign> {
        let campaign_id = persisted_id(&campaign)?;
        let from = campaign.status;

        self.state.transition(&mut campaign, target, context).await?;

        match self.store.save(&mut campaign).await {
            Ok(()) => {}
            Err(error) if is_version_conflict(&error) => {
                let fresh = self.load(campaign_id).await?;
                if fresh.status == target {
                    // Another process already made this exact change; the
                    // side effects fired here are idempotent, so this is
                    // success, not failure.
                    tracing::info!(%campaign_id, %target, "concurrent transition detected; treating as success");
                    return Ok(fresh);
                }
                return Err(error);
            }
            Err(error) => return Err(error),
        }

        counter!(
            names::TRANSITIONS_TOTAL,
            labels::FROM => from.to_string(),
            labels::TO => target.to_string(),
            labels::REASON => context.reason.to_string(),
        )
        .increment(1);

        self.publish(LifecycleEvent::StatusChanged {
            campaign_id,
            from,
            to: target,
            reason: context.reason,
        });

        Ok(campaign)
    }

    /// Resolves the product selection via the external selector and
    /// records the compilation bookkeeping on the entity.
    async fn compile_products(&self, campaign: &mut Campaign) -> Result<()> {
        let resolved = self.selector.resolve(campaign).await?;
        let method = match campaign.selection {
            SelectionType::RandomProducts => CompilationMethod::Random,
            SelectionType::SmartSelection => CompilationMethod::Smart,
            SelectionType::AllProducts | SelectionType::SpecificProducts => {
                CompilationMethod::Conditions
            }
        };
        let count = resolved.len();
        campaign.product_ids = resolved;
        campaign.mark_compiled(method, self.clock.now());
        tracing::debug!(campaign_id = ?campaign.id, %method, count, "product selection compiled");
        Ok(())
    }

    /// Activation readiness: a configured discount and some way of
    /// choosing products (explicit targeting, a dynamic selection the
    /// selector will resolve, or filter conditions).
    fn validate_activation_readiness(&self, campaign: &Campaign) -> Result<()> {
        if !campaign.discount.is_configured() {
            return Err(Error::validation(
                "cannot activate: discount type and value are not configured",
            ));
        }
        if !campaign.has_product_targeting()
            && !campaign.selection.is_dynamic()
            && campaign.conditions.is_empty()
        {
            return Err(Error::validation(
                "cannot activate: campaign targets no products",
            ));
        }
        Ok(())
    }

    /// Finds a free slug by suffixing `-2`, `-3`, ... to the base.
    async fn unique_slug(&self, base: &str) -> Result<String> {
        if !self.store.slug_exists(base).await? {
            return Ok(base.to_string());
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.store.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Produces the "Name (Copy)" / "Name (Copy 2)" name for a duplicate,
    /// together with its free slug.
    async fn copy_name_and_slug(&self, source_name: &str) -> Result<(String, String)> {
        let mut candidate = format!("{source_name} (Copy)");
        let mut n = 2u32;
        loop {
            let slug = slugify(&candidate);
            if !self.store.slug_exists(&slug).await? {
                return Ok((candidate, slug));
            }
            candidate = format!("{source_name} (Copy {n})");
            n += 1;
        }
    }

    /// Pushes one notice into the capped recently-expired history.
    fn record_expired(&self, campaign: &Campaign) -> Result<()> {
        let Some(campaign_id) = campaign.id else {
            return Ok(());
        };
        let mut history = self.recently_expired.write().map_err(poison_err)?;
        history.push_back(ExpiredNotice {
            campaign_id,
            name: campaign.name.clone(),
            expired_at: self.clock.now(),
        });
        while history.len() > RECENTLY_EXPIRED_CAP {
            history.pop_front();
        }
        Ok(())
    }

    /// Clears every job kind for a campaign (delete paths).
    async fn clear_all_jobs(&self, campaign_id: CampaignId) {
        for kind in [
            JobKind::Activate,
            JobKind::Deactivate,
            JobKind::EndingSoon,
            JobKind::RotateProducts,
        ] {
            if let Err(error) = self.jobs.unschedule(kind, campaign_id).await {
                tracing::warn!(%campaign_id, %kind, %error, "failed to clear job");
            }
        }
    }

    /// Publishes a lifecycle event with the current timestamp.
    fn publish(&self, event: LifecycleEvent) {
        self.events
            .publish(EventRecord::new(event, self.clock.now()));
    }
}

/// Extracts the numeric ID of a persisted campaign.
fn persisted_id(campaign: &Campaign) -> Result<CampaignId> {
    campaign.id.ok_or(Error::Core(promo_core::Error::Internal {
        message: "campaign has no store-assigned ID".into(),
    }))
}

/// Returns true for the optimistic-concurrency conflict raised by
/// [`CampaignStore::save`].
fn is_version_conflict(error: &Error) -> bool {
    matches!(
        error,
        Error::Core(promo_core::Error::PreconditionFailed { .. })
    )
}
