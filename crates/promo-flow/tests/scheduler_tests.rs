//! Event-scheduler tests: idempotent timer registration and fired-event
//! handlers.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use promo_core::{ActorId, CampaignId, ManualClock, MemoryTransientStore};
use promo_flow::campaign::{
    CampaignSpec, CampaignStatus, DiscountConfig, DiscountType, ScheduleTime,
};
use promo_flow::events::{MemorySink, NoopHooks};
use promo_flow::jobs::{JobKind, JobQueue, memory::MemoryJobQueue};
use promo_flow::manager::CampaignManager;
use promo_flow::selector::FixedSelector;
use promo_flow::state::TransitionContext;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

struct Harness {
    clock: Arc<ManualClock>,
    jobs: Arc<MemoryJobQueue>,
    manager: CampaignManager,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(base_time()));
    let jobs = Arc::new(MemoryJobQueue::new());
    let manager = CampaignManager::new(
        Arc::new(promo_flow::store::memory::MemoryCampaignStore::new()),
        jobs.clone(),
        Arc::new(MemoryTransientStore::new(clock.clone())),
        clock.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(NoopHooks),
        Arc::new(FixedSelector::new(vec![101])),
    );
    Harness {
        clock,
        jobs,
        manager,
    }
}

fn twenty_percent() -> DiscountConfig {
    DiscountConfig {
        discount_type: DiscountType::Percentage,
        value: 20.0,
        ..DiscountConfig::default()
    }
}

async fn seed(h: &Harness, status: CampaignStatus, start_h: Option<i64>, end_h: Option<i64>) -> CampaignId {
    h.manager
        .create(CampaignSpec {
            name: "Timed".into(),
            status,
            starts_at: start_h.map(|v| ScheduleTime::Utc(base_time() + Duration::hours(v))),
            ends_at: end_h.map(|v| ScheduleTime::Utc(base_time() + Duration::hours(v))),
            discount: twenty_percent(),
            ..CampaignSpec::default()
        })
        .await
        .unwrap()
        .id
        .unwrap()
}

#[tokio::test]
async fn repeated_scheduling_leaves_exactly_one_timer_of_each_kind() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Scheduled, Some(2), Some(48)).await;
    let scheduler = h.manager.scheduler();

    assert!(scheduler.schedule_campaign_events(id).await.unwrap());
    assert!(scheduler.schedule_campaign_events(id).await.unwrap());
    assert!(scheduler.schedule_campaign_events(id).await.unwrap());

    let jobs = h.jobs.jobs_for(id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(
        jobs.iter().filter(|j| j.kind == JobKind::Activate).count(),
        1
    );
    assert_eq!(
        jobs.iter().filter(|j| j.kind == JobKind::Deactivate).count(),
        1
    );
}

#[tokio::test]
async fn draft_campaigns_get_an_activation_timer_too() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Draft, Some(2), None).await;

    let jobs = h.jobs.jobs_for(id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Activate);
}

#[tokio::test]
async fn past_timestamps_are_never_registered() {
    let h = harness();
    // Start and end both behind the clock.
    let id = seed(&h, CampaignStatus::Draft, None, None).await;
    let scheduler = h.manager.scheduler();

    // Drive the scheduler directly with dates already in the past.
    h.manager
        .update(
            id,
            promo_flow::campaign::CampaignUpdate {
                starts_at: Some(Some(ScheduleTime::Utc(base_time() - Duration::hours(2)))),
                ends_at: Some(Some(ScheduleTime::Utc(base_time() - Duration::hours(1)))),
                ..promo_flow::campaign::CampaignUpdate::default()
            },
            Some(ActorId::new(1)),
        )
        .await
        .unwrap();

    assert!(scheduler.schedule_campaign_events(id).await.unwrap());
    assert!(h.jobs.jobs_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn terminal_statuses_are_a_successful_noop() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Active, None, None).await;
    h.manager
        .expire(id, TransitionContext::manual(ActorId::new(1)))
        .await
        .unwrap();
    let scheduler = h.manager.scheduler();

    assert!(scheduler.schedule_campaign_events(id).await.unwrap());
    assert!(h.jobs.jobs_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_campaign_fails_silently() {
    let h = harness();
    let scheduler = h.manager.scheduler();

    assert!(!scheduler
        .schedule_campaign_events(CampaignId::new(999))
        .await
        .unwrap());
}

#[tokio::test]
async fn clear_campaign_events_is_unconditional_and_idempotent() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Scheduled, Some(2), Some(48)).await;
    let scheduler = h.manager.scheduler();

    scheduler.clear_campaign_events(id).await.unwrap();
    assert!(h.jobs.jobs_for(id).await.unwrap().is_empty());

    // Clearing again is a no-op, not an error.
    scheduler.clear_campaign_events(id).await.unwrap();
}

#[tokio::test]
async fn active_campaigns_keep_their_deactivation_timer_on_reschedule() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Active, None, Some(48)).await;
    let scheduler = h.manager.scheduler();

    assert!(scheduler.schedule_campaign_events(id).await.unwrap());

    let jobs = h.jobs.jobs_for(id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Deactivate);
}

#[tokio::test]
async fn fired_handler_errors_are_swallowed() {
    let h = harness();
    let scheduler = h.manager.scheduler();

    // Unknown campaign: the handler logs and returns instead of crashing
    // the job runner.
    scheduler
        .handle_activation_event(&h.manager, CampaignId::new(999))
        .await;
    scheduler
        .handle_deactivation_event(&h.manager, CampaignId::new(999))
        .await;

    // A deactivation fired against a campaign whose end date moved into
    // the future is refused by the guard and likewise swallowed.
    let id = seed(&h, CampaignStatus::Active, None, Some(48)).await;
    scheduler.handle_deactivation_event(&h.manager, id).await;
    assert_eq!(
        h.manager.get(id).await.unwrap().unwrap().status,
        CampaignStatus::Active
    );
}

#[tokio::test]
async fn fired_activation_is_idempotent_under_retries() {
    let h = harness();
    let id = seed(&h, CampaignStatus::Scheduled, Some(1), Some(48)).await;
    h.clock.advance(Duration::hours(1));
    let scheduler = h.manager.scheduler();

    // The job runner may deliver the same event more than once.
    scheduler.handle_activation_event(&h.manager, id).await;
    scheduler.handle_activation_event(&h.manager, id).await;

    assert_eq!(
        h.manager.get(id).await.unwrap().unwrap().status,
        CampaignStatus::Active
    );
    let jobs = h.jobs.jobs_for(id).await.unwrap();
    assert_eq!(
        jobs.iter().filter(|j| j.kind == JobKind::Deactivate).count(),
        1,
        "retries never duplicate timers"
    );
}
