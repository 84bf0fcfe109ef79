//! # promo-flow
//!
//! Campaign lifecycle orchestration for the Promo discount-campaign engine.
//!
//! This crate implements the campaign domain:
//!
//! - **Campaign entity**: configuration + status as pure data with
//!   invariant-preserving operations
//! - **State machine**: one transition table and one authority
//!   ([`state::StateManager`]) for every status change and its side effects
//! - **Event scheduler**: precise one-shot activate/deactivate timers,
//!   idempotent under re-scheduling
//! - **Reconciliation loop**: the lock-guarded safety net that catches
//!   missed or delayed timers
//! - **Occurrence cache**: pre-computed recurrence windows for an external
//!   materializer
//!
//! ## Guarantees
//!
//! - No two processes double-activate a campaign: status commits are
//!   versioned writes, and the reconciliation loop runs under a TTL lock
//! - An expired campaign never re-activates: the transition table has no
//!   such edge, and terminal statuses never hold future timers
//! - Scheduled work is idempotent under retries and downtime: timers are
//!   clear-then-set, events carry structural idempotency keys, and the
//!   safety net re-checks rather than assumes
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use promo_core::{MemoryTransientStore, SystemClock};
//! use promo_flow::campaign::CampaignSpec;
//! use promo_flow::error::Result;
//! use promo_flow::events::{MemorySink, NoopHooks};
//! use promo_flow::jobs::memory::MemoryJobQueue;
//! use promo_flow::manager::CampaignManager;
//! use promo_flow::selector::FixedSelector;
//! use promo_flow::store::memory::MemoryCampaignStore;
//!
//! # async fn demo() -> Result<()> {
//! let clock = Arc::new(SystemClock);
//! let manager = CampaignManager::new(
//!     Arc::new(MemoryCampaignStore::new()),
//!     Arc::new(MemoryJobQueue::new()),
//!     Arc::new(MemoryTransientStore::new(clock.clone())),
//!     clock,
//!     Arc::new(MemorySink::new()),
//!     Arc::new(NoopHooks),
//!     Arc::new(FixedSelector::new(vec![])),
//! );
//!
//! let _campaign = manager
//!     .create(CampaignSpec {
//!         name: "Summer Sale".into(),
//!         ..CampaignSpec::default()
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod campaign;
pub mod error;
pub mod events;
pub mod jobs;
pub mod manager;
pub mod metrics;
pub mod occurrence;
pub mod scheduler;
pub mod selector;
pub mod state;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::campaign::{
        Campaign, CampaignSpec, CampaignStatus, CampaignUpdate, CompilationMethod, Condition,
        ConditionsLogic, DiscountConfig, DiscountType, RecurrenceEnd, RecurrencePattern,
        RecurringConfig, ScheduleTime, SelectionType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::events::{
        EventRecord, EventSink, LifecycleEvent, LifecycleHooks, MemorySink, NoopHooks, NullSink,
        TransitionReason,
    };
    pub use crate::jobs::{JobKind, JobQueue, ScheduledJob, memory::MemoryJobQueue};
    pub use crate::manager::{
        CampaignManager, ExpiredNotice, ReconcileOutcome, SkipReason,
    };
    pub use crate::occurrence::{
        MemoryOccurrenceStore, Occurrence, OccurrenceCache, OccurrenceStatus, OccurrenceStore,
        ParentSchedule,
    };
    pub use crate::scheduler::EventScheduler;
    pub use crate::selector::{FixedSelector, ProductSelector};
    pub use crate::state::{StateManager, TransitionContext};
    pub use crate::store::{CampaignStore, memory::MemoryCampaignStore};
}
