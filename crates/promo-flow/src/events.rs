//! Lifecycle events and hooks.
//!
//! Status changes are the only way lifecycle side effects fire, and every
//! side effect is reachable from here: a closed [`LifecycleEvent`] enum
//! published to an [`EventSink`], plus [`LifecycleHooks`] callbacks around
//! each transition. Listeners are discoverable and testable in isolation
//! because the event set is a tagged union, not free-form strings.
//!
//! ## Idempotency
//!
//! Events carry an `idempotency_key` derived from the event's identity
//! (name, campaign, target status), not from the envelope instance. Two
//! envelopes for the same logical event share a key, so consumers can
//! deduplicate when a benign activation race fires a hook twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use promo_core::{ActorId, CampaignId};

use crate::campaign::{Campaign, CampaignStatus};
use crate::state::TransitionContext;

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// A human actor asked for the change.
    Manual,
    /// The reconciliation loop or a fired timer started the campaign.
    AutoScheduled,
    /// The reconciliation loop or a fired timer ended the campaign.
    AutoExpired,
}

impl TransitionReason {
    /// Returns true for system-driven reasons.
    ///
    /// System-driven transitions leave `updated_by` unset; that null is how
    /// downstream code distinguishes automatic from manual changes.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::AutoScheduled | Self::AutoExpired)
    }
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::AutoScheduled => write!(f, "auto_scheduled"),
            Self::AutoExpired => write!(f, "auto_expired"),
        }
    }
}

/// Lifecycle events published by the manager and the state manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum LifecycleEvent {
    /// A campaign started applying discounts. Listeners use this to
    /// trigger product-selection compilation and notifications.
    Activated {
        /// The campaign that activated.
        campaign_id: CampaignId,
    },
    /// A campaign was paused.
    Paused {
        /// The campaign that paused.
        campaign_id: CampaignId,
    },
    /// A campaign expired.
    Expired {
        /// The campaign that expired.
        campaign_id: CampaignId,
    },
    /// A campaign was archived.
    Archived {
        /// The campaign that was archived.
        campaign_id: CampaignId,
    },
    /// Any status change, with the edge that was taken.
    StatusChanged {
        /// The campaign that changed.
        campaign_id: CampaignId,
        /// Status before the change.
        from: CampaignStatus,
        /// Status after the change.
        to: CampaignStatus,
        /// Why the change happened.
        reason: TransitionReason,
    },
    /// The state manager's structured transition record for the external
    /// event bus, including the acting user (if any).
    StateChanged {
        /// The campaign that changed.
        campaign_id: CampaignId,
        /// Status before the change.
        from: CampaignStatus,
        /// Status after the change.
        to: CampaignStatus,
        /// Acting user; `None` for automatic transitions.
        actor: Option<ActorId>,
        /// Why the change happened.
        reason: TransitionReason,
    },
}

impl LifecycleEvent {
    /// Returns the wire name listeners register against.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "scd_campaign_activated",
            Self::Paused { .. } => "scd_campaign_paused",
            Self::Expired { .. } => "scd_campaign_expired",
            Self::Archived { .. } => "scd_campaign_archived",
            Self::StatusChanged { .. } => "scd_campaign_status_changed",
            Self::StateChanged { .. } => "campaign.state_changed",
        }
    }

    /// Returns the campaign this event concerns.
    #[must_use]
    pub const fn campaign_id(&self) -> CampaignId {
        match self {
            Self::Activated { campaign_id }
            | Self::Paused { campaign_id }
            | Self::Expired { campaign_id }
            | Self::Archived { campaign_id }
            | Self::StatusChanged { campaign_id, .. }
            | Self::StateChanged { campaign_id, .. } => *campaign_id,
        }
    }

    /// Returns the deterministic idempotency key for this logical event.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        match self {
            Self::StatusChanged { from, to, .. } | Self::StateChanged { from, to, .. } => {
                format!("{}:{}:{from}:{to}", self.event_name(), self.campaign_id())
            }
            _ => format!("{}:{}", self.event_name(), self.campaign_id()),
        }
    }
}

/// An event plus its envelope metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Unique event identifier (ULID, lexicographically sortable).
    pub id: String,
    /// When the event was published.
    pub occurred_at: DateTime<Utc>,
    /// Deduplication key for the logical event.
    pub idempotency_key: String,
    /// The event payload.
    pub event: LifecycleEvent,
}

impl EventRecord {
    /// Wraps an event with a fresh envelope.
    #[must_use]
    pub fn new(event: LifecycleEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            occurred_at,
            idempotency_key: event.idempotency_key(),
            event,
        }
    }
}

/// A sink for lifecycle events.
///
/// Publication is fire-and-forget: a sink must never fail the caller. Slow
/// or failing consumers are the sink implementation's problem.
pub trait EventSink: Send + Sync {
    /// Publishes one event record.
    fn publish(&self, record: EventRecord);
}

/// Event sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _record: EventRecord) {}
}

/// In-memory sink recording events for assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: std::sync::RwLock<Vec<EventRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all published records in order.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Returns the wire names of all published events in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.records()
            .iter()
            .map(|record| record.event.event_name())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, record: EventRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }
}

/// Callbacks around a status transition.
///
/// `before_transition` runs after guards pass but before the status
/// mutates, so a listener can prepare state; `after_transition` runs once
/// the mutation and its timer side effects are done. Both default to
/// no-ops.
pub trait LifecycleHooks: Send + Sync {
    /// Called before the status mutates.
    fn before_transition(
        &self,
        campaign: &Campaign,
        to: CampaignStatus,
        context: &TransitionContext,
    ) {
        let _ = (campaign, to, context);
    }

    /// Called after the status mutated.
    fn after_transition(
        &self,
        campaign: &Campaign,
        from: CampaignStatus,
        context: &TransitionContext,
    ) {
        let _ = (campaign, from, context);
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_reasons() {
        assert!(TransitionReason::AutoExpired.is_system());
        assert!(TransitionReason::AutoScheduled.is_system());
        assert!(!TransitionReason::Manual.is_system());
    }

    #[test]
    fn event_names_are_stable() {
        let id = CampaignId::new(7);
        assert_eq!(
            LifecycleEvent::Activated { campaign_id: id }.event_name(),
            "scd_campaign_activated"
        );
        assert_eq!(
            LifecycleEvent::StatusChanged {
                campaign_id: id,
                from: CampaignStatus::Scheduled,
                to: CampaignStatus::Active,
                reason: TransitionReason::AutoScheduled,
            }
            .event_name(),
            "scd_campaign_status_changed"
        );
    }

    #[test]
    fn idempotency_key_is_structural() {
        let id = CampaignId::new(7);
        let a = LifecycleEvent::Activated { campaign_id: id };
        let b = LifecycleEvent::Activated { campaign_id: id };
        assert_eq!(a.idempotency_key(), b.idempotency_key());

        let record_a = EventRecord::new(a, Utc::now());
        let record_b = EventRecord::new(b, Utc::now());
        assert_eq!(record_a.idempotency_key, record_b.idempotency_key);
        assert_ne!(record_a.id, record_b.id);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let id = CampaignId::new(7);
        sink.publish(EventRecord::new(
            LifecycleEvent::Activated { campaign_id: id },
            Utc::now(),
        ));
        sink.publish(EventRecord::new(
            LifecycleEvent::Expired { campaign_id: id },
            Utc::now(),
        ));

        assert_eq!(
            sink.event_names(),
            vec!["scd_campaign_activated", "scd_campaign_expired"]
        );
    }
}
