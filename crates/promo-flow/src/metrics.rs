//! Observability metrics for the campaign engine.
//!
//! Metrics are exposed via the `metrics` crate facade; the host decides
//! which exporter to install.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `promo_transitions_total` | Counter | `from`, `to`, `reason` | Status transitions committed |
//! | `promo_campaigns_activated_total` | Counter | `reason` | Campaigns activated |
//! | `promo_campaigns_expired_total` | Counter | `reason` | Campaigns expired |
//! | `promo_reconcile_runs_total` | Counter | - | Reconciliation loop entries |
//! | `promo_reconcile_skipped_total` | Counter | `reason` | Reconciliation runs skipped |
//! | `promo_reconcile_errors_total` | Counter | - | Per-campaign reconciliation failures |

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Status transitions committed.
    pub const TRANSITIONS_TOTAL: &str = "promo_transitions_total";
    /// Counter: Campaigns activated.
    pub const CAMPAIGNS_ACTIVATED_TOTAL: &str = "promo_campaigns_activated_total";
    /// Counter: Campaigns expired.
    pub const CAMPAIGNS_EXPIRED_TOTAL: &str = "promo_campaigns_expired_total";
    /// Counter: Reconciliation loop entries.
    pub const RECONCILE_RUNS_TOTAL: &str = "promo_reconcile_runs_total";
    /// Counter: Reconciliation runs skipped.
    pub const RECONCILE_SKIPPED_TOTAL: &str = "promo_reconcile_skipped_total";
    /// Counter: Per-campaign reconciliation failures.
    pub const RECONCILE_ERRORS_TOTAL: &str = "promo_reconcile_errors_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Previous status (for transitions).
    pub const FROM: &str = "from";
    /// Target status (for transitions).
    pub const TO: &str = "to";
    /// Transition reason (manual, auto_scheduled, auto_expired).
    pub const REASON: &str = "reason";
}
