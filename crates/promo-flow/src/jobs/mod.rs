//! One-shot job scheduling abstraction.
//!
//! This module provides:
//!
//! - [`JobQueue`]: Trait for registering one-shot jobs with an external
//!   job-scheduling facility
//! - [`ScheduledJob`]: One registered job
//! - [`MemoryJobQueue`]: In-memory queue for testing
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: Same interface for a cron-backed action queue,
//!   Cloud Tasks, or a local runner
//! - **Clear-then-set**: callers always unschedule before re-registering,
//!   so repeated scheduling is idempotent regardless of interleaving
//! - **Jobs fire elsewhere**: the queue only persists registrations; an
//!   external runner invokes the engine's handlers at the scheduled moment

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use promo_core::CampaignId;

use crate::error::Result;

/// The kinds of one-shot jobs the engine registers per campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Flip a scheduled/draft campaign to active at its start date.
    Activate,
    /// Expire a campaign at its end date.
    Deactivate,
    /// Notify that a campaign ends within 24 hours.
    EndingSoon,
    /// Re-draw a random product selection.
    RotateProducts,
}

impl JobKind {
    /// Returns the hook name the external job runner dispatches on.
    #[must_use]
    pub const fn as_hook_name(&self) -> &'static str {
        match self {
            Self::Activate => "scd_activate_campaign",
            Self::Deactivate => "scd_deactivate_campaign",
            Self::EndingSoon => "scd_campaign_ending_soon",
            Self::RotateProducts => "scd_rotate_campaign_products",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_hook_name())
    }
}

/// A queue-assigned job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered one-shot job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// What the job does when it fires.
    pub kind: JobKind,
    /// The campaign the job acts on.
    pub campaign_id: CampaignId,
    /// When the job fires (UTC).
    pub fire_at: DateTime<Utc>,
}

/// One-shot job registration seam.
///
/// Registrations are matched for removal by `(kind, campaign_id)`, the same
/// identity the external runner uses for dispatch.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Registers a one-shot job.
    ///
    /// Returns `None` if the facility refused the registration; callers
    /// treat that as non-fatal (the reconciliation loop is the fallback).
    async fn schedule_single(
        &self,
        fire_at: DateTime<Utc>,
        kind: JobKind,
        campaign_id: CampaignId,
    ) -> Result<Option<JobId>>;

    /// Removes every registration matching `(kind, campaign_id)`.
    ///
    /// Idempotent; a no-op when nothing matches.
    async fn unschedule(&self, kind: JobKind, campaign_id: CampaignId) -> Result<()>;

    /// Returns all live registrations for a campaign, in registration order.
    async fn jobs_for(&self, campaign_id: CampaignId) -> Result<Vec<ScheduledJob>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_are_stable() {
        assert_eq!(JobKind::Activate.as_hook_name(), "scd_activate_campaign");
        assert_eq!(
            JobKind::Deactivate.as_hook_name(),
            "scd_deactivate_campaign"
        );
        assert_eq!(
            JobKind::EndingSoon.as_hook_name(),
            "scd_campaign_ending_soon"
        );
        assert_eq!(
            JobKind::RotateProducts.as_hook_name(),
            "scd_rotate_campaign_products"
        );
    }
}
