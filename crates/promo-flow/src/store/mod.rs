//! Pluggable persistence for campaigns.
//!
//! The [`CampaignStore`] trait defines the persistence layer for campaign
//! rows. SQL details are the implementation's concern; the engine only
//! needs identity assignment, status-filtered queries, and optimistic
//! concurrency on writes.
//!
//! ## Optimistic concurrency
//!
//! Every campaign carries a `version` counter. [`CampaignStore::save`]
//! must reject a write whose in-memory version does not match the stored
//! row (`PreconditionFailed`) and bump the version on success. Because
//! every status change also bumps the version, this gives the manager a
//! compare-and-swap on status: the loser of a concurrent activation gets a
//! conflict, re-reads, and finds the row already active.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use promo_core::CampaignId;

use crate::campaign::{Campaign, CampaignStatus};
use crate::error::Result;

/// Storage abstraction for campaign rows.
///
/// Implementations must provide:
/// - Identity assignment on first save
/// - Version-match-on-write with version bump on success
/// - Status-filtered queries that exclude soft-deleted rows
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from the
/// manager and the external job runner.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Gets a campaign by store-assigned ID.
    ///
    /// Returns `None` if the campaign does not exist. Soft-deleted rows
    /// are still returned here; callers filter where it matters.
    async fn find(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// Gets a campaign by its stable UUID.
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Campaign>>;

    /// Saves a campaign (insert or update).
    ///
    /// On first save the store assigns the numeric ID and sets `version`
    /// to 1, writing both back into `campaign`. On update the stored
    /// version must match `campaign.version`; the version is bumped on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` on a version conflict (concurrent
    /// modification) and `CampaignNotFound` when updating a row that was
    /// hard-deleted.
    async fn save(&self, campaign: &mut Campaign) -> Result<()>;

    /// Hard-deletes a campaign row.
    ///
    /// Returns `true` if a row was removed. Soft delete is an ordinary
    /// `save` with `deleted_at` set.
    async fn delete(&self, id: CampaignId) -> Result<bool>;

    /// Returns all non-deleted campaigns in the given status.
    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Returns true if a non-deleted campaign already uses this slug.
    async fn slug_exists(&self, slug: &str) -> Result<bool>;
}
