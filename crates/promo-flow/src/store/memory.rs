//! In-memory campaign store implementation for testing.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, single process only
//! - **Version semantics match production**: version-match-on-write is
//!   enforced exactly as a SQL implementation would, so concurrency tests
//!   against this store are meaningful

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use promo_core::{CampaignId, Error as CoreError};

use super::CampaignStore;
use crate::campaign::{Campaign, CampaignStatus};
use crate::error::{Error, Result};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("campaign store lock poisoned")
}

/// In-memory campaign store for testing.
#[derive(Debug, Default)]
pub struct MemoryCampaignStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<CampaignId, Campaign>,
    next_id: u64,
}

impl MemoryCampaignStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows (including soft-deleted ones).
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poison_err)?.rows.len())
    }

    /// Returns true if the store holds no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn find(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Campaign>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.rows.values().find(|c| c.uuid == uuid).cloned())
    }

    async fn save(&self, campaign: &mut Campaign) -> Result<()> {
        let mut inner = self.inner.write().map_err(poison_err)?;

        match campaign.id {
            None => {
                inner.next_id += 1;
                let id = CampaignId::new(inner.next_id);
                campaign.id = Some(id);
                campaign.version = 1;
                inner.rows.insert(id, campaign.clone());
                Ok(())
            }
            Some(id) => {
                let Some(stored) = inner.rows.get(&id) else {
                    return Err(Error::CampaignNotFound { campaign_id: id });
                };
                if stored.version != campaign.version {
                    return Err(Error::Core(CoreError::PreconditionFailed {
                        message: format!(
                            "campaign {id} version conflict: stored {stored}, saving {saving}",
                            stored = stored.version,
                            saving = campaign.version,
                        ),
                    }));
                }
                campaign.version += 1;
                inner.rows.insert(id, campaign.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, id: CampaignId) -> Result<bool> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        Ok(inner.rows.remove(&id).is_some())
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let inner = self.inner.read().map_err(poison_err)?;
        let mut rows: Vec<Campaign> = inner
            .rows
            .values()
            .filter(|c| c.status == status && !c.is_deleted())
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner
            .rows
            .values()
            .any(|c| c.slug == slug && !c.is_deleted()))
    }
}
