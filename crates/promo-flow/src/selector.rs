//! Product selection seam.
//!
//! Resolving a dynamic selection (random sample, smart scoring, condition
//! filters) requires the product catalog, which lives outside this engine.
//! The manager only invokes the selector at activation time and persists
//! the result; the selection logic itself is the implementation's concern.

use async_trait::async_trait;

use crate::campaign::Campaign;
use crate::error::Result;

/// Resolves a campaign's dynamic selection into concrete product IDs.
#[async_trait]
pub trait ProductSelector: Send + Sync {
    /// Returns the product IDs the campaign should target right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be consulted; the caller
    /// treats this as an activation failure for dynamic selections.
    async fn resolve(&self, campaign: &Campaign) -> Result<Vec<u64>>;
}

/// Selector returning a fixed list, for tests and static deployments.
#[derive(Debug, Clone, Default)]
pub struct FixedSelector {
    product_ids: Vec<u64>,
}

impl FixedSelector {
    /// Creates a selector that always resolves to `product_ids`.
    #[must_use]
    pub fn new(product_ids: Vec<u64>) -> Self {
        Self { product_ids }
    }
}

#[async_trait]
impl ProductSelector for FixedSelector {
    async fn resolve(&self, _campaign: &Campaign) -> Result<Vec<u64>> {
        Ok(self.product_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignSpec, SelectionType};
    use chrono::Utc;

    #[tokio::test]
    async fn fixed_selector_returns_configured_list() {
        let selector = FixedSelector::new(vec![11, 12]);
        let campaign = Campaign::from_spec(
            CampaignSpec {
                name: "Lucky Dip".into(),
                selection: SelectionType::RandomProducts,
                ..CampaignSpec::default()
            },
            Utc::now(),
        )
        .unwrap();

        let resolved = selector.resolve(&campaign).await.unwrap();
        assert_eq!(resolved, vec![11, 12]);
    }
}
