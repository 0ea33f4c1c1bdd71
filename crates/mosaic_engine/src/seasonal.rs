use std::collections::HashMap;
use std::sync::Arc;

use mosaic_core::MediaInfo;
use mosaic_logging::{mosaic_info, mosaic_warn};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;
use crate::registry::ProviderRegistry;
use crate::scatter::scatter_gather;

/// Trending, seasonal, popular, and top lists with full records in list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonalMedia {
    pub trending: Vec<MediaInfo>,
    pub seasonal: Vec<MediaInfo>,
    pub popular: Vec<MediaInfo>,
    pub top: Vec<MediaInfo>,
}

impl SeasonalMedia {
    pub fn len(&self) -> usize {
        self.trending.len() + self.seasonal.len() + self.popular.len() + self.top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SeasonalRefresher {
    registry: Arc<ProviderRegistry>,
    batch_size: usize,
}

impl SeasonalRefresher {
    pub fn new(registry: Arc<ProviderRegistry>, batch_size: usize) -> Self {
        Self { registry, batch_size }
    }

    /// Fetch the provider's seasonal id lists and look each distinct id up once.
    /// Ids whose lookup fails or finds nothing are left out of the lists.
    pub async fn refresh(&self, provider_id: &str) -> Result<SeasonalMedia, ProviderError> {
        let Some(handle) = self.registry.find(provider_id) else {
            return Err(ProviderError::Unsupported("fetch_seasonal"));
        };
        let Some(seasonal) = handle.fetch_seasonal().await? else {
            return Ok(SeasonalMedia::default());
        };

        let lookups = scatter_gather(seasonal.unique_ids(), self.batch_size, |id| {
            let handle = handle.clone();
            async move {
                let result = handle.get_media(&id).await;
                (id, result)
            }
        })
        .await;

        let mut found = HashMap::new();
        for (id, result) in lookups {
            match result {
                Ok(Some(info)) => {
                    found.insert(id, info);
                }
                Ok(None) => {}
                Err(err) => mosaic_warn!("Seasonal lookup of {} on {} failed: {}", id, provider_id, err),
            }
        }

        let pick = |ids: &[String]| -> Vec<MediaInfo> {
            ids.iter().filter_map(|id| found.get(id).cloned()).collect()
        };
        let media = SeasonalMedia {
            trending: pick(&seasonal.trending),
            seasonal: pick(&seasonal.seasonal),
            popular: pick(&seasonal.popular),
            top: pick(&seasonal.top),
        };
        mosaic_info!("Refreshed {} seasonal entries from {}", media.len(), provider_id);
        Ok(media)
    }
}
