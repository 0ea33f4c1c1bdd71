use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use futures_util::future::join_all;
use mosaic_core::{CanonicalMedia, ContentListing, DateWindow, PageAccumulator, PageData, ProviderRole};
use mosaic_logging::{mosaic_debug, mosaic_warn};

use crate::config::ResolveSettings;
use crate::provider::ProviderError;
use crate::registry::{ProviderHandle, ProviderRegistry};

/// Walks paginated episode/chapter listings of every mapped content provider.
pub struct ContentFetcher {
    registry: Arc<ProviderRegistry>,
    settings: ResolveSettings,
}

impl ContentFetcher {
    pub fn new(registry: Arc<ProviderRegistry>, settings: ResolveSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The window around the media's airing or publishing dates that listing items must fall into.
    pub fn window_for(&self, media: &CanonicalMedia) -> DateWindow {
        DateWindow::new(
            media.info.start_date,
            media.info.end_date,
            ChronoDuration::days(self.settings.date_tolerance_days),
        )
    }

    /// Fetch pages from 1 until a page is empty, adds nothing new, or the page cap is hit.
    ///
    /// A failure on the first page is an error; later failures keep what was collected.
    pub async fn fetch_listing(
        &self,
        handle: &ProviderHandle,
        external_id: &str,
        window: &DateWindow,
    ) -> Result<ContentListing, ProviderError> {
        let mut accumulator = PageAccumulator::new();
        for page in 1..=self.settings.max_content_pages.max(1) {
            let items = match handle.fetch_content_page(external_id, page).await {
                Ok(items) => items,
                Err(err) if accumulator.is_empty() => return Err(err),
                Err(err) => {
                    mosaic_warn!(
                        "{} page {} of {} failed, keeping {} items: {}",
                        handle.id(),
                        page,
                        external_id,
                        accumulator.len(),
                        err
                    );
                    break;
                }
            };
            if items.is_empty() {
                break;
            }
            if accumulator.absorb(items) == 0 {
                mosaic_debug!("{} page {} of {} repeated earlier items", handle.id(), page, external_id);
                break;
            }
        }

        let mut items = accumulator.into_sorted();
        window.retain(&mut items);
        Ok(ContentListing {
            provider_id: handle.id().to_string(),
            items,
        })
    }

    /// Listings from every content provider mapped for `media`. Providers that fail
    /// contribute nothing. A missing total is filled from the longest listing.
    pub async fn fetch_all(&self, media: &mut CanonicalMedia) -> Vec<ContentListing> {
        let window = self.window_for(media);
        let handles: Vec<(Arc<ProviderHandle>, String)> = self
            .registry
            .by_role(ProviderRole::Content)
            .into_iter()
            .filter_map(|handle| {
                let external = media.mapping_for(handle.id())?.external_id.clone();
                Some((handle, external))
            })
            .collect();

        let results = join_all(handles.iter().map(|(handle, external)| {
            let window = &window;
            async move { (handle, self.fetch_listing(handle, external, window).await) }
        }))
        .await;

        let mut listings = Vec::new();
        for (handle, result) in results {
            match result {
                Ok(listing) if !listing.items.is_empty() => listings.push(listing),
                Ok(_) => {}
                Err(err) => mosaic_warn!("{} listing for {} failed: {}", handle.id(), media.id, err),
            }
        }

        let longest = listings.iter().map(|listing| listing.items.len()).max();
        if let Some(longest) = longest.and_then(|n| u32::try_from(n).ok()) {
            let total = match media.media_type {
                mosaic_core::MediaType::Anime => &mut media.info.total_episodes,
                mosaic_core::MediaType::Manga => &mut media.info.total_chapters,
            };
            if total.is_none() {
                *total = Some(longest);
            }
        }
        listings
    }

    /// Readable content (images, text, or streams) for one listing item.
    pub async fn fetch_pages(&self, provider_id: &str, content_id: &str) -> Result<Option<PageData>, ProviderError> {
        let Some(handle) = self.registry.get(ProviderRole::Content, provider_id) else {
            return Ok(None);
        };
        handle.fetch_pages(content_id).await
    }
}
