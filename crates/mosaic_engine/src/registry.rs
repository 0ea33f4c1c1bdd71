use std::sync::Arc;

use mosaic_core::{
    CandidateResult, CanonicalMedia, ContentItem, MediaFormat, MediaInfo, PageData,
    ProviderDescriptor, ProviderRole, Seasonal,
};
use mosaic_logging::mosaic_debug;

use crate::challenge::ChallengePolicy;
use crate::config::ResolveSettings;
use crate::dedupe::InflightCache;
use crate::dispatch::Dispatcher;
use crate::governor::Governor;
use crate::provider::{Provider, ProviderClient, ProviderError, SearchQuery};

type MediaLookup = Result<Option<MediaInfo>, ProviderError>;

/// A registered provider together with its client, rank, and by-id lookup cache.
pub struct ProviderHandle {
    provider: Arc<dyn Provider>,
    client: Arc<ProviderClient>,
    role: ProviderRole,
    rank: usize,
    media_cache: InflightCache<String, MediaLookup>,
    resolution: ChallengePolicy,
    listing: ChallengePolicy,
}

impl ProviderHandle {
    pub fn id(&self) -> &str {
        &self.client.descriptor().id
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        self.client.descriptor()
    }

    pub fn role(&self) -> ProviderRole {
        self.role
    }

    /// Registration order across the whole registry; lower wins ties.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn client(&self) -> &Arc<ProviderClient> {
        &self.client
    }

    /// By-id lookup. Concurrent and repeated calls for one id share a single request;
    /// failed lookups are dropped from the cache so a later call retries.
    pub async fn get_media(&self, id: &str) -> MediaLookup {
        let provider = self.provider.clone();
        let client = self.client.clone();
        let policy = self.resolution;
        let key = id.to_string();
        let lookup_id = key.clone();
        self.media_cache
            .get_or_start_unless(
                key,
                move || async move {
                    policy
                        .run("get_media", || provider.get_media(&client, &lookup_id))
                        .await
                },
                |outcome| outcome.is_err(),
            )
            .await
    }

    pub fn forget_media(&self, id: &str) -> bool {
        self.media_cache.invalidate(&id.to_string())
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError> {
        self.resolution
            .run("search", || self.provider.search(&self.client, query))
            .await
    }

    pub async fn search_advanced(&self, query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError> {
        self.resolution
            .run("search_advanced", || self.provider.search_advanced(&self.client, query))
            .await
    }

    pub async fn info(&self, media: &CanonicalMedia) -> MediaLookup {
        self.resolution
            .run("info", || self.provider.info(&self.client, media))
            .await
    }

    pub async fn fetch_seasonal(&self) -> Result<Option<Seasonal>, ProviderError> {
        self.resolution
            .run("fetch_seasonal", || self.provider.fetch_seasonal(&self.client))
            .await
    }

    pub async fn fetch_content_page(&self, id: &str, page: u32) -> Result<Vec<ContentItem>, ProviderError> {
        self.listing
            .run("fetch_content_page", || {
                self.provider.fetch_content_page(&self.client, id, page)
            })
            .await
    }

    pub async fn fetch_pages(&self, content_id: &str) -> Result<Option<PageData>, ProviderError> {
        self.listing
            .run("fetch_pages", || self.provider.fetch_pages(&self.client, content_id))
            .await
    }

    pub async fn proxy_check(&self, proxy: &str) -> bool {
        self.provider.proxy_check(&self.client, proxy).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("provider {id} is already registered as {role:?}")]
    Duplicate { id: String, role: ProviderRole },
}

/// Providers grouped by role, kept in registration order.
pub struct ProviderRegistry {
    handles: Vec<Arc<ProviderHandle>>,
    dispatcher: Arc<Dispatcher>,
    governor: Arc<Governor>,
    resolution: ChallengePolicy,
    listing: ChallengePolicy,
}

impl ProviderRegistry {
    pub fn new(dispatcher: Arc<Dispatcher>, governor: Arc<Governor>, settings: &ResolveSettings) -> Self {
        Self {
            handles: Vec::new(),
            dispatcher,
            governor,
            resolution: settings.resolution_policy(),
            listing: settings.listing_policy(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    pub fn register(
        &mut self,
        role: ProviderRole,
        provider: Arc<dyn Provider>,
    ) -> Result<Arc<ProviderHandle>, RegistryError> {
        let descriptor = provider.descriptor().clone();
        if self.get(role, &descriptor.id).is_some() {
            return Err(RegistryError::Duplicate {
                id: descriptor.id,
                role,
            });
        }
        mosaic_debug!("Registered {} as {:?} provider", descriptor.id, role);
        let client = Arc::new(ProviderClient::new(
            descriptor,
            self.dispatcher.clone(),
            self.governor.clone(),
        ));
        let handle = Arc::new(ProviderHandle {
            provider,
            client,
            role,
            rank: self.handles.len(),
            media_cache: InflightCache::new(),
            resolution: self.resolution,
            listing: self.listing,
        });
        self.handles.push(handle.clone());
        Ok(handle)
    }

    pub fn get(&self, role: ProviderRole, id: &str) -> Option<Arc<ProviderHandle>> {
        self.handles
            .iter()
            .find(|handle| handle.role == role && handle.id() == id)
            .cloned()
    }

    /// First registration of `id` in any role.
    pub fn find(&self, id: &str) -> Option<Arc<ProviderHandle>> {
        self.handles.iter().find(|handle| handle.id() == id).cloned()
    }

    pub fn by_role(&self, role: ProviderRole) -> Vec<Arc<ProviderHandle>> {
        self.handles
            .iter()
            .filter(|handle| handle.role == role)
            .cloned()
            .collect()
    }

    /// Providers of `role` supporting at least one of `formats`.
    pub fn eligible(&self, role: ProviderRole, formats: &[MediaFormat]) -> Vec<Arc<ProviderHandle>> {
        self.handles
            .iter()
            .filter(|handle| handle.role == role && handle.descriptor().supports_any(formats))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[Arc<ProviderHandle>] {
        &self.handles
    }
}
