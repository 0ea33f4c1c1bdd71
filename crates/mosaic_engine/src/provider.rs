use std::sync::Arc;

use mosaic_core::{
    CandidateResult, CanonicalMedia, ContentItem, MediaFormat, MediaInfo, MediaType, PageData,
    ProviderDescriptor, Seasonal,
};
use serde::de::DeserializeOwned;

use crate::challenge::is_challenge;
use crate::dispatch::{DispatchError, Dispatcher, RequestOptions};
use crate::governor::Governor;
use crate::response::Response;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("anti-bot challenge served by {url}")]
    Challenge { url: String },
    #[error("could not parse {what}: {message}")]
    Parse { what: String, message: String },
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
}

impl ProviderError {
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        ProviderError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    pub query: String,
    pub media_type: Option<MediaType>,
    pub formats: Vec<MediaFormat>,
    pub page: u32,
    pub per_page: Option<u32>,
    /// Only honoured by advanced search.
    pub genres: Vec<String>,
    pub genres_excluded: Vec<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            ..Self::default()
        }
    }

    pub fn for_type(mut self, media_type: MediaType, formats: &[MediaFormat]) -> Self {
        self.media_type = Some(media_type);
        self.formats = formats.to_vec();
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_filtered(&self) -> bool {
        !self.genres.is_empty() || !self.genres_excluded.is_empty()
    }
}

/// One external metadata or content source.
///
/// Implementations only translate between the source and the shared model; pacing,
/// proxies, retries, and de-duplication are applied around them by [`ProviderClient`]
/// and the registry. Every operation except [`Provider::descriptor`] is optional.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    async fn search(
        &self,
        _client: &ProviderClient,
        _query: &SearchQuery,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        Ok(Vec::new())
    }

    /// Genre-filtered search. Without filters this is a plain search.
    async fn search_advanced(
        &self,
        client: &ProviderClient,
        query: &SearchQuery,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        if query.is_filtered() {
            return Err(ProviderError::Unsupported("search_advanced"));
        }
        self.search(client, query).await
    }

    /// Fetch a record by this provider's own id. `Ok(None)` when it does not exist.
    async fn get_media(
        &self,
        _client: &ProviderClient,
        _id: &str,
    ) -> Result<Option<MediaInfo>, ProviderError> {
        Ok(None)
    }

    /// Describe an already mapped title. Defaults to a lookup through this provider's mapping.
    async fn info(
        &self,
        client: &ProviderClient,
        media: &CanonicalMedia,
    ) -> Result<Option<MediaInfo>, ProviderError> {
        match media.mapping_for(&self.descriptor().id) {
            Some(mapping) => self.get_media(client, &mapping.external_id).await,
            None => Ok(None),
        }
    }

    async fn fetch_seasonal(&self, _client: &ProviderClient) -> Result<Option<Seasonal>, ProviderError> {
        Ok(None)
    }

    /// One page (1-based) of the episode or chapter listing for an external id.
    async fn fetch_content_page(
        &self,
        _client: &ProviderClient,
        _id: &str,
        _page: u32,
    ) -> Result<Vec<ContentItem>, ProviderError> {
        Ok(Vec::new())
    }

    async fn fetch_pages(
        &self,
        _client: &ProviderClient,
        _content_id: &str,
    ) -> Result<Option<PageData>, ProviderError> {
        Ok(None)
    }

    /// Whether `proxy` can currently reach this provider.
    async fn proxy_check(&self, client: &ProviderClient, proxy: &str) -> bool {
        client.check_proxy(proxy).await
    }
}

/// HTTP access for one provider: governed, proxied, and challenge-aware.
pub struct ProviderClient {
    descriptor: ProviderDescriptor,
    dispatcher: Arc<Dispatcher>,
    governor: Arc<Governor>,
}

impl ProviderClient {
    pub fn new(descriptor: ProviderDescriptor, dispatcher: Arc<Dispatcher>, governor: Arc<Governor>) -> Self {
        Self {
            descriptor,
            dispatcher,
            governor,
        }
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// `path` joined onto the provider's base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.descriptor.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Response, DispatchError> {
        let _permit = self.governor.acquire(&self.descriptor).await;
        let descriptor = &self.descriptor;
        let mut options = options.for_provider(descriptor.provider_type, descriptor.id.clone());
        if options.proxy.is_none() && descriptor.needs_proxy {
            options.proxy = self
                .dispatcher
                .pool()
                .random(descriptor.provider_type, &descriptor.id);
        }
        options.use_translate_proxy |= descriptor.use_translate_proxy;
        self.dispatcher.dispatch(url, options).await
    }

    /// Successful, non-challenge response or the matching error.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, ProviderError> {
        let response = self.request(url, options).await?;
        if is_challenge(&response) {
            return Err(ProviderError::Challenge { url: url.to_string() });
        }
        if !response.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    pub async fn get_html(&self, url: &str, options: RequestOptions) -> Result<String, ProviderError> {
        let response = self.get(url, options).await?;
        response.text().map_err(|err| ProviderError::parse(url, err))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, ProviderError> {
        let response = self.get(url, options).await?;
        response.json().map_err(|err| ProviderError::parse(url, err))
    }

    /// Health-check `proxy` against the provider's base URL.
    pub async fn check_proxy(&self, proxy: &str) -> bool {
        let options = RequestOptions::get().with_proxy(proxy).health_check();
        match self.request(&self.descriptor.base_url, options).await {
            Ok(response) => response.is_success() && !is_challenge(&response),
            Err(_) => false,
        }
    }
}
