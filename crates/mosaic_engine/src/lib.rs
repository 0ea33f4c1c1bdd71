//! Mosaic engine: HTTP dispatch, provider pacing, resolution, and background queues.
mod challenge;
mod config;
mod content;
mod decode;
mod dedupe;
mod dispatch;
mod document;
mod events;
mod governor;
mod html;
mod persist;
mod provider;
mod proxy;
mod queue;
mod registry;
mod resolve;
mod response;
mod scatter;
mod seasonal;
mod store;
mod transport;
mod workers;

pub use challenge::{is_challenge, is_challenge_html, Backoff, ChallengePolicy};
pub use config::{
    load_settings, parse_settings, DispatchSettings, EngineSettings, QueueSettings,
    ResolveSettings, SettingsError,
};
pub use content::ContentFetcher;
pub use decode::{decode_body, DecodeError};
pub use dedupe::InflightCache;
pub use dispatch::{DispatchError, Dispatcher, RequestOptions};
pub use document::document_filename;
pub use events::{AggregatorEvent, EventEmitter};
pub use governor::{Governor, GovernorPermit};
pub use html::{page_title, select_attr, select_text};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use provider::{Provider, ProviderClient, ProviderError, SearchQuery};
pub use proxy::{file_name as proxy_file_name, ProxyPool, ProxyRecord, ProxyValidity};
pub use queue::{JobId, JobState, QueueExecutor};
pub use registry::{ProviderHandle, ProviderRegistry, RegistryError};
pub use resolve::{cache_key, MappingResolver, ResolveError, SEED_SOURCE};
pub use response::Response;
pub use scatter::scatter_gather;
pub use seasonal::{SeasonalMedia, SeasonalRefresher};
pub use store::{Cache, MediaRepository, MemoryCache, MemoryRepository, RepositoryError};
pub use transport::{OutboundRequest, ReqwestTransport, Transport, TransportError, TransportErrorKind};
pub use workers::{
    document_executor, enqueue_proxy_sweeps, mapping_executor, proxy_executor, seasonal_executor,
    sweep_proxies, DocumentGenerator, DocumentKind, DocumentRequest, SweepReport, Workers,
    MAPPING_QUEUE, PROXY_QUEUE, SEASONAL_QUEUE,
};
