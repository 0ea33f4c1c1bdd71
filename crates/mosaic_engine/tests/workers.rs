use std::sync::Arc;
use std::time::Duration;

use mosaic_core::{
    CanonicalMedia, ContentItem, MediaFormat, MediaInfo, MediaType, ProviderDescriptor,
    ProviderRole, ProviderType, Seed, Title,
};
use mosaic_engine::{
    enqueue_proxy_sweeps, proxy_executor, sweep_proxies, AggregatorEvent, DispatchSettings,
    Dispatcher, DocumentGenerator, DocumentKind, DocumentRequest, EventEmitter, Governor,
    MappingResolver, MemoryCache, MemoryRepository, Provider, ProviderClient, ProviderError,
    ProviderRegistry, ProxyPool, ProxyRecord, ProxyValidity, QueueSettings, ResolveSettings,
    Workers,
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

struct ProxiedProvider {
    descriptor: ProviderDescriptor,
    working_port: u16,
}

impl ProxiedProvider {
    fn new(id: &str, needs_proxy: bool) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ProviderDescriptor::new(id, format!("https://{id}.test"), ProviderType::Anime)
                .with_formats(MediaFormat::ANIME.iter().copied())
                .with_proxy(needs_proxy),
            working_port: 8002,
        })
    }
}

#[async_trait::async_trait]
impl Provider for ProxiedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn get_media(
        &self,
        _client: &ProviderClient,
        id: &str,
    ) -> Result<Option<MediaInfo>, ProviderError> {
        Ok(Some(MediaInfo::new(id, Title::english("Bocchi the Rock!"))))
    }

    async fn proxy_check(&self, _client: &ProviderClient, proxy: &str) -> bool {
        proxy.ends_with(&format!(":{}", self.working_port))
    }
}

struct FakeGenerator;

#[async_trait::async_trait]
impl DocumentGenerator for FakeGenerator {
    async fn generate(&self, request: &DocumentRequest) -> anyhow::Result<Option<String>> {
        anyhow::ensure!(!request.chapters.is_empty(), "nothing to render");
        Ok(Some(format!("/library/{}", request.file_name())))
    }
}

fn registry_with_pool(pool: Arc<ProxyPool>) -> ProviderRegistry {
    let dispatcher = Dispatcher::with_reqwest(pool, DispatchSettings::default()).expect("client builds");
    ProviderRegistry::new(
        Arc::new(dispatcher),
        Arc::new(Governor::new()),
        &ResolveSettings::default(),
    )
}

fn fast_queues() -> QueueSettings {
    QueueSettings {
        poll_interval: Duration::from_millis(50),
    }
}

fn workers(registry: ProviderRegistry, events: &EventEmitter) -> Workers {
    let resolver = MappingResolver::new(
        Arc::new(registry),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryRepository::new()),
        ResolveSettings::default(),
    );
    Workers::new(Arc::new(resolver), Arc::new(FakeGenerator), events.clone(), &fast_queues())
}

fn bocchi() -> CanonicalMedia {
    CanonicalMedia {
        id: "130003".into(),
        media_type: MediaType::Anime,
        info: MediaInfo::new("130003", Title::english("Bocchi the Rock!")),
        sources: Default::default(),
        scores: Default::default(),
        mappings: Vec::new(),
    }
}

fn document(kind: DocumentKind, chapters: usize) -> DocumentRequest {
    DocumentRequest {
        kind,
        media: bocchi(),
        provider_id: "mangadex".into(),
        chapters: (1..=chapters)
            .map(|n| ContentItem::new(format!("ch-{n}"), n as f64))
            .collect(),
    }
}

async fn next_event(rx: &mut broadcast::Receiver<AggregatorEvent>) -> AggregatorEvent {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("event arrives")
        .expect("channel open")
}

#[tokio::test]
async fn sweep_keeps_working_proxies_and_evicts_the_rest() {
    let pool = Arc::new(ProxyPool::in_memory());
    pool.add(
        ProviderType::Anime,
        "zoro",
        [8001, 8002, 8003].map(|port| ProxyRecord::new("10.1.1.1", port, ProviderType::Anime)),
    )
    .unwrap();
    let mut registry = registry_with_pool(pool.clone());
    let handle = registry
        .register(ProviderRole::Content, ProxiedProvider::new("zoro", true))
        .unwrap();

    let report = sweep_proxies(&handle, 2).await;

    assert_eq!((report.checked, report.kept, report.removed), (3, 1, 2));
    let remaining = pool.proxies_for(ProviderType::Anime, "zoro");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].port, 8002);
    assert_eq!(remaining[0].validity, ProxyValidity::Valid);
    assert!(remaining[0].last_checked.is_some());
}

#[tokio::test]
async fn sweeps_are_queued_once_per_proxied_provider() {
    let mut registry = registry_with_pool(Arc::new(ProxyPool::in_memory()));
    let zoro = ProxiedProvider::new("zoro", true);
    registry.register(ProviderRole::Meta, zoro.clone()).unwrap();
    registry.register(ProviderRole::Content, zoro).unwrap();
    registry
        .register(ProviderRole::Content, ProxiedProvider::new("gogoanime", true))
        .unwrap();
    registry
        .register(ProviderRole::Content, ProxiedProvider::new("animepahe", false))
        .unwrap();
    let registry = Arc::new(registry);

    let executor = proxy_executor(registry.clone(), EventEmitter::default(), 5, &fast_queues());
    assert_eq!(enqueue_proxy_sweeps(&executor, &registry), 2);
    assert_eq!(executor.pending(), 2);
}

#[tokio::test(start_paused = true)]
async fn proxy_queue_announces_completed_sweeps() {
    let pool = Arc::new(ProxyPool::in_memory());
    pool.add(
        ProviderType::Anime,
        "zoro",
        [ProxyRecord::new("10.1.1.1", 8001, ProviderType::Anime)],
    )
    .unwrap();
    let mut registry = registry_with_pool(pool);
    registry
        .register(ProviderRole::Content, ProxiedProvider::new("zoro", true))
        .unwrap();
    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let workers = workers(registry, &events);

    workers.proxy.enqueue("zoro".to_string());
    workers.start();

    assert_eq!(
        next_event(&mut rx).await,
        AggregatorEvent::ProxySweepCompleted {
            provider_id: "zoro".into(),
            checked: 1,
            removed: 1,
        }
    );
    workers.stop();
}

#[tokio::test(start_paused = true)]
async fn mapping_queue_announces_resolved_media() {
    let mut registry = registry_with_pool(Arc::new(ProxyPool::in_memory()));
    let anilist = Arc::new(ProxiedProvider {
        descriptor: ProviderDescriptor::new("anilist", "https://anilist.test", ProviderType::Meta)
            .with_formats(MediaFormat::ANIME.iter().copied()),
        working_port: 0,
    });
    registry.register(ProviderRole::Meta, anilist).unwrap();
    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let workers = workers(registry, &events);

    workers
        .mapping
        .enqueue(Seed::new("130003", MediaType::Anime, vec![MediaFormat::Tv]));
    workers.start();

    assert_eq!(
        next_event(&mut rx).await,
        AggregatorEvent::MediaResolved {
            id: "130003".into(),
            media_type: MediaType::Anime,
            mappings: 1,
        }
    );
    workers.stop();
}

#[tokio::test(start_paused = true)]
async fn document_queues_always_announce_completion() {
    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let workers = workers(registry_with_pool(Arc::new(ProxyPool::in_memory())), &events);

    let ok = document(DocumentKind::Epub, 3);
    let expected = format!("/library/{}", ok.file_name());
    workers.epub.enqueue(ok);
    workers.start();

    assert_eq!(
        next_event(&mut rx).await,
        AggregatorEvent::DocumentCompleted {
            kind: DocumentKind::Epub,
            media_id: "130003".into(),
            provider_id: "mangadex".into(),
            reference: expected,
        }
    );

    workers.pdf.enqueue(document(DocumentKind::Pdf, 0));
    match next_event(&mut rx).await {
        AggregatorEvent::DocumentCompleted { kind, reference, .. } => {
            assert_eq!(kind, DocumentKind::Pdf);
            assert_eq!(reference, "");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    workers.epub.enqueue(document(DocumentKind::Pdf, 2));
    match next_event(&mut rx).await {
        AggregatorEvent::DocumentCompleted { reference, .. } => assert_eq!(reference, ""),
        other => panic!("unexpected event: {other:?}"),
    }
    workers.stop();
}

#[test]
fn document_names_follow_title_and_kind() {
    let epub = document(DocumentKind::Epub, 1).file_name();
    let pdf = document(DocumentKind::Pdf, 1).file_name();
    assert!(epub.starts_with("Bocchi the Rock!--"), "{epub}");
    assert!(epub.ends_with(".epub"));
    assert!(pdf.ends_with(".pdf"));
    assert_eq!(epub, document(DocumentKind::Epub, 7).file_name());
}
