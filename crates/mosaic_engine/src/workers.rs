use std::collections::HashSet;
use std::sync::Arc;

use mosaic_core::{CanonicalMedia, ContentItem, Seed};
use mosaic_logging::{mosaic_info, mosaic_warn};
use serde::{Deserialize, Serialize};

use crate::config::QueueSettings;
use crate::document::document_filename;
use crate::events::{AggregatorEvent, EventEmitter};
use crate::queue::QueueExecutor;
use crate::registry::{ProviderHandle, ProviderRegistry};
use crate::resolve::MappingResolver;
use crate::scatter::scatter_gather;
use crate::seasonal::{SeasonalMedia, SeasonalRefresher};

pub const MAPPING_QUEUE: &str = "mapping-executor";
pub const SEASONAL_QUEUE: &str = "seasonal-executor";
pub const PROXY_QUEUE: &str = "proxy-executor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Epub,
    Pdf,
}

impl DocumentKind {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Epub => "epub",
            DocumentKind::Pdf => "pdf",
        }
    }

    pub fn queue_name(self) -> &'static str {
        match self {
            DocumentKind::Epub => "epub-executor",
            DocumentKind::Pdf => "pdf-executor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequest {
    pub kind: DocumentKind,
    pub media: CanonicalMedia,
    pub provider_id: String,
    pub chapters: Vec<ContentItem>,
}

impl DocumentRequest {
    pub fn file_name(&self) -> String {
        let identity = format!("{}:{}:{}", self.media.media_type, self.media.id, self.provider_id);
        document_filename(self.media.info.title.preferred(), &identity, self.kind.extension())
    }
}

/// Renders a document for a title's chapters and returns where it was stored.
#[async_trait::async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(&self, request: &DocumentRequest) -> anyhow::Result<Option<String>>;
}

/// Outcome of health-checking one provider's proxies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub provider_id: String,
    pub checked: usize,
    pub kept: usize,
    pub removed: usize,
}

pub fn mapping_executor(
    resolver: Arc<MappingResolver>,
    events: EventEmitter,
    settings: &QueueSettings,
) -> QueueExecutor<Seed, CanonicalMedia> {
    QueueExecutor::new(MAPPING_QUEUE, move |seed: Seed| {
        let resolver = resolver.clone();
        async move { Ok(resolver.resolve(&seed).await?) }
    })
    .on_success(move |_, media: &CanonicalMedia| {
        events.emit(AggregatorEvent::MediaResolved {
            id: media.id.clone(),
            media_type: media.media_type,
            mappings: media.mappings.len(),
        });
    })
    .on_error(|err, seed: &Seed| {
        mosaic_warn!("Mapping of {} {} failed: {:#}", seed.media_type, seed.id, err);
    })
    .interval(settings.poll_interval)
}

pub fn seasonal_executor(
    refresher: Arc<SeasonalRefresher>,
    events: EventEmitter,
    settings: &QueueSettings,
) -> QueueExecutor<String, SeasonalMedia> {
    QueueExecutor::new(SEASONAL_QUEUE, move |provider_id: String| {
        let refresher = refresher.clone();
        async move { Ok(refresher.refresh(&provider_id).await?) }
    })
    .on_success(move |provider_id: &String, media: &SeasonalMedia| {
        events.emit(AggregatorEvent::SeasonalRefreshed {
            provider_id: provider_id.clone(),
            entries: media.len(),
        });
    })
    .interval(settings.poll_interval)
}

/// Check every pooled proxy of a provider; keep the working ones, evict the rest.
pub async fn sweep_proxies(handle: &Arc<ProviderHandle>, batch_size: usize) -> SweepReport {
    let descriptor = handle.descriptor().clone();
    let pool = handle.client().dispatcher().pool().clone();
    let records = pool.proxies_for(descriptor.provider_type, &descriptor.id);

    let verdicts = scatter_gather(records, batch_size, |record| {
        let handle = handle.clone();
        async move {
            let url = record.url();
            let working = handle.proxy_check(&url).await;
            (url, working)
        }
    })
    .await;

    let mut report = SweepReport {
        provider_id: descriptor.id.clone(),
        ..SweepReport::default()
    };
    report.checked = verdicts.len();
    report.kept = verdicts.iter().filter(|(_, working)| *working).count();
    report.removed = report.checked - report.kept;

    let provider_type = descriptor.provider_type;
    let provider_id = descriptor.id.clone();
    let applied = tokio::task::spawn_blocking(move || {
        for (url, working) in verdicts {
            let persisted = if working {
                pool.mark_checked(provider_type, &provider_id, &url, true)
            } else {
                pool.remove(provider_type, &provider_id, &url)
            };
            if let Err(err) = persisted {
                mosaic_warn!("Could not persist verdict for {}: {}", url, err);
            }
        }
    })
    .await;
    if let Err(err) = applied {
        mosaic_warn!("Applying proxy verdicts for {} failed: {}", report.provider_id, err);
    }
    mosaic_info!(
        "Proxy sweep for {}: {} checked, {} kept, {} removed",
        report.provider_id,
        report.checked,
        report.kept,
        report.removed
    );
    report
}

pub fn proxy_executor(
    registry: Arc<ProviderRegistry>,
    events: EventEmitter,
    batch_size: usize,
    settings: &QueueSettings,
) -> QueueExecutor<String, SweepReport> {
    QueueExecutor::new(PROXY_QUEUE, move |provider_id: String| {
        let registry = registry.clone();
        async move {
            let handle = registry
                .find(&provider_id)
                .ok_or_else(|| anyhow::anyhow!("unknown provider {provider_id}"))?;
            Ok(sweep_proxies(&handle, batch_size).await)
        }
    })
    .on_success(move |_, report: &SweepReport| {
        events.emit(AggregatorEvent::ProxySweepCompleted {
            provider_id: report.provider_id.clone(),
            checked: report.checked,
            removed: report.removed,
        });
    })
    .interval(settings.poll_interval)
}

/// Queue one sweep per distinct provider that routes through proxies.
pub fn enqueue_proxy_sweeps(
    executor: &QueueExecutor<String, SweepReport>,
    registry: &ProviderRegistry,
) -> usize {
    let mut seen = HashSet::new();
    registry
        .all()
        .iter()
        .filter(|handle| handle.descriptor().needs_proxy)
        .filter(|handle| seen.insert(handle.id().to_string()))
        .map(|handle| executor.enqueue(handle.id().to_string()))
        .count()
}

/// Document generation queue. Completion is always announced; a failure carries an empty reference.
pub fn document_executor(
    kind: DocumentKind,
    generator: Arc<dyn DocumentGenerator>,
    events: EventEmitter,
    settings: &QueueSettings,
) -> QueueExecutor<DocumentRequest, Option<String>> {
    let failures = events.clone();
    QueueExecutor::new(kind.queue_name(), move |request: DocumentRequest| {
        let generator = generator.clone();
        async move {
            anyhow::ensure!(
                request.kind == kind,
                "{} request sent to the {} queue",
                request.kind.extension(),
                kind.extension()
            );
            generator.generate(&request).await
        }
    })
    .on_success(move |request: &DocumentRequest, reference: &Option<String>| {
        events.emit(completed(request, reference.clone().unwrap_or_default()));
    })
    .on_error(move |err, request: &DocumentRequest| {
        mosaic_warn!("{} generation for {} failed: {:#}", request.kind.extension(), request.media.id, err);
        failures.emit(completed(request, String::new()));
    })
    .interval(settings.poll_interval)
}

fn completed(request: &DocumentRequest, reference: String) -> AggregatorEvent {
    AggregatorEvent::DocumentCompleted {
        kind: request.kind,
        media_id: request.media.id.clone(),
        provider_id: request.provider_id.clone(),
        reference,
    }
}

/// The five background queues, started and stopped together.
pub struct Workers {
    pub mapping: QueueExecutor<Seed, CanonicalMedia>,
    pub seasonal: QueueExecutor<String, SeasonalMedia>,
    pub proxy: QueueExecutor<String, SweepReport>,
    pub epub: QueueExecutor<DocumentRequest, Option<String>>,
    pub pdf: QueueExecutor<DocumentRequest, Option<String>>,
}

impl Workers {
    pub fn new(
        resolver: Arc<MappingResolver>,
        generator: Arc<dyn DocumentGenerator>,
        events: EventEmitter,
        settings: &QueueSettings,
    ) -> Self {
        let registry = resolver.registry().clone();
        let batch_size = resolver.settings().batch_size;
        let refresher = Arc::new(SeasonalRefresher::new(registry.clone(), batch_size));
        Self {
            mapping: mapping_executor(resolver, events.clone(), settings),
            seasonal: seasonal_executor(refresher, events.clone(), settings),
            proxy: proxy_executor(registry, events.clone(), batch_size, settings),
            epub: document_executor(DocumentKind::Epub, generator.clone(), events.clone(), settings),
            pdf: document_executor(DocumentKind::Pdf, generator, events, settings),
        }
    }

    pub fn start(&self) {
        self.mapping.start();
        self.seasonal.start();
        self.proxy.start();
        self.epub.start();
        self.pdf.start();
    }

    pub fn stop(&self) {
        self.mapping.stop();
        self.seasonal.stop();
        self.proxy.stop();
        self.epub.stop();
        self.pdf.stop();
    }
}
