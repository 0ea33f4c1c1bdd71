//! Seed to canonical record: base lookup, cross-provider id mapping, field merge.

use std::sync::Arc;

use futures_util::future::join_all;
use mosaic_core::{
    merge_contributions, push_unique, select_mappings, CanonicalMedia, Contribution, DiceScorer,
    Mapping, MediaInfo, MediaType, ProviderRole, ScoredCandidate, Seed, SimilarityScorer, Title,
};
use mosaic_logging::{mosaic_debug, mosaic_info, mosaic_warn};
use tokio::sync::Semaphore;

use crate::config::ResolveSettings;
use crate::provider::SearchQuery;
use crate::registry::{ProviderHandle, ProviderRegistry};
use crate::scatter::scatter_gather;
use crate::store::{Cache, MediaRepository, RepositoryError};

/// Attribution used for fields only the seed itself supplied.
pub const SEED_SOURCE: &str = "seed";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("every provider failed to map {media_type} {id}")]
    AllProvidersFailed { id: String, media_type: MediaType },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub fn cache_key(media_type: MediaType, id: &str) -> String {
    format!("mapping:{}:{}", media_type.as_str(), id)
}

struct MetaOutcome {
    scored: Vec<ScoredCandidate>,
    attempted: usize,
    failed: usize,
}

pub struct MappingResolver {
    registry: Arc<ProviderRegistry>,
    cache: Arc<dyn Cache>,
    repository: Arc<dyn MediaRepository>,
    scorer: Arc<dyn SimilarityScorer>,
    settings: ResolveSettings,
}

impl MappingResolver {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<dyn Cache>,
        repository: Arc<dyn MediaRepository>,
        settings: ResolveSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            repository,
            scorer: Arc::new(DiceScorer),
            settings,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ResolveSettings {
        &self.settings
    }

    /// Cached or stored record for the seed, resolving afresh only when neither has it.
    pub async fn resolve(&self, seed: &Seed) -> Result<CanonicalMedia, ResolveError> {
        let key = cache_key(seed.media_type, &seed.id);
        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str(&raw) {
                Ok(media) => return Ok(media),
                Err(err) => mosaic_warn!("Discarding unreadable cache entry {}: {}", key, err),
            }
        }
        if let Some(media) = self.repository.get(&seed.id, seed.media_type).await? {
            self.store_in_cache(&media).await;
            return Ok(media);
        }
        self.resolve_fresh(seed).await
    }

    /// Resolve many seeds in batches; each seed's outcome is independent.
    pub async fn resolve_many(&self, seeds: Vec<Seed>) -> Vec<Result<CanonicalMedia, ResolveError>> {
        scatter_gather(seeds, self.settings.batch_size, |seed| async move {
            self.resolve(&seed).await
        })
        .await
    }

    /// Query every eligible provider, merge, persist, and cache, ignoring stored records.
    pub async fn resolve_fresh(&self, seed: &Seed) -> Result<CanonicalMedia, ResolveError> {
        let metas = self.registry.eligible(ProviderRole::Meta, &seed.formats);
        let infos = self.registry.eligible(ProviderRole::Information, &seed.formats);
        mosaic_info!(
            "Resolving {} {} across {} meta and {} information providers",
            seed.media_type,
            seed.id,
            metas.len(),
            infos.len()
        );

        let base = metas
            .iter()
            .find(|handle| handle.id() == self.settings.seed_provider)
            .cloned();
        let mut attempted = 0;
        let mut failed = 0;
        let mut contributions: Vec<(usize, Contribution)> = Vec::new();
        let mut mappings: Vec<Mapping> = Vec::new();
        let mut titles = seed.titles.clone();

        if let Some(base) = &base {
            attempted += 1;
            match base.get_media(&seed.id).await {
                Ok(Some(info)) => {
                    for title in info.all_titles() {
                        if !titles.contains(&title) {
                            titles.push(title);
                        }
                    }
                    mappings.push(Mapping {
                        provider_id: base.id().to_string(),
                        external_id: seed.id.clone(),
                        similarity: 1.0,
                    });
                    contributions.push((base.rank(), contribution(base, info)));
                }
                Ok(None) => mosaic_debug!("{} has no record for {}", base.id(), seed.id),
                Err(err) => {
                    failed += 1;
                    mosaic_warn!("Base lookup of {} on {} failed: {}", seed.id, base.id(), err);
                }
            }
        }

        let others: Vec<Arc<ProviderHandle>> = metas
            .iter()
            .filter(|handle| base.as_ref().is_none_or(|b| b.id() != handle.id()))
            .cloned()
            .collect();
        let outcome = self.search_meta(&others, seed, &titles).await;
        attempted += outcome.attempted;
        failed += outcome.failed;

        if attempted > 0 && failed == attempted {
            return Err(ResolveError::AllProvidersFailed {
                id: seed.id.clone(),
                media_type: seed.media_type,
            });
        }

        for mapping in select_mappings(outcome.scored, self.settings.min_similarity) {
            push_unique(&mut mappings, mapping);
        }

        let mut draft = CanonicalMedia {
            id: seed.id.clone(),
            media_type: seed.media_type,
            info: MediaInfo::new(seed.id.clone(), Title::default()),
            sources: Default::default(),
            scores: Default::default(),
            mappings,
        };

        let lookups = join_all(infos.iter().map(|handle| {
            let draft = &draft;
            async move { (handle, handle.info(draft).await) }
        }))
        .await;
        for (handle, lookup) in lookups {
            match lookup {
                Ok(Some(info)) => contributions.push((handle.rank(), contribution(handle, info))),
                Ok(None) => {}
                Err(err) => mosaic_warn!("{} could not describe {}: {}", handle.id(), seed.id, err),
            }
        }

        contributions.sort_by_key(|(rank, _)| *rank);
        let mut ordered: Vec<Contribution> = contributions.into_iter().map(|(_, c)| c).collect();
        if !seed.titles.is_empty() {
            let mut info = MediaInfo::new(seed.id.clone(), Title::english(seed.titles[0].clone()));
            info.synonyms = seed.titles[1..].to_vec();
            ordered.push(Contribution::new(SEED_SOURCE, ProviderRole::Meta, info));
        }

        let merged = merge_contributions(&ordered);
        draft.info = merged.info;
        draft.info.id = seed.id.clone();
        draft.sources = merged.sources;
        draft.scores = merged.scores;

        self.repository.upsert(&draft).await?;
        self.store_in_cache(&draft).await;
        mosaic_info!(
            "Resolved {} {} with {} mappings",
            seed.media_type,
            seed.id,
            draft.mappings.len()
        );
        Ok(draft)
    }

    async fn search_meta(
        &self,
        handles: &[Arc<ProviderHandle>],
        seed: &Seed,
        titles: &[String],
    ) -> MetaOutcome {
        let Some(query_title) = titles.first() else {
            return MetaOutcome {
                scored: Vec::new(),
                attempted: 0,
                failed: 0,
            };
        };
        let query = SearchQuery::new(query_title.clone()).for_type(seed.media_type, &seed.formats);
        let permits = Semaphore::new(self.settings.meta_concurrency.max(1));

        let results = join_all(handles.iter().map(|handle| {
            let permits = &permits;
            let query = &query;
            async move {
                let _permit = permits.acquire().await.ok();
                (handle, handle.search(query).await)
            }
        }))
        .await;

        let mut outcome = MetaOutcome {
            scored: Vec::new(),
            attempted: handles.len(),
            failed: 0,
        };
        for (handle, result) in results {
            match result {
                Ok(candidates) => {
                    for candidate in candidates {
                        if candidate
                            .format
                            .is_some_and(|format| !seed.formats.is_empty() && !seed.formats.contains(&format))
                        {
                            continue;
                        }
                        let similarity = candidate
                            .similarity
                            .unwrap_or_else(|| self.scorer.score(&candidate.titles(), titles));
                        outcome.scored.push(ScoredCandidate {
                            candidate,
                            similarity,
                            rank: handle.rank(),
                        });
                    }
                }
                Err(err) => {
                    outcome.failed += 1;
                    mosaic_warn!("{} search for {} failed: {}", handle.id(), seed.id, err);
                }
            }
        }
        outcome
    }

    async fn store_in_cache(&self, media: &CanonicalMedia) {
        match serde_json::to_string(media) {
            Ok(json) => {
                self.cache
                    .set(&cache_key(media.media_type, &media.id), json, self.settings.cache_ttl)
                    .await
            }
            Err(err) => mosaic_warn!("Could not cache {}: {}", media.id, err),
        }
    }
}

fn contribution(handle: &ProviderHandle, info: MediaInfo) -> Contribution {
    let descriptor = handle.descriptor();
    Contribution::new(handle.id(), handle.role(), info)
        .with_priority_fields(descriptor.priority_fields.iter().copied())
        .with_shared_fields(descriptor.shared_fields.iter().copied())
}
