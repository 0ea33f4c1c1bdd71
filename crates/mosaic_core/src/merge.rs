//! Field-level reconciliation of several providers' answers for one title.
//!
//! Contributions are expected in provider rank order (registration order).
//! For every field:
//!
//! 1. a non-null value from a provider that declares the field *priority* wins;
//! 2. for list fields, the first non-empty value is extended with the values of
//!    every provider that declares the field *shared* (deduplicated, first-seen
//!    order);
//! 3. otherwise the first non-null value by rank wins.
//!
//! Totals (episodes, chapters, volumes) prefer a META provider's value over an
//! information provider's before falling back to rank order.

use std::collections::BTreeMap;

use crate::{MediaField, MediaInfo, ProviderRole, ProviderScores};

#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub provider_id: String,
    pub role: ProviderRole,
    pub priority_fields: Vec<MediaField>,
    pub shared_fields: Vec<MediaField>,
    pub info: MediaInfo,
}

impl Contribution {
    pub fn new(provider_id: impl Into<String>, role: ProviderRole, info: MediaInfo) -> Self {
        Self {
            provider_id: provider_id.into(),
            role,
            priority_fields: Vec::new(),
            shared_fields: Vec::new(),
            info,
        }
    }

    pub fn with_priority_fields(mut self, fields: impl IntoIterator<Item = MediaField>) -> Self {
        self.priority_fields = fields.into_iter().collect();
        self
    }

    pub fn with_shared_fields(mut self, fields: impl IntoIterator<Item = MediaField>) -> Self {
        self.shared_fields = fields.into_iter().collect();
        self
    }

    fn is_priority(&self, field: MediaField) -> bool {
        self.priority_fields.contains(&field)
    }

    fn is_shared(&self, field: MediaField) -> bool {
        self.shared_fields.contains(&field)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub info: MediaInfo,
    pub sources: BTreeMap<MediaField, String>,
    pub scores: ProviderScores,
}

pub fn merge_contributions(contributions: &[Contribution]) -> MergeOutcome {
    let mut merger = Merger {
        contributions,
        sources: BTreeMap::new(),
    };

    let info = MediaInfo {
        id: contributions
            .first()
            .map(|c| c.info.id.clone())
            .unwrap_or_default(),
        title: merger.scalar(MediaField::Title, |info| {
            (!info.title.is_empty()).then(|| info.title.clone())
        })
        .unwrap_or_default(),
        synonyms: merger.list(MediaField::Synonyms, |info| &info.synonyms),
        description: merger.scalar(MediaField::Description, |info| {
            info.description.clone().filter(|d| !d.trim().is_empty())
        }),
        cover_image: merger.scalar(MediaField::CoverImage, |info| info.cover_image.clone()),
        banner_image: merger.scalar(MediaField::BannerImage, |info| info.banner_image.clone()),
        color: merger.scalar(MediaField::Color, |info| info.color.clone()),
        status: merger.scalar(MediaField::Status, |info| info.status),
        format: merger.scalar(MediaField::Format, |info| info.format),
        season: merger.scalar(MediaField::Season, |info| info.season),
        year: merger.scalar(MediaField::Year, |info| info.year.filter(|year| *year > 0)),
        start_date: merger.scalar(MediaField::StartDate, |info| info.start_date),
        end_date: merger.scalar(MediaField::EndDate, |info| info.end_date),
        total_episodes: merger.total(MediaField::TotalEpisodes, |info| info.total_episodes),
        total_chapters: merger.total(MediaField::TotalChapters, |info| info.total_chapters),
        total_volumes: merger.total(MediaField::TotalVolumes, |info| info.total_volumes),
        duration: merger.scalar(MediaField::Duration, |info| info.duration),
        rating: merger.scalar(MediaField::Rating, |info| info.rating),
        popularity: merger.scalar(MediaField::Popularity, |info| info.popularity),
        genres: merger.list(MediaField::Genres, |info| &info.genres),
        tags: merger.list(MediaField::Tags, |info| &info.tags),
        artwork: merger.list(MediaField::Artwork, |info| &info.artwork),
        country_of_origin: merger.scalar(MediaField::CountryOfOrigin, |info| {
            info.country_of_origin.clone()
        }),
        trailer: merger.scalar(MediaField::Trailer, |info| info.trailer.clone()),
    };

    let mut scores = ProviderScores::default();
    for contribution in contributions {
        if let Some(rating) = contribution.info.rating {
            scores
                .ratings
                .entry(contribution.provider_id.clone())
                .or_insert(rating);
        }
        if let Some(popularity) = contribution.info.popularity {
            scores
                .popularity
                .entry(contribution.provider_id.clone())
                .or_insert(popularity);
        }
    }

    MergeOutcome {
        info,
        sources: merger.sources,
        scores,
    }
}

struct Merger<'a> {
    contributions: &'a [Contribution],
    sources: BTreeMap<MediaField, String>,
}

impl<'a> Merger<'a> {
    fn attribute(&mut self, field: MediaField, contribution: &Contribution) {
        self.sources
            .insert(field, contribution.provider_id.clone());
    }

    fn scalar<T>(&mut self, field: MediaField, get: impl Fn(&MediaInfo) -> Option<T>) -> Option<T> {
        let contributions = self.contributions;
        let winner = contributions
            .iter()
            .filter(|c| c.is_priority(field))
            .find_map(|c| get(&c.info).map(|value| (c, value)))
            .or_else(|| {
                contributions
                    .iter()
                    .find_map(|c| get(&c.info).map(|value| (c, value)))
            });
        winner.map(|(contribution, value)| {
            self.attribute(field, contribution);
            value
        })
    }

    fn total(&mut self, field: MediaField, get: impl Fn(&MediaInfo) -> Option<u32>) -> Option<u32> {
        let contributions = self.contributions;
        let declared = contributions
            .iter()
            .filter(|c| c.is_priority(field))
            .chain(contributions.iter().filter(|c| c.role == ProviderRole::Meta))
            .find_map(|c| get(&c.info).filter(|total| *total > 0).map(|value| (c, value)));
        match declared {
            Some((contribution, value)) => {
                self.attribute(field, contribution);
                Some(value)
            }
            None => self.scalar(field, |info| get(info).filter(|total| *total > 0)),
        }
    }

    fn list<T: Clone + PartialEq>(
        &mut self,
        field: MediaField,
        get: impl Fn(&MediaInfo) -> &Vec<T>,
    ) -> Vec<T> {
        let contributions = self.contributions;
        if let Some(contribution) = contributions
            .iter()
            .find(|c| c.is_priority(field) && !get(&c.info).is_empty())
        {
            self.attribute(field, contribution);
            return dedupe(get(&contribution.info).iter().cloned());
        }

        let Some(base) = contributions.iter().position(|c| !get(&c.info).is_empty()) else {
            return Vec::new();
        };
        self.attribute(field, &contributions[base]);

        let extra = contributions
            .iter()
            .enumerate()
            .filter(|(index, c)| *index != base && c.is_shared(field))
            .flat_map(|(_, c)| get(&c.info).iter().cloned());
        dedupe(get(&contributions[base].info).iter().cloned().chain(extra))
    }
}

fn dedupe<T: PartialEq>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut unique: Vec<T> = Vec::new();
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}
