use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{MediaFormat, MediaSeason, MediaStatus, MediaType};

/// Merge-addressable fields of a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaField {
    Title,
    Synonyms,
    Description,
    CoverImage,
    BannerImage,
    Color,
    Status,
    Format,
    Season,
    Year,
    StartDate,
    EndDate,
    TotalEpisodes,
    TotalChapters,
    TotalVolumes,
    Duration,
    Rating,
    Popularity,
    Genres,
    Tags,
    Artwork,
    CountryOfOrigin,
    Trailer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub english: Option<String>,
    pub romaji: Option<String>,
    pub native: Option<String>,
}

impl Title {
    pub fn english(title: impl Into<String>) -> Self {
        Self {
            english: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Preferred display title: english, then romaji, then native.
    pub fn preferred(&self) -> Option<&str> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [&self.english, &self.romaji, &self.native]
            .into_iter()
            .filter_map(|title| title.as_deref())
            .filter(|title| !title.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtworkKind {
    Poster,
    Banner,
    Cover,
    Icon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    pub img: String,
    pub kind: ArtworkKind,
    pub provider_id: String,
}

/// One provider's descriptive answer for a title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    /// The provider's own id for this title.
    pub id: String,
    pub title: Title,
    pub synonyms: Vec<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub color: Option<String>,
    pub status: Option<MediaStatus>,
    pub format: Option<MediaFormat>,
    pub season: Option<MediaSeason>,
    pub year: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_episodes: Option<u32>,
    pub total_chapters: Option<u32>,
    pub total_volumes: Option<u32>,
    /// Minutes per episode.
    pub duration: Option<u32>,
    pub rating: Option<f64>,
    pub popularity: Option<f64>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub artwork: Vec<Artwork>,
    pub country_of_origin: Option<String>,
    pub trailer: Option<String>,
}

impl MediaInfo {
    pub fn new(id: impl Into<String>, title: Title) -> Self {
        Self {
            id: id.into(),
            title,
            ..Self::default()
        }
    }

    /// Every known title and synonym, without blanks or repeats.
    pub fn all_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        for title in self.title.iter().chain(self.synonyms.iter().map(String::as_str)) {
            let title = title.trim();
            if !title.is_empty() && !titles.iter().any(|known| known == title) {
                titles.push(title.to_string());
            }
        }
        titles
    }

    /// Total for the listing kind relevant to `media_type`.
    pub fn total_for(&self, media_type: MediaType) -> Option<u32> {
        match media_type {
            MediaType::Anime => self.total_episodes,
            MediaType::Manga => self.total_chapters,
        }
    }
}

/// One provider's candidate answer for a seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// The source the external id belongs to. For a cross-reference provider
    /// this differs from the provider that produced the candidate.
    pub provider_id: String,
    pub external_id: String,
    pub title: String,
    pub alt_titles: Vec<String>,
    pub year: Option<i32>,
    pub format: Option<MediaFormat>,
    pub image: Option<String>,
    /// Confidence declared by the provider itself; scored by the engine when absent.
    pub similarity: Option<f64>,
}

impl CandidateResult {
    pub fn new(
        provider_id: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            external_id: external_id.into(),
            title: title.into(),
            alt_titles: Vec::new(),
            year: None,
            format: None,
            image: None,
            similarity: None,
        }
    }

    pub fn with_alt_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alt_titles = titles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn titles(&self) -> Vec<String> {
        std::iter::once(&self.title)
            .chain(self.alt_titles.iter())
            .filter(|title| !title.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub provider_id: String,
    pub external_id: String,
    pub similarity: f64,
}

/// Rating and popularity as reported by each provider, kept next to the merged value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderScores {
    pub ratings: BTreeMap<String, f64>,
    pub popularity: BTreeMap<String, f64>,
}

impl ProviderScores {
    pub fn average_rating(&self) -> Option<f64> {
        average(self.ratings.values())
    }

    pub fn average_popularity(&self) -> Option<f64> {
        average(self.popularity.values())
    }
}

fn average<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// The merged output of one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMedia {
    pub id: String,
    pub media_type: MediaType,
    pub info: MediaInfo,
    /// Which provider supplied each populated field.
    pub sources: BTreeMap<MediaField, String>,
    pub scores: ProviderScores,
    /// Ranked, at most one entry per provider id.
    pub mappings: Vec<Mapping>,
}

impl CanonicalMedia {
    pub fn mapping_for(&self, provider_id: &str) -> Option<&Mapping> {
        self.mappings
            .iter()
            .find(|mapping| mapping.provider_id == provider_id)
    }

    pub fn source_of(&self, field: MediaField) -> Option<&str> {
        self.sources.get(&field).map(String::as_str)
    }
}
