use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Anime,
    Manga,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Anime => "anime",
            MediaType::Manga => "manga",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaFormat {
    Tv,
    TvShort,
    Movie,
    Special,
    Ova,
    Ona,
    Music,
    Manga,
    OneShot,
    Novel,
    Unknown,
}

impl MediaFormat {
    /// Anime formats, for providers that cover every screen format.
    pub const ANIME: &'static [MediaFormat] = &[
        MediaFormat::Tv,
        MediaFormat::TvShort,
        MediaFormat::Movie,
        MediaFormat::Special,
        MediaFormat::Ova,
        MediaFormat::Ona,
    ];

    /// Print formats, novels included.
    pub const PRINT: &'static [MediaFormat] =
        &[MediaFormat::Manga, MediaFormat::OneShot, MediaFormat::Novel];

    pub fn media_type(self) -> Option<MediaType> {
        match self {
            MediaFormat::Tv
            | MediaFormat::TvShort
            | MediaFormat::Movie
            | MediaFormat::Special
            | MediaFormat::Ova
            | MediaFormat::Ona
            | MediaFormat::Music => Some(MediaType::Anime),
            MediaFormat::Manga | MediaFormat::OneShot | MediaFormat::Novel => {
                Some(MediaType::Manga)
            }
            MediaFormat::Unknown => None,
        }
    }
}

/// Proxy pool category. Each category is persisted as its own document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Meta,
    Information,
    Anime,
    Manga,
}

impl ProviderType {
    pub const ALL: [ProviderType; 4] = [
        ProviderType::Meta,
        ProviderType::Information,
        ProviderType::Anime,
        ProviderType::Manga,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Meta => "meta",
            ProviderType::Information => "information",
            ProviderType::Anime => "anime",
            ProviderType::Manga => "manga",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a registered provider is consulted for during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderRole {
    /// Cross-references one title's id across sources.
    Meta,
    /// Supplies descriptive fields.
    Information,
    /// Supplies episode/chapter listings and their pages.
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaSeason {
    Winter,
    Spring,
    Summer,
    Fall,
    Unknown,
}

/// The caller-supplied starting point of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub id: String,
    pub media_type: MediaType,
    pub formats: Vec<MediaFormat>,
    /// Titles already known for the seed; used when the base lookup yields nothing.
    #[serde(default)]
    pub titles: Vec<String>,
}

impl Seed {
    pub fn new(id: impl Into<String>, media_type: MediaType, formats: Vec<MediaFormat>) -> Self {
        Self {
            id: id.into(),
            media_type,
            formats,
            titles: Vec::new(),
        }
    }

    pub fn with_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.titles = titles.into_iter().map(Into::into).collect();
        self
    }
}
