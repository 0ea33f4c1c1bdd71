//! Mosaic core: pure data model and reconciliation rules for media metadata.
mod content;
mod descriptor;
mod mapping;
mod media;
mod merge;
mod similarity;
mod types;

pub use content::{
    sort_by_number, ContentItem, ContentListing, DateWindow, PageAccumulator, PageData, PageImage,
    Seasonal, StreamSource,
};
pub use descriptor::ProviderDescriptor;
pub use mapping::{push_unique, select_mappings, ScoredCandidate};
pub use media::{
    Artwork, ArtworkKind, CandidateResult, CanonicalMedia, Mapping, MediaField, MediaInfo,
    ProviderScores, Title,
};
pub use merge::{merge_contributions, Contribution, MergeOutcome};
pub use similarity::{normalize_title, DiceScorer, SimilarityScorer};
pub use types::{
    MediaFormat, MediaSeason, MediaStatus, MediaType, ProviderRole, ProviderType, Seed,
};
