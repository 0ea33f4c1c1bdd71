use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An episode or chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub number: f64,
    pub title: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub description: Option<String>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, number: f64) -> Self {
        Self {
            id: id.into(),
            number,
            title: None,
            updated_at: None,
            image: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentListing {
    pub provider_id: String,
    pub items: Vec<ContentItem>,
}

impl ContentListing {
    pub fn latest(&self) -> Option<&ContentItem> {
        self.items.last()
    }
}

/// Pages or stream sources of one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PageData {
    Images(Vec<PageImage>),
    Text(String),
    Streams(Vec<StreamSource>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub index: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub url: String,
    pub quality: Option<String>,
}

/// Ranked id lists a provider publishes for the current season.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seasonal {
    pub trending: Vec<String>,
    pub seasonal: Vec<String>,
    pub popular: Vec<String>,
    pub top: Vec<String>,
}

impl Seasonal {
    /// Every id once, in list order.
    pub fn unique_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.trending
            .iter()
            .chain(&self.seasonal)
            .chain(&self.popular)
            .chain(&self.top)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

/// Collects listing pages and detects when a page brings nothing new.
#[derive(Debug, Default)]
pub struct PageAccumulator {
    seen: HashSet<String>,
    items: Vec<ContentItem>,
}

impl PageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one page; returns how many previously unseen items it held.
    pub fn absorb(&mut self, page: Vec<ContentItem>) -> usize {
        let mut fresh = 0;
        for item in page {
            if self.seen.insert(item.id.clone()) {
                self.items.push(item);
                fresh += 1;
            }
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_sorted(self) -> Vec<ContentItem> {
        let mut items = self.items;
        sort_by_number(&mut items);
        items
    }
}

pub fn sort_by_number(items: &mut [ContentItem]) {
    items.sort_by(|a, b| a.number.total_cmp(&b.number));
}

/// Air-date window of a title, widened by a tolerance on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    tolerance: Duration,
}

impl DateWindow {
    pub const DEFAULT_TOLERANCE_DAYS: i64 = 7;

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>, tolerance: Duration) -> Self {
        Self {
            start,
            end,
            tolerance,
        }
    }

    pub fn with_default_tolerance(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self::new(start, end, Duration::days(Self::DEFAULT_TOLERANCE_DAYS))
    }

    /// Undated items are always inside.
    pub fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        let Some(at) = at else {
            return true;
        };
        let day = at.date_naive();
        if let Some(start) = self.start {
            if day < start - self.tolerance {
                return false;
            }
        }
        if let Some(end) = self.end {
            if day > end + self.tolerance {
                return false;
            }
        }
        true
    }

    pub fn retain(&self, items: &mut Vec<ContentItem>) {
        items.retain(|item| self.contains(item.updated_at));
    }
}
