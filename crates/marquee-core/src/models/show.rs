use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, MediaKind};

/// Natural key of a tracked title: remote catalog ID plus movie/series flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShowKey {
    pub external_id: u64,
    pub is_movie: bool,
}

impl ShowKey {
    pub fn new(external_id: u64, is_movie: bool) -> Self {
        Self {
            external_id,
            is_movie,
        }
    }

    pub fn movie(external_id: u64) -> Self {
        Self::new(external_id, true)
    }

    pub fn series(external_id: u64) -> Self {
        Self::new(external_id, false)
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_is_movie(self.is_movie)
    }
}

impl std::fmt::Display for ShowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_movie { "movie" } else { "series" };
        write!(f, "{kind} {}", self.external_id)
    }
}

/// Remote metadata mirrored locally. Overwritten whenever a fresher copy is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowMetadata {
    pub external_id: u64,
    pub is_movie: bool,
    pub title: String,
    pub summary: Option<String>,
    pub poster_ref: Option<String>,
    pub backdrop_ref: Option<String>,
    /// Ordered set: first occurrence wins, duplicates dropped on write.
    pub genre_ids: Vec<u32>,
    pub public_rating: Option<f32>,
    /// Raw `YYYY-MM-DD` as served remotely; may be empty or malformed.
    pub release_date: Option<String>,
    /// Known episode total, series only.
    pub total_episodes: Option<u32>,
}

impl ShowMetadata {
    pub fn new(key: ShowKey, title: impl Into<String>) -> Self {
        Self {
            external_id: key.external_id,
            is_movie: key.is_movie,
            title: title.into(),
            summary: None,
            poster_ref: None,
            backdrop_ref: None,
            genre_ids: Vec::new(),
            public_rating: None,
            release_date: None,
            total_episodes: None,
        }
    }

    pub fn key(&self) -> ShowKey {
        ShowKey::new(self.external_id, self.is_movie)
    }

    /// Genre IDs with duplicates removed, preserving first-seen order.
    pub fn distinct_genres(&self) -> Vec<u32> {
        let mut seen = std::collections::HashSet::new();
        self.genre_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// One tracked title: cached metadata plus user-owned personal fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowRecord {
    pub metadata: ShowMetadata,
    pub category: Category,
    /// 0–10.
    pub personal_rating: Option<u8>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
    pub rewatch_count: u32,
    pub episodes_seen: u32,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShowRecord {
    pub fn key(&self) -> ShowKey {
        self.metadata.key()
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn is_movie(&self) -> bool {
        self.metadata.is_movie
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_is_movie(self.metadata.is_movie)
    }
}

/// A change to the personal fields of a record.
///
/// `None` means "not supplied, leave as is". Rating and dates are doubly
/// optional so that clearing them is expressible: `Some(None)` clears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalPatch {
    pub category: Option<Category>,
    pub personal_rating: Option<Option<u8>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub finish_date: Option<Option<NaiveDate>>,
    pub rewatch_count: Option<u32>,
    pub episodes_seen: Option<u32>,
}

impl PersonalPatch {
    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
