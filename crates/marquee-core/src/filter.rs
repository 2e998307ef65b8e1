//! User-editable filter criteria and sort order, persisted as preferences.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;
use crate::models::{Category, MediaKind};
use crate::storage::Storage;

/// Stable preference keys. Changing one loses the user's saved filter.
pub mod keys {
    pub const CATEGORIES: &str = "filter_categories";
    pub const MEDIA_TYPES: &str = "filter_media_types";
    pub const GENRES_REQUIRED: &str = "filter_genres_required";
    pub const GENRES_EXCLUDED: &str = "filter_genres_excluded";
    pub const KEYWORDS_INCLUDE: &str = "filter_keywords_include";
    pub const KEYWORDS_EXCLUDE: &str = "filter_keywords_exclude";
    pub const DATES: &str = "filter_dates";
    pub const SORT: &str = "filter_sort";

    pub const ALL: &[&str] = &[
        CATEGORIES,
        MEDIA_TYPES,
        GENRES_REQUIRED,
        GENRES_EXCLUDED,
        KEYWORDS_INCLUDE,
        KEYWORDS_EXCLUDE,
        DATES,
        SORT,
    ];
}

/// Which records a library view includes.
///
/// Empty sets and lists mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub categories: BTreeSet<Category>,
    pub media_kinds: BTreeSet<MediaKind>,
    /// A record passes if it carries any of these.
    pub required_genres: BTreeSet<u32>,
    pub excluded_genres: BTreeSet<u32>,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub dates: DateFilter,
}

impl FilterCriteria {
    /// Required genres minus any that are also excluded. Exclusion wins.
    pub fn effective_required_genres(&self) -> BTreeSet<u32> {
        self.required_genres
            .difference(&self.excluded_genres)
            .copied()
            .collect()
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }

    /// Load persisted criteria. Unreadable values fall back to defaults.
    pub fn load(storage: &Storage) -> Result<Self, MarqueeError> {
        Ok(Self {
            categories: read_pref(storage, keys::CATEGORIES)?,
            media_kinds: read_pref(storage, keys::MEDIA_TYPES)?,
            required_genres: read_pref(storage, keys::GENRES_REQUIRED)?,
            excluded_genres: read_pref(storage, keys::GENRES_EXCLUDED)?,
            include_keywords: read_pref(storage, keys::KEYWORDS_INCLUDE)?,
            exclude_keywords: read_pref(storage, keys::KEYWORDS_EXCLUDE)?,
            dates: read_pref(storage, keys::DATES)?,
        })
    }

    pub fn save(&self, storage: &Storage) -> Result<(), MarqueeError> {
        write_pref(storage, keys::CATEGORIES, &self.categories)?;
        write_pref(storage, keys::MEDIA_TYPES, &self.media_kinds)?;
        write_pref(storage, keys::GENRES_REQUIRED, &self.required_genres)?;
        write_pref(storage, keys::GENRES_EXCLUDED, &self.excluded_genres)?;
        write_pref(storage, keys::KEYWORDS_INCLUDE, &self.include_keywords)?;
        write_pref(storage, keys::KEYWORDS_EXCLUDE, &self.exclude_keywords)?;
        write_pref(storage, keys::DATES, &self.dates)?;
        Ok(())
    }
}

/// Release-date restriction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DateFilter {
    #[default]
    Any,
    /// Inclusive on both ends.
    Between { start: NaiveDate, end: NaiveDate },
    /// Movies released in the 31 days up to and including today.
    InTheaters,
}

/// Ordering applied after filtering. All orders are stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Default,
    /// Public rating, highest first.
    BestRated,
    /// Release date, newest first.
    ReleaseDate,
    /// Title, case-insensitive A–Z.
    Alphabetical,
}

impl SortOrder {
    pub const ALL: &[SortOrder] = &[
        Self::Default,
        Self::BestRated,
        Self::ReleaseDate,
        Self::Alphabetical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::BestRated => "best_rated",
            Self::ReleaseDate => "release_date",
            Self::Alphabetical => "alphabetical",
        }
    }

    pub fn load(storage: &Storage) -> Result<Self, MarqueeError> {
        read_pref(storage, keys::SORT)
    }

    pub fn save(&self, storage: &Storage) -> Result<(), MarqueeError> {
        write_pref(storage, keys::SORT, self)
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|o| o.as_str() == folded)
            .ok_or_else(|| format!("unknown sort order: {s}"))
    }
}

/// Remove every persisted filter and sort preference.
pub fn reset(storage: &Storage) -> Result<(), MarqueeError> {
    for key in keys::ALL {
        storage.remove_preference(key)?;
    }
    Ok(())
}

fn read_pref<T: DeserializeOwned + Default>(
    storage: &Storage,
    key: &str,
) -> Result<T, MarqueeError> {
    let Some(raw) = storage.get_preference(key)? else {
        return Ok(T::default());
    };
    Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "Unreadable preference, using default");
        T::default()
    }))
}

fn write_pref<T: Serialize>(storage: &Storage, key: &str, value: &T) -> Result<(), MarqueeError> {
    let json = serde_json::to_string(value).map_err(|e| MarqueeError::Parse(e.to_string()))?;
    storage.set_preference(key, &json)
}
