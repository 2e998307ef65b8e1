//! Service-agnostic interfaces for the remote catalog and account lists.
//!
//! The runtime and its tests only see these traits; [`TmdbClient`](crate::TmdbClient)
//! is the production implementation.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Remote media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }

    pub fn from_is_movie(is_movie: bool) -> Self {
        if is_movie {
            Self::Movie
        } else {
            Self::Tv
        }
    }

    pub fn is_movie(&self) -> bool {
        matches!(self, Self::Movie)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A title on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaRef {
    pub id: u64,
    pub media_type: MediaType,
}

impl MediaRef {
    pub fn movie(id: u64) -> Self {
        Self {
            id,
            media_type: MediaType::Movie,
        }
    }

    pub fn tv(id: u64) -> Self {
        Self {
            id,
            media_type: MediaType::Tv,
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.id)
    }
}

/// A remote collection a title can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListRef {
    Watchlist,
    Favorites,
    Custom(u64),
}

impl fmt::Display for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watchlist => f.write_str("watchlist"),
            Self::Favorites => f.write_str("favorites"),
            Self::Custom(id) => write!(f, "list {id}"),
        }
    }
}

/// Something that can carry a personal rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RatingTarget {
    Title(MediaRef),
    Episode {
        series_id: u64,
        season: u32,
        episode: u32,
    },
}

impl fmt::Display for RatingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title(item) => item.fmt(f),
            Self::Episode {
                series_id,
                season,
                episode,
            } => write!(f, "tv/{series_id} S{season:02}E{episode:02}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// A genre as served remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGenre {
    pub id: u32,
    pub name: String,
}

/// Title metadata as served remotely, normalised across movies and series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTitle {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genre_ids: Vec<u32>,
    pub vote_average: Option<f32>,
    /// `YYYY-MM-DD`; first air date for series.
    pub release_date: Option<String>,
    /// Series only, details endpoint only.
    pub total_episodes: Option<u32>,
}

impl RemoteTitle {
    pub fn media_ref(&self) -> MediaRef {
        MediaRef {
            id: self.id,
            media_type: self.media_type,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<RemoteTitle>,
    pub page: u32,
    pub total_pages: u32,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Read-only catalog access.
pub trait MetadataService: Send + Sync {
    fn fetch_genres(
        &self,
        media_type: MediaType,
    ) -> impl Future<Output = Result<Vec<RemoteGenre>, SyncError>> + Send;

    fn fetch_title_details(
        &self,
        item: MediaRef,
    ) -> impl Future<Output = Result<RemoteTitle, SyncError>> + Send;

    /// Movies and series matching `query`. Person results are skipped.
    fn search_titles(
        &self,
        query: &str,
        page: u32,
    ) -> impl Future<Output = Result<SearchPage, SyncError>> + Send;
}

/// Account-scoped list and rating mutations.
///
/// Every call is a single attempt: no retries.
pub trait AccountListService: Send + Sync {
    fn set_membership(
        &self,
        item: MediaRef,
        list: ListRef,
        included: bool,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// `value` must be within 0.5..=10.0 in steps of 0.5.
    fn set_rating(
        &self,
        target: RatingTarget,
        value: f32,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn clear_rating(
        &self,
        target: RatingTarget,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn create_list(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> impl Future<Output = Result<ListRef, SyncError>> + Send;

    fn delete_list(&self, list: ListRef) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// IDs of every title of `media_type` in `list`, across all pages, without duplicates.
    fn list_items(
        &self,
        list: ListRef,
        media_type: MediaType,
    ) -> impl Future<Output = Result<Vec<u64>, SyncError>> + Send;
}

/// Check a rating value against the remote scale.
pub fn validate_rating(value: f32) -> Result<f32, SyncError> {
    let doubled = value * 2.0;
    if value.is_finite() && (0.5..=10.0).contains(&value) && doubled.fract() == 0.0 {
        Ok(value)
    } else {
        Err(SyncError::RemoteRejected {
            status: None,
            reason: format!("rating {value} must be 0.5 to 10 in steps of 0.5"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rating() {
        assert_eq!(validate_rating(0.5), Ok(0.5));
        assert_eq!(validate_rating(7.5), Ok(7.5));
        assert_eq!(validate_rating(10.0), Ok(10.0));
        assert!(validate_rating(0.0).is_err());
        assert!(validate_rating(7.3).is_err());
        assert!(validate_rating(10.5).is_err());
        assert!(validate_rating(f32::NAN).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(MediaRef::movie(42).to_string(), "movie/42");
        assert_eq!(ListRef::Custom(7).to_string(), "list 7");
        let ep = RatingTarget::Episode {
            series_id: 1399,
            season: 1,
            episode: 9,
        };
        assert_eq!(ep.to_string(), "tv/1399 S01E09");
    }

    #[test]
    fn test_search_page_has_next() {
        let page = |page, total_pages| SearchPage {
            page,
            total_pages,
            ..SearchPage::default()
        };
        assert!(page(1, 3).has_next());
        assert!(!page(3, 3).has_next());
        assert!(!page(1, 0).has_next());
    }

    #[test]
    fn test_media_type_serde() {
        assert_eq!(serde_json::to_string(&MediaType::Tv).unwrap(), r#""tv""#);
        let parsed: MediaType = serde_json::from_str(r#""movie""#).unwrap();
        assert_eq!(parsed, MediaType::Movie);
    }
}
