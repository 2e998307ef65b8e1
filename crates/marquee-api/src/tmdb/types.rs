use serde::{Deserialize, Serialize};

use crate::traits::{MediaType, RemoteGenre, RemoteTitle};

// ── Status envelope ─────────────────────────────────────────────

/// `{success, status_code, status_message}`, returned by mutations and errors.
#[derive(Debug, Default, Deserialize)]
pub struct StatusBody {
    pub success: Option<bool>,
    pub status_code: Option<i64>,
    pub status_message: Option<String>,
}

// ── Catalog ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenreListResponse {
    pub genres: Vec<RemoteGenre>,
}

#[derive(Debug, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default = "first_page")]
    pub total_pages: u32,
}

fn first_page() -> u32 {
    1
}

/// A movie, series, or person as it appears in search, list, and detail
/// responses. Movies use `title`/`release_date`, series `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
pub struct TmdbTitle {
    pub id: u64,
    pub media_type: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    /// Detail responses carry full genre objects instead of `genre_ids`.
    #[serde(default)]
    pub genres: Vec<RemoteGenre>,
    pub vote_average: Option<f32>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub number_of_episodes: Option<u32>,
}

impl TmdbTitle {
    /// Media type from the payload, or `fallback` for single-type endpoints.
    /// `None` for people and unknown types.
    pub fn resolved_media_type(&self, fallback: Option<MediaType>) -> Option<MediaType> {
        match self.media_type.as_deref() {
            Some("movie") => Some(MediaType::Movie),
            Some("tv") => Some(MediaType::Tv),
            Some(_) => None,
            None => fallback,
        }
    }

    pub fn into_remote(self, fallback: Option<MediaType>) -> Option<RemoteTitle> {
        let media_type = self.resolved_media_type(fallback)?;
        let genre_ids = if self.genre_ids.is_empty() {
            self.genres.iter().map(|g| g.id).collect()
        } else {
            self.genre_ids
        };
        let (title, release_date) = match media_type {
            MediaType::Movie => (self.title.or(self.name), self.release_date),
            MediaType::Tv => (self.name.or(self.title), self.first_air_date),
        };

        Some(RemoteTitle {
            id: self.id,
            media_type,
            title: title.unwrap_or_default(),
            overview: self.overview.filter(|s| !s.is_empty()),
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            genre_ids,
            vote_average: self.vote_average,
            release_date: release_date.filter(|s| !s.is_empty()),
            total_episodes: self.number_of_episodes,
        })
    }
}

// ── Account lists ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct WatchlistBody {
    pub media_type: MediaType,
    pub media_id: u64,
    pub watchlist: bool,
}

#[derive(Debug, Serialize)]
pub struct FavoriteBody {
    pub media_type: MediaType,
    pub media_id: u64,
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct ListItemBody {
    pub media_id: u64,
}

#[derive(Debug, Serialize)]
pub struct RatingBody {
    pub value: f32,
}

#[derive(Debug, Serialize)]
pub struct CreateListBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub language: &'a str,
    pub public: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateListResponse {
    pub success: Option<bool>,
    pub list_id: Option<u64>,
    pub status_message: Option<String>,
}

/// `GET /list/{id}`: every item on one response.
#[derive(Debug, Deserialize)]
pub struct ListDetails {
    #[serde(default)]
    pub items: Vec<TmdbTitle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_without_results_is_empty() {
        let page: Paged<TmdbTitle> = serde_json::from_str(r#"{"total_results": 0}"#).unwrap();
        assert!(page.results.is_empty());
        assert_eq!((page.page, page.total_pages), (1, 1));
    }

    #[test]
    fn test_deserialize_search_multi() {
        let json = r#"{
            "page": 1,
            "results": [
                {
                    "id": 603,
                    "media_type": "movie",
                    "title": "The Matrix",
                    "overview": "Set in the 22nd century...",
                    "poster_path": "/f89U3ADr1oiB1s9GkdPOEpXUk5H.jpg",
                    "backdrop_path": "/fNG7i7RqMErkcqhohV2a6cV1Ehy.jpg",
                    "genre_ids": [28, 878],
                    "vote_average": 8.2,
                    "release_date": "1999-03-30"
                },
                {
                    "id": 1399,
                    "media_type": "tv",
                    "name": "Game of Thrones",
                    "overview": "",
                    "genre_ids": [10765, 18, 10759],
                    "vote_average": 8.4,
                    "first_air_date": "2011-04-17"
                },
                {
                    "id": 6384,
                    "media_type": "person",
                    "name": "Keanu Reeves"
                }
            ],
            "total_pages": 3,
            "total_results": 55
        }"#;

        let page: Paged<TmdbTitle> = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_pages, 3);

        let titles: Vec<RemoteTitle> = page
            .results
            .into_iter()
            .filter_map(|t| t.into_remote(None))
            .collect();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].title, "The Matrix");
        assert_eq!(titles[0].release_date.as_deref(), Some("1999-03-30"));
        assert_eq!(titles[1].media_type, MediaType::Tv);
        assert_eq!(titles[1].title, "Game of Thrones");
        assert_eq!(titles[1].release_date.as_deref(), Some("2011-04-17"));
        assert_eq!(titles[1].overview, None);
    }

    #[test]
    fn test_deserialize_tv_details() {
        let json = r#"{
            "id": 1396,
            "name": "Breaking Bad",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 80, "name": "Crime"}],
            "number_of_episodes": 62,
            "first_air_date": "2008-01-20",
            "vote_average": 8.9
        }"#;
        let title: TmdbTitle = serde_json::from_str(json).unwrap();
        let remote = title.into_remote(Some(MediaType::Tv)).unwrap();
        assert_eq!(remote.genre_ids, vec![18, 80]);
        assert_eq!(remote.total_episodes, Some(62));
    }

    #[test]
    fn test_membership_body_shape() {
        let body = WatchlistBody {
            media_type: MediaType::Movie,
            media_id: 42,
            watchlist: true,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"media_type":"movie","media_id":42,"watchlist":true}"#
        );
    }
}
