//! Local mapping from remote genre IDs to display names.
//!
//! Titles only carry genre IDs; names come from the metadata service and are
//! refreshed lazily. Readers always see a complete map: a refresh builds the
//! new map first and then swaps it in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::models::{Genre, MediaKind};

type GenreMap = Arc<HashMap<u32, String>>;

/// Immutable view of both genre maps at one point in time.
#[derive(Debug, Clone, Default)]
pub struct GenreSnapshot {
    movie: GenreMap,
    series: GenreMap,
}

impl GenreSnapshot {
    /// Build a snapshot directly from genre lists (handy for tests and imports).
    pub fn from_lists(movie: &[Genre], series: &[Genre]) -> Self {
        Self {
            movie: Arc::new(to_map(movie.iter().cloned())),
            series: Arc::new(to_map(series.iter().cloned())),
        }
    }

    fn map(&self, kind: MediaKind) -> &HashMap<u32, String> {
        match kind {
            MediaKind::Movie => &self.movie,
            MediaKind::Series => &self.series,
        }
    }

    /// Name of a genre for a media type, falling back to the other type's map.
    pub fn resolve_for(&self, kind: MediaKind, id: u32) -> Option<&str> {
        let other = match kind {
            MediaKind::Movie => MediaKind::Series,
            MediaKind::Series => MediaKind::Movie,
        };
        self.map(kind)
            .get(&id)
            .or_else(|| self.map(other).get(&id))
            .map(String::as_str)
    }

    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.resolve_for(MediaKind::Movie, id)
    }

    /// Resolved names for a list of IDs. Unknown IDs are omitted.
    pub fn names(&self, kind: MediaKind, ids: &[u32]) -> Vec<&str> {
        ids.iter()
            .filter_map(|id| self.resolve_for(kind, *id))
            .collect()
    }

    /// All genres of one media type, ordered by ID.
    pub fn genres(&self, kind: MediaKind) -> Vec<Genre> {
        let mut genres: Vec<Genre> = self
            .map(kind)
            .iter()
            .map(|(id, name)| Genre {
                id: *id,
                name: name.clone(),
            })
            .collect();
        genres.sort_by_key(|g| g.id);
        genres
    }

    pub fn len(&self, kind: MediaKind) -> usize {
        self.map(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.movie.is_empty() && self.series.is_empty()
    }
}

/// Shared, concurrently readable genre cache.
#[derive(Debug, Default)]
pub struct GenreCatalogCache {
    current: RwLock<GenreSnapshot>,
}

impl GenreCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current maps. Cheap: clones two `Arc`s.
    pub fn snapshot(&self) -> GenreSnapshot {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Cached name, or `None` if not fetched yet.
    pub fn resolve(&self, id: u32) -> Option<String> {
        self.snapshot().resolve(id).map(str::to_owned)
    }

    pub fn resolve_for(&self, kind: MediaKind, id: u32) -> Option<String> {
        self.snapshot().resolve_for(kind, id).map(str::to_owned)
    }

    /// Display label: the cached name, or an empty string when unresolved.
    pub fn label(&self, id: u32) -> String {
        self.resolve(id).unwrap_or_default()
    }

    /// Replace the whole mapping for one media type.
    pub fn replace(&self, kind: MediaKind, genres: impl IntoIterator<Item = Genre>) {
        let map = Arc::new(to_map(genres));
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match kind {
            MediaKind::Movie => current.movie = map,
            MediaKind::Series => current.series = map,
        }
    }

    /// Fetch a fresh mapping and swap it in.
    ///
    /// On error the previous mapping stays in place.
    pub async fn refresh<F, E>(&self, kind: MediaKind, fetch: F) -> Result<usize, E>
    where
        F: Future<Output = Result<Vec<Genre>, E>>,
        E: std::fmt::Display,
    {
        match fetch.await {
            Ok(genres) => {
                let count = genres.len();
                self.replace(kind, genres);
                tracing::debug!(%kind, count, "Genre catalog refreshed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Genre refresh failed, keeping cached names");
                Err(e)
            }
        }
    }
}

fn to_map(genres: impl IntoIterator<Item = Genre>) -> HashMap<u32, String> {
    genres.into_iter().map(|g| (g.id, g.name)).collect()
}
