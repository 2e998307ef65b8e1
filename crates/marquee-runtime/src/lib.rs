mod db;
pub mod reconcile;
mod search;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use marquee_api::tmdb::{TmdbClient, TmdbSettings};
use marquee_api::traits::{
    AccountListService, ListRef, MediaRef, MediaType, MetadataService, RatingTarget, RemoteTitle,
    SearchPage, Visibility,
};
use marquee_api::{EnvCredentials, SyncError};
use marquee_core::config::AppConfig;
use marquee_core::error::MarqueeError;
use marquee_core::events::StoreEvent;
use marquee_core::filter::{FilterCriteria, SortOrder};
use marquee_core::genres::GenreCatalogCache;
use marquee_core::models::{
    Category, Genre, MediaKind, PersonalPatch, ShowKey, ShowMetadata, ShowRecord,
};
use marquee_core::query::{self, QueryContext};

pub use db::DbHandle;
pub use reconcile::{
    Busy, PendingSync, ReconciliationCoordinator, SlotValue, SyncEvent, SyncOutcome, SyncPhase,
    SyncSlot,
};
pub use search::{SearchGate, SearchTicket};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("api error: {0}")]
    Api(#[from] SyncError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Busy(#[from] Busy),
}

impl RuntimeError {
    /// The remote service rejected the credential.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_auth())
    }
}

impl From<MarqueeError> for RuntimeError {
    fn from(e: MarqueeError) -> Self {
        match e {
            MarqueeError::NotTracked(key) => Self::NotFound(format!("{key} is not tracked")),
            MarqueeError::Config(msg) => Self::Config(msg),
            other => Self::Database(other.to_string()),
        }
    }
}

/// Application facade: local store, genre cache, remote catalog and
/// optimistic list sync behind one async API.
pub struct Runtime<S = TmdbClient> {
    config: AppConfig,
    db: DbHandle,
    genres: Arc<GenreCatalogCache>,
    remote: Arc<S>,
    sync: ReconciliationCoordinator<S>,
    search_gate: SearchGate,
}

impl Runtime<TmdbClient> {
    /// Open the default database and connect to TMDB.
    pub async fn open(config: AppConfig) -> Result<Self, RuntimeError> {
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        Self::open_at(config, &db_path).await
    }

    pub async fn open_at(config: AppConfig, db_path: &Path) -> Result<Self, RuntimeError> {
        let db = DbHandle::open(db_path)?;
        let credentials = EnvCredentials::new(
            config.remote.access_token.clone(),
            config.remote.account_id,
        );
        let client = TmdbClient::new(tmdb_settings(&config)?, Arc::new(credentials));
        tracing::info!(db = %db_path.display(), "Runtime ready");
        Self::from_parts(config, db, Arc::new(client)).await
    }
}

/// Client settings from the `[general]` and `[remote]` config sections.
pub fn tmdb_settings(config: &AppConfig) -> Result<TmdbSettings, RuntimeError> {
    let mut settings = TmdbSettings::new(&config.remote.base_url).map_err(|e| {
        RuntimeError::Config(format!("invalid remote.base_url {:?}: {e}", config.remote.base_url))
    })?;
    settings.api_key = config.remote.api_key.clone();
    settings.language = config.general.language.clone();
    settings.timeout = Duration::from_secs(config.remote.timeout_secs.max(1));
    Ok(settings)
}

impl<S> Runtime<S>
where
    S: MetadataService + AccountListService + 'static,
{
    /// Assemble from existing parts. Genre names cached in the store are
    /// loaded so they resolve before the first refresh.
    pub async fn from_parts(
        config: AppConfig,
        db: DbHandle,
        remote: Arc<S>,
    ) -> Result<Self, RuntimeError> {
        let genres = Arc::new(GenreCatalogCache::new());
        for kind in MediaKind::ALL {
            let cached = db.load_genres(*kind).await?;
            if !cached.is_empty() {
                tracing::debug!(%kind, count = cached.len(), "Loaded cached genres");
                genres.replace(*kind, cached);
            }
        }

        Ok(Self {
            config,
            db,
            genres,
            sync: ReconciliationCoordinator::new(Arc::clone(&remote)),
            remote,
            search_gate: SearchGate::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn genres(&self) -> &GenreCatalogCache {
        &self.genres
    }

    pub fn subscribe_store(&self) -> broadcast::Receiver<StoreEvent> {
        self.db.subscribe()
    }

    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    // ── Library ─────────────────────────────────────────────────

    /// Fetch a title's details and track it under `category`.
    ///
    /// With `None`, a new title gets the configured default category and an
    /// already tracked one keeps its own.
    pub async fn track_title(
        &self,
        key: ShowKey,
        category: Option<Category>,
    ) -> Result<ShowRecord, RuntimeError> {
        let remote = self.remote.fetch_title_details(media_ref(key)).await?;
        let patch = match category {
            Some(category) => PersonalPatch::category(category),
            None if self.db.find(key).await?.is_some() => PersonalPatch::default(),
            None => PersonalPatch::category(self.config.general.default_category),
        };
        let record = self.db.upsert(metadata_from_remote(remote), patch).await?;
        tracing::info!(%key, title = record.title(), category = %record.category, "Tracked title");
        Ok(record)
    }

    /// Whether episodes `1..=episode_count` of a season are all marked watched.
    pub async fn is_season_watched(
        &self,
        series_id: u64,
        season: u32,
        episode_count: u32,
    ) -> Result<bool, RuntimeError> {
        Ok(self
            .db
            .is_season_watched(series_id, season, episode_count)
            .await?)
    }

    /// Re-fetch metadata of a tracked title. Personal fields are untouched.
    pub async fn refresh_title(&self, key: ShowKey) -> Result<ShowRecord, RuntimeError> {
        if self.db.find(key).await?.is_none() {
            return Err(RuntimeError::NotFound(format!("{key} is not tracked")));
        }
        let remote = self.remote.fetch_title_details(media_ref(key)).await?;
        Ok(self
            .db
            .upsert(metadata_from_remote(remote), PersonalPatch::default())
            .await?)
    }

    pub async fn find(&self, key: ShowKey) -> Result<Option<ShowRecord>, RuntimeError> {
        Ok(self.db.find(key).await?)
    }

    pub async fn edit(&self, key: ShowKey, patch: PersonalPatch) -> Result<ShowRecord, RuntimeError> {
        Ok(self.db.edit(key, patch).await?)
    }

    /// Stop tracking a title. Returns whether it was tracked.
    pub async fn untrack(&self, key: ShowKey) -> Result<bool, RuntimeError> {
        let removed = self.db.remove(key).await?;
        if removed {
            tracing::info!(%key, "Untracked title");
        }
        Ok(removed)
    }

    pub async fn mark_episodes(
        &self,
        series_id: u64,
        season: u32,
        episodes: Vec<u32>,
        watched: bool,
    ) -> Result<u32, RuntimeError> {
        Ok(self
            .db
            .mark_episodes(series_id, season, episodes, watched)
            .await?)
    }

    pub async fn watched_episodes(&self, series_id: u64, season: u32) -> Result<Vec<u32>, RuntimeError> {
        Ok(self.db.watched_episodes(series_id, season).await?)
    }

    /// The library filtered and sorted by the persisted criteria.
    pub async fn library_view(&self) -> Result<Vec<ShowRecord>, RuntimeError> {
        let (criteria, sort) = self.db.load_filter().await?;
        self.query(&criteria, sort).await
    }

    /// The library filtered and sorted by explicit criteria.
    pub async fn query(
        &self,
        criteria: &FilterCriteria,
        sort: SortOrder,
    ) -> Result<Vec<ShowRecord>, RuntimeError> {
        let records = self.db.all().await?;
        if !criteria.include_keywords.is_empty() || !criteria.exclude_keywords.is_empty() {
            self.ensure_genres().await;
        }
        let ctx = QueryContext::now(self.genres.snapshot());
        Ok(query::evaluate(&records, criteria, sort, &ctx))
    }

    pub async fn load_filter(&self) -> Result<(FilterCriteria, SortOrder), RuntimeError> {
        Ok(self.db.load_filter().await?)
    }

    pub async fn save_filter(
        &self,
        criteria: FilterCriteria,
        sort: SortOrder,
    ) -> Result<(), RuntimeError> {
        Ok(self.db.save_filter(criteria, sort).await?)
    }

    pub async fn reset_filter(&self) -> Result<(), RuntimeError> {
        Ok(self.db.reset_filter().await?)
    }

    // ── Genres ──────────────────────────────────────────────────

    /// Re-fetch one genre mapping and persist it. On failure the cached
    /// names stay in place.
    pub async fn refresh_genres(&self, kind: MediaKind) -> Result<usize, RuntimeError> {
        let remote = Arc::clone(&self.remote);
        let fetch = async move {
            let genres = remote.fetch_genres(media_type(kind)).await?;
            Ok::<_, SyncError>(
                genres
                    .into_iter()
                    .map(|g| Genre {
                        id: g.id,
                        name: g.name,
                    })
                    .collect(),
            )
        };
        let count = self.genres.refresh(kind, fetch).await?;
        self.db
            .save_genres(kind, self.genres.snapshot().genres(kind))
            .await?;
        Ok(count)
    }

    /// Fetch genre names never fetched before. Failures are logged only.
    async fn ensure_genres(&self) {
        let snapshot = self.genres.snapshot();
        for kind in MediaKind::ALL {
            if snapshot.len(*kind) == 0 {
                if let Err(e) = self.refresh_genres(*kind).await {
                    tracing::debug!(%kind, error = %e, "Genre names unavailable");
                }
            }
        }
    }

    // ── Remote catalog ──────────────────────────────────────────

    /// Search the remote catalog. `Ok(None)` means a newer search started
    /// while this one was in flight and its result was discarded.
    pub async fn search(&self, query: &str, page: u32) -> Result<Option<SearchPage>, RuntimeError> {
        let ticket = self.search_gate.begin();
        let query = query.trim();
        if query.is_empty() {
            return Ok(self.search_gate.accept(ticket, SearchPage::default()));
        }
        let result = self.remote.search_titles(query, page).await?;
        Ok(self.search_gate.accept(ticket, result))
    }

    // ── Remote lists ────────────────────────────────────────────

    /// Optimistically add or remove a title from a remote list.
    pub fn set_membership(
        &self,
        key: ShowKey,
        list: ListRef,
        included: bool,
    ) -> Result<PendingSync, RuntimeError> {
        Ok(self.sync.request_membership(media_ref(key), list, included)?)
    }

    pub fn membership(&self, key: ShowKey, list: ListRef) -> bool {
        let slot = SyncSlot::Membership {
            item: media_ref(key),
            list,
        };
        matches!(self.sync.value(slot), SlotValue::Included(true))
    }

    pub fn rate(&self, target: RatingTarget, value: f32) -> Result<PendingSync, RuntimeError> {
        Ok(self.sync.request_rating(target, value)?)
    }

    pub fn clear_rating(&self, target: RatingTarget) -> Result<PendingSync, RuntimeError> {
        Ok(self.sync.request_clear_rating(target)?)
    }

    pub async fn create_list(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> Result<ListRef, RuntimeError> {
        Ok(self.remote.create_list(name, description, visibility).await?)
    }

    pub async fn delete_list(&self, list: ListRef) -> Result<(), RuntimeError> {
        Ok(self.remote.delete_list(list).await?)
    }

    /// Load which titles of `kind` are in `list` remotely, as confirmed state.
    pub async fn seed_membership(&self, list: ListRef, kind: MediaKind) -> Result<usize, RuntimeError> {
        let media_type = media_type(kind);
        let ids = self.remote.list_items(list, media_type).await?;
        for id in &ids {
            let item = MediaRef {
                id: *id,
                media_type,
            };
            self.sync
                .seed(SyncSlot::Membership { item, list }, SlotValue::Included(true));
        }
        tracing::debug!(%list, %kind, count = ids.len(), "Seeded membership");
        Ok(ids.len())
    }
}

// ── Conversions ─────────────────────────────────────────────────

pub fn media_type(kind: MediaKind) -> MediaType {
    MediaType::from_is_movie(kind.is_movie())
}

pub fn media_kind(media_type: MediaType) -> MediaKind {
    MediaKind::from_is_movie(media_type.is_movie())
}

pub fn media_ref(key: ShowKey) -> MediaRef {
    MediaRef {
        id: key.external_id,
        media_type: MediaType::from_is_movie(key.is_movie),
    }
}

pub fn show_key(item: MediaRef) -> ShowKey {
    ShowKey::new(item.id, item.media_type.is_movie())
}

pub fn metadata_from_remote(remote: RemoteTitle) -> ShowMetadata {
    let mut meta = ShowMetadata::new(show_key(remote.media_ref()), remote.title);
    meta.summary = remote.overview;
    meta.poster_ref = remote.poster_path;
    meta.backdrop_ref = remote.backdrop_path;
    meta.genre_ids = remote.genre_ids;
    meta.public_rating = remote.vote_average;
    meta.release_date = remote.release_date;
    meta.total_episodes = remote.total_episodes;
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use marquee_api::traits::RemoteGenre;

    /// In-process catalog and account lists.
    #[derive(Default)]
    struct FakeRemote {
        titles: HashMap<MediaRef, RemoteTitle>,
        movie_genres: Vec<RemoteGenre>,
        offline: AtomicBool,
        reject_lists: bool,
        watchlist: Mutex<Vec<u64>>,
    }

    impl FakeRemote {
        fn check(&self) -> Result<(), SyncError> {
            if self.offline.load(Ordering::SeqCst) {
                Err(SyncError::NetworkUnavailable("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    impl MetadataService for FakeRemote {
        async fn fetch_genres(&self, media_type: MediaType) -> Result<Vec<RemoteGenre>, SyncError> {
            self.check()?;
            Ok(match media_type {
                MediaType::Movie => self.movie_genres.clone(),
                MediaType::Tv => Vec::new(),
            })
        }

        async fn fetch_title_details(&self, item: MediaRef) -> Result<RemoteTitle, SyncError> {
            self.check()?;
            self.titles.get(&item).cloned().ok_or(SyncError::RemoteRejected {
                status: Some(404),
                reason: "not found".into(),
            })
        }

        async fn search_titles(&self, query: &str, page: u32) -> Result<SearchPage, SyncError> {
            self.check()?;
            let needle = query.to_lowercase();
            Ok(SearchPage {
                items: self
                    .titles
                    .values()
                    .filter(|t| t.title.to_lowercase().contains(&needle))
                    .cloned()
                    .collect(),
                page,
                total_pages: 1,
            })
        }
    }

    impl AccountListService for FakeRemote {
        async fn set_membership(&self, item: MediaRef, _: ListRef, included: bool) -> Result<(), SyncError> {
            self.check()?;
            if self.reject_lists {
                return Err(SyncError::RemoteRejected {
                    status: Some(403),
                    reason: "lists are read-only".into(),
                });
            }
            let mut watchlist = self.watchlist.lock().unwrap();
            watchlist.retain(|id| *id != item.id);
            if included {
                watchlist.push(item.id);
            }
            Ok(())
        }

        async fn set_rating(&self, _: RatingTarget, value: f32) -> Result<(), SyncError> {
            self.check()?;
            marquee_api::traits::validate_rating(value).map(|_| ())
        }

        async fn clear_rating(&self, _: RatingTarget) -> Result<(), SyncError> {
            self.check()
        }

        async fn create_list(&self, _: &str, _: &str, _: Visibility) -> Result<ListRef, SyncError> {
            self.check()?;
            Ok(ListRef::Custom(8_000_001))
        }

        async fn delete_list(&self, _: ListRef) -> Result<(), SyncError> {
            self.check()
        }

        async fn list_items(&self, _: ListRef, _: MediaType) -> Result<Vec<u64>, SyncError> {
            self.check()?;
            Ok(self.watchlist.lock().unwrap().clone())
        }
    }

    fn remote_title(item: MediaRef, title: &str, genres: Vec<u32>) -> RemoteTitle {
        RemoteTitle {
            id: item.id,
            media_type: item.media_type,
            title: title.into(),
            overview: Some(format!("About {title}")),
            poster_path: Some(format!("/{}.jpg", item.id)),
            backdrop_path: None,
            genre_ids: genres,
            vote_average: Some(7.0),
            release_date: Some("2020-05-01".into()),
            total_episodes: (item.media_type == MediaType::Tv).then_some(10),
        }
    }

    fn fake() -> FakeRemote {
        let mut remote = FakeRemote {
            movie_genres: vec![
                RemoteGenre {
                    id: 28,
                    name: "Action".into(),
                },
                RemoteGenre {
                    id: 35,
                    name: "Comedy".into(),
                },
            ],
            ..Default::default()
        };
        for (item, title, genres) in [
            (MediaRef::movie(603), "The Matrix", vec![28, 878]),
            (MediaRef::movie(9340), "The Goonies", vec![35, 12]),
            (MediaRef::tv(1396), "Breaking Bad", vec![18, 80]),
        ] {
            remote.titles.insert(item, remote_title(item, title, genres));
        }
        remote
    }

    async fn runtime(remote: FakeRemote) -> Runtime<FakeRemote> {
        Runtime::from_parts(
            AppConfig::default(),
            DbHandle::open_memory().unwrap(),
            Arc::new(remote),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_track_uses_default_category_and_remote_metadata() {
        let rt = runtime(fake()).await;
        let record = rt.track_title(ShowKey::series(1396), None).await.unwrap();

        assert_eq!(record.category, Category::Watching);
        assert_eq!(record.title(), "Breaking Bad");
        assert_eq!(record.metadata.total_episodes, Some(10));
        assert_eq!(record.metadata.genre_ids, vec![18, 80]);
        assert_eq!(record.metadata.poster_ref.as_deref(), Some("/1396.jpg"));
    }

    #[tokio::test]
    async fn test_track_unknown_title_is_api_error() {
        let rt = runtime(fake()).await;
        let err = rt.track_title(ShowKey::movie(1), None).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Api(SyncError::RemoteRejected {
                status: Some(404),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_personal_fields() {
        let rt = runtime(fake()).await;
        let key = ShowKey::movie(603);
        rt.track_title(key, Some(Category::PlanToWatch)).await.unwrap();
        rt.edit(
            key,
            PersonalPatch {
                personal_rating: Some(Some(9)),
                rewatch_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let refreshed = rt.refresh_title(key).await.unwrap();
        assert_eq!(refreshed.category, Category::PlanToWatch);
        assert_eq!(refreshed.personal_rating, Some(9));
        assert_eq!(refreshed.rewatch_count, 2);

        assert!(matches!(
            rt.refresh_title(ShowKey::movie(9340)).await,
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retrack_without_category_keeps_personal_state() {
        let rt = runtime(fake()).await;
        let key = ShowKey::series(1396);
        rt.track_title(key, Some(Category::Watched)).await.unwrap();
        rt.edit(
            key,
            PersonalPatch {
                personal_rating: Some(Some(9)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let again = rt.track_title(key, None).await.unwrap();
        assert_eq!(again.category, Category::Watched);
        assert_eq!(again.episodes_seen, 10);
        assert_eq!(again.personal_rating, Some(9));

        let moved = rt.track_title(key, Some(Category::OnHold)).await.unwrap();
        assert_eq!(moved.category, Category::OnHold);
    }

    #[tokio::test]
    async fn test_season_watched_state() {
        let rt = runtime(fake()).await;
        rt.track_title(ShowKey::series(1396), None).await.unwrap();
        rt.mark_episodes(1396, 1, vec![1, 2, 3], true).await.unwrap();

        assert!(rt.is_season_watched(1396, 1, 3).await.unwrap());
        assert!(!rt.is_season_watched(1396, 1, 7).await.unwrap());
        assert!(!rt.is_season_watched(1396, 2, 3).await.unwrap());

        rt.mark_episodes(1396, 1, vec![2], false).await.unwrap();
        assert!(!rt.is_season_watched(1396, 1, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_untrack_twice_is_noop() {
        let rt = runtime(fake()).await;
        let key = ShowKey::series(1396);
        rt.track_title(key, None).await.unwrap();
        rt.mark_episodes(1396, 1, vec![1, 2], true).await.unwrap();

        assert!(rt.untrack(key).await.unwrap());
        assert!(!rt.untrack(key).await.unwrap());
        assert!(rt.watched_episodes(1396, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_library_view_uses_saved_filter_and_genre_names() {
        let rt = runtime(fake()).await;
        rt.track_title(ShowKey::movie(603), None).await.unwrap();
        rt.track_title(ShowKey::movie(9340), None).await.unwrap();
        rt.track_title(ShowKey::series(1396), Some(Category::Watched))
            .await
            .unwrap();

        rt.save_filter(
            FilterCriteria {
                include_keywords: vec!["comedy".into()],
                ..Default::default()
            },
            SortOrder::Alphabetical,
        )
        .await
        .unwrap();

        // Genre names are fetched on demand for the keyword match.
        let view = rt.library_view().await.unwrap();
        let titles: Vec<&str> = view.iter().map(|r| r.title()).collect();
        assert_eq!(titles, vec!["The Goonies"]);
        assert_eq!(rt.genres().label(28), "Action");

        rt.reset_filter().await.unwrap();
        assert_eq!(rt.library_view().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_genres_persist_and_survive_failed_refresh() {
        let remote = fake();
        let db = DbHandle::open_memory().unwrap();
        let rt = Runtime::from_parts(AppConfig::default(), db.clone(), Arc::new(remote))
            .await
            .unwrap();
        assert_eq!(rt.refresh_genres(MediaKind::Movie).await.unwrap(), 2);

        rt.remote.offline.store(true, Ordering::SeqCst);
        assert!(rt.refresh_genres(MediaKind::Movie).await.is_err());
        assert_eq!(rt.genres().label(35), "Comedy");

        // A fresh runtime over the same store resolves names immediately.
        let again = Runtime::from_parts(AppConfig::default(), db, Arc::new(fake()))
            .await
            .unwrap();
        assert_eq!(again.genres().label(28), "Action");
    }

    #[tokio::test]
    async fn test_rejected_membership_flips_back() {
        let remote = FakeRemote {
            reject_lists: true,
            ..fake()
        };
        let rt = runtime(remote).await;
        let mut events = rt.subscribe_sync();
        let key = ShowKey::movie(42);

        let pending = rt.set_membership(key, ListRef::Watchlist, true).unwrap();
        assert!(rt.membership(key, ListRef::Watchlist));

        let outcome = pending.wait().await;
        assert!(matches!(outcome, SyncOutcome::RolledBack { .. }));
        assert!(!rt.membership(key, ListRef::Watchlist));

        assert!(matches!(events.recv().await.unwrap(), SyncEvent::Pending { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::RolledBack {
                failure: SyncError::RemoteRejected { .. },
                restored: SlotValue::Included(false),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_seed_membership_from_remote_list() {
        let remote = fake();
        remote.watchlist.lock().unwrap().extend([603, 9340]);
        let rt = runtime(remote).await;

        let count = rt
            .seed_membership(ListRef::Watchlist, MediaKind::Movie)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(rt.membership(ShowKey::movie(603), ListRef::Watchlist));
        assert!(!rt.membership(ShowKey::movie(1), ListRef::Watchlist));

        let outcome = rt
            .set_membership(ShowKey::movie(603), ListRef::Watchlist, false)
            .unwrap()
            .wait()
            .await;
        assert_eq!(outcome, SyncOutcome::Confirmed(SlotValue::Included(false)));
        assert!(!rt.membership(ShowKey::movie(603), ListRef::Watchlist));
    }

    #[tokio::test]
    async fn test_invalid_rating_rolls_back() {
        let rt = runtime(fake()).await;
        let target = RatingTarget::Title(MediaRef::movie(603));
        let outcome = rt.rate(target, 12.0).unwrap().wait().await;
        assert!(matches!(
            outcome,
            SyncOutcome::RolledBack {
                restored: SlotValue::Rating(None),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_search_and_lists() {
        let rt = runtime(fake()).await;
        let page = rt.search("matrix", 1).await.unwrap().unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(rt.search("   ", 1).await.unwrap().unwrap().items.is_empty());

        let list = rt.create_list("Weekend", "", Visibility::Private).await.unwrap();
        assert_eq!(list, ListRef::Custom(8_000_001));
        rt.delete_list(list).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_errors_surface_as_api_errors() {
        let remote = fake();
        remote.offline.store(true, Ordering::SeqCst);
        let rt = runtime(remote).await;
        let err = rt.search("matrix", 1).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api(SyncError::NetworkUnavailable(_))));
        assert!(!err.needs_reauth());
    }

    #[tokio::test]
    async fn test_open_at_persists_between_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marquee.db");

        let rt = runtime(fake()).await;
        let record = rt.track_title(ShowKey::movie(603), None).await.unwrap();

        let db = DbHandle::open(&path).unwrap();
        db.upsert(record.metadata.clone(), PersonalPatch::category(Category::Watched))
            .await
            .unwrap();
        drop(db);

        let reopened = Runtime::open_at(AppConfig::default(), &path).await.unwrap();
        let found = reopened.find(ShowKey::movie(603)).await.unwrap().unwrap();
        assert_eq!(found.category, Category::Watched);
        assert_eq!(found.title(), "The Matrix");
    }

    #[test]
    fn test_tmdb_settings_from_config() {
        let mut config = AppConfig::default();
        config.remote.timeout_secs = 0;
        config.general.language = "de-DE".into();
        let settings = tmdb_settings(&config).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert_eq!(settings.language, "de-DE");

        config.remote.base_url = "not a url".into();
        assert!(matches!(tmdb_settings(&config), Err(RuntimeError::Config(_))));
    }
}
