use std::path::Path;

use tokio::sync::{broadcast, mpsc, oneshot};

use marquee_core::error::MarqueeError;
use marquee_core::events::{ChangeFeed, StoreEvent};
use marquee_core::filter::{self, FilterCriteria, SortOrder};
use marquee_core::models::{Genre, MediaKind, PersonalPatch, ShowKey, ShowMetadata, ShowRecord};
use marquee_core::storage::Storage;

type Reply<T> = oneshot::Sender<Result<T, MarqueeError>>;

/// Async handle to the store. All access goes through one dedicated thread,
/// so writes are serialized.
#[derive(Clone)]
pub struct DbHandle {
    tx: mpsc::UnboundedSender<DbCommand>,
    feed: ChangeFeed,
}

enum DbCommand {
    Upsert {
        metadata: Box<ShowMetadata>,
        patch: PersonalPatch,
        reply: Reply<ShowRecord>,
    },
    Edit {
        key: ShowKey,
        patch: PersonalPatch,
        reply: Reply<ShowRecord>,
    },
    Remove {
        key: ShowKey,
        reply: Reply<bool>,
    },
    Find {
        key: ShowKey,
        reply: Reply<Option<ShowRecord>>,
    },
    All {
        reply: Reply<Vec<ShowRecord>>,
    },
    MarkEpisodes {
        external_id: u64,
        season: u32,
        episodes: Vec<u32>,
        watched: bool,
        reply: Reply<u32>,
    },
    WatchedEpisodes {
        external_id: u64,
        season: u32,
        reply: Reply<Vec<u32>>,
    },
    IsSeasonWatched {
        external_id: u64,
        season: u32,
        episode_count: u32,
        reply: Reply<bool>,
    },
    SaveGenres {
        kind: MediaKind,
        genres: Vec<Genre>,
        reply: Reply<()>,
    },
    LoadGenres {
        kind: MediaKind,
        reply: Reply<Vec<Genre>>,
    },
    LoadFilter {
        reply: Reply<(FilterCriteria, SortOrder)>,
    },
    SaveFilter {
        criteria: FilterCriteria,
        sort: SortOrder,
        reply: Reply<()>,
    },
    ResetFilter {
        reply: Reply<()>,
    },
}

impl DbHandle {
    pub fn open(path: &Path) -> Result<Self, MarqueeError> {
        let storage = Storage::open(path).inspect_err(|e| {
            tracing::error!(path = %path.display(), "Failed to open database: {e}")
        })?;
        Self::spawn(storage)
    }

    /// In-memory store (for tests).
    pub fn open_memory() -> Result<Self, MarqueeError> {
        Self::spawn(Storage::open_memory()?)
    }

    fn spawn(storage: Storage) -> Result<Self, MarqueeError> {
        let feed = storage.feed().clone();
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("db-actor".into())
            .spawn(move || actor_loop(storage, rx))
            .inspect_err(|e| tracing::error!("Failed to spawn DB thread: {e}"))?;

        Ok(Self { tx, feed })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T, MarqueeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(command(reply));
        rx.await
            .unwrap_or_else(|_| Err(MarqueeError::Config("DB actor closed".into())))
    }

    pub async fn upsert(
        &self,
        metadata: ShowMetadata,
        patch: PersonalPatch,
    ) -> Result<ShowRecord, MarqueeError> {
        self.request(|reply| DbCommand::Upsert {
            metadata: Box::new(metadata),
            patch,
            reply,
        })
        .await
    }

    pub async fn edit(&self, key: ShowKey, patch: PersonalPatch) -> Result<ShowRecord, MarqueeError> {
        self.request(|reply| DbCommand::Edit { key, patch, reply })
            .await
    }

    pub async fn remove(&self, key: ShowKey) -> Result<bool, MarqueeError> {
        self.request(|reply| DbCommand::Remove { key, reply }).await
    }

    pub async fn find(&self, key: ShowKey) -> Result<Option<ShowRecord>, MarqueeError> {
        self.request(|reply| DbCommand::Find { key, reply }).await
    }

    pub async fn all(&self) -> Result<Vec<ShowRecord>, MarqueeError> {
        self.request(|reply| DbCommand::All { reply }).await
    }

    pub async fn mark_episodes(
        &self,
        external_id: u64,
        season: u32,
        episodes: Vec<u32>,
        watched: bool,
    ) -> Result<u32, MarqueeError> {
        self.request(|reply| DbCommand::MarkEpisodes {
            external_id,
            season,
            episodes,
            watched,
            reply,
        })
        .await
    }

    pub async fn watched_episodes(
        &self,
        external_id: u64,
        season: u32,
    ) -> Result<Vec<u32>, MarqueeError> {
        self.request(|reply| DbCommand::WatchedEpisodes {
            external_id,
            season,
            reply,
        })
        .await
    }

    pub async fn is_season_watched(
        &self,
        external_id: u64,
        season: u32,
        episode_count: u32,
    ) -> Result<bool, MarqueeError> {
        self.request(|reply| DbCommand::IsSeasonWatched {
            external_id,
            season,
            episode_count,
            reply,
        })
        .await
    }

    pub async fn save_genres(&self, kind: MediaKind, genres: Vec<Genre>) -> Result<(), MarqueeError> {
        self.request(|reply| DbCommand::SaveGenres {
            kind,
            genres,
            reply,
        })
        .await
    }

    pub async fn load_genres(&self, kind: MediaKind) -> Result<Vec<Genre>, MarqueeError> {
        self.request(|reply| DbCommand::LoadGenres { kind, reply })
            .await
    }

    pub async fn load_filter(&self) -> Result<(FilterCriteria, SortOrder), MarqueeError> {
        self.request(|reply| DbCommand::LoadFilter { reply }).await
    }

    pub async fn save_filter(
        &self,
        criteria: FilterCriteria,
        sort: SortOrder,
    ) -> Result<(), MarqueeError> {
        self.request(|reply| DbCommand::SaveFilter {
            criteria,
            sort,
            reply,
        })
        .await
    }

    pub async fn reset_filter(&self) -> Result<(), MarqueeError> {
        self.request(|reply| DbCommand::ResetFilter { reply }).await
    }
}

fn actor_loop(storage: Storage, mut rx: mpsc::UnboundedReceiver<DbCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            DbCommand::Upsert {
                metadata,
                patch,
                reply,
            } => {
                let _ = reply.send(storage.upsert(&metadata, &patch));
            }
            DbCommand::Edit { key, patch, reply } => {
                let _ = reply.send(storage.edit(key, &patch));
            }
            DbCommand::Remove { key, reply } => {
                let _ = reply.send(storage.remove(key));
            }
            DbCommand::Find { key, reply } => {
                let _ = reply.send(storage.find(key));
            }
            DbCommand::All { reply } => {
                let _ = reply.send(storage.all());
            }
            DbCommand::MarkEpisodes {
                external_id,
                season,
                episodes,
                watched,
                reply,
            } => {
                let _ = reply.send(storage.mark_episodes_watched(
                    external_id,
                    season,
                    &episodes,
                    watched,
                ));
            }
            DbCommand::WatchedEpisodes {
                external_id,
                season,
                reply,
            } => {
                let _ = reply.send(storage.watched_episodes(external_id, season));
            }
            DbCommand::IsSeasonWatched {
                external_id,
                season,
                episode_count,
                reply,
            } => {
                let _ = reply.send(storage.is_season_watched(external_id, season, episode_count));
            }
            DbCommand::SaveGenres {
                kind,
                genres,
                reply,
            } => {
                let _ = reply.send(storage.save_genres(kind, &genres));
            }
            DbCommand::LoadGenres { kind, reply } => {
                let _ = reply.send(storage.load_genres(kind));
            }
            DbCommand::LoadFilter { reply } => {
                let result = FilterCriteria::load(&storage)
                    .and_then(|criteria| Ok((criteria, SortOrder::load(&storage)?)));
                let _ = reply.send(result);
            }
            DbCommand::SaveFilter {
                criteria,
                sort,
                reply,
            } => {
                let result = criteria.save(&storage).and_then(|()| sort.save(&storage));
                let _ = reply.send(result);
            }
            DbCommand::ResetFilter { reply } => {
                let _ = reply.send(filter::reset(&storage));
            }
        }
    }
    tracing::debug!("DB actor stopped");
}
