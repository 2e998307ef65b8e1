use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use crate::error::MarqueeError;
use crate::events::{ChangeFeed, StoreEvent};
use crate::models::{Category, Genre, MediaKind, PersonalPatch, ShowKey, ShowMetadata, ShowRecord};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_genres_and_preferences.sql");

const SHOW_COLUMNS: &str = "external_id, is_movie, title, summary, poster_ref, backdrop_ref,
     genre_ids, public_rating, release_date, total_episodes, category, personal_rating,
     start_date, finish_date, rewatch_count, episodes_seen, added_at, updated_at";

/// SQLite-backed store of tracked titles.
///
/// Single source of truth for the user's library. Every committed mutation is
/// announced on the store's [`ChangeFeed`].
pub struct Storage {
    conn: Connection,
    feed: ChangeFeed,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, MarqueeError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn,
            feed: ChangeFeed::default(),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, MarqueeError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn,
            feed: ChangeFeed::default(),
        })
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    // ── Tracked shows ───────────────────────────────────────────

    /// Insert a title or refresh the metadata of an existing one.
    ///
    /// Metadata is always overwritten. Personal fields only change where
    /// `patch` supplies a value, so a plain metadata refresh never clobbers
    /// the user's category, rating, dates or counters. New records default
    /// to [`Category::Watching`].
    pub fn upsert(
        &self,
        metadata: &ShowMetadata,
        patch: &PersonalPatch,
    ) -> Result<ShowRecord, MarqueeError> {
        let key = metadata.key();
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now();

        let existing = find_record(&tx, key)?;
        let inserted = existing.is_none();
        let previous_category = existing.as_ref().map(|r| r.category);

        let mut record = existing.unwrap_or_else(|| ShowRecord {
            metadata: metadata.clone(),
            category: Category::default(),
            personal_rating: None,
            start_date: None,
            finish_date: None,
            rewatch_count: 0,
            episodes_seen: 0,
            added_at: now,
            updated_at: now,
        });
        record.metadata = ShowMetadata {
            genre_ids: metadata.distinct_genres(),
            ..metadata.clone()
        };
        apply_patch(&mut record, patch, previous_category);
        record.updated_at = now;

        write_record(&tx, &record)?;
        tx.commit()?;

        tracing::debug!(%key, inserted, category = %record.category, "Upserted show");
        self.feed.publish(StoreEvent::Upserted { key, inserted });
        if let Some(previous) = previous_category.filter(|p| *p != record.category) {
            self.feed.publish(StoreEvent::Edited {
                key,
                category: record.category,
                previous_category: previous,
            });
        }
        Ok(record)
    }

    /// Apply a personal-field change to a tracked title.
    pub fn edit(&self, key: ShowKey, patch: &PersonalPatch) -> Result<ShowRecord, MarqueeError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut record = find_record(&tx, key)?.ok_or(MarqueeError::NotTracked(key))?;
        let previous_category = record.category;

        apply_patch(&mut record, patch, Some(previous_category));
        record.updated_at = Utc::now();

        write_record(&tx, &record)?;
        tx.commit()?;

        if previous_category != record.category {
            tracing::info!(
                %key,
                from = %previous_category,
                to = %record.category,
                "Category changed"
            );
        }
        self.feed.publish(StoreEvent::Edited {
            key,
            category: record.category,
            previous_category,
        });
        Ok(record)
    }

    /// Delete a title and its episode markers. Returns whether it existed.
    ///
    /// Removing an absent title is a no-op.
    pub fn remove(&self, key: ShowKey) -> Result<bool, MarqueeError> {
        let tx = self.conn.unchecked_transaction()?;
        if !key.is_movie {
            tx.execute(
                "DELETE FROM episode_watch WHERE external_id = ?1",
                params![key.external_id as i64],
            )?;
        }
        let deleted = tx.execute(
            "DELETE FROM show WHERE external_id = ?1 AND is_movie = ?2",
            params![key.external_id as i64, key.is_movie as i32],
        )?;
        tx.commit()?;

        if deleted > 0 {
            tracing::info!(%key, "Removed show");
            self.feed.publish(StoreEvent::Removed { key });
        }
        Ok(deleted > 0)
    }

    /// Get a tracked title by natural key.
    pub fn find(&self, key: ShowKey) -> Result<Option<ShowRecord>, MarqueeError> {
        find_record(&self.conn, key)
    }

    /// Get every tracked title. Order is unspecified; sort explicitly.
    pub fn all(&self) -> Result<Vec<ShowRecord>, MarqueeError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SHOW_COLUMNS} FROM show"))?;
        let rows = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Episode markers ─────────────────────────────────────────

    /// Mark (or unmark) episodes of one season as watched.
    ///
    /// The series must be tracked. `episodes_seen` is recomputed from the
    /// markers and returned.
    pub fn mark_episodes_watched(
        &self,
        external_id: u64,
        season: u32,
        episodes: &[u32],
        watched: bool,
    ) -> Result<u32, MarqueeError> {
        let key = ShowKey::series(external_id);
        let tx = self.conn.unchecked_transaction()?;
        if find_record(&tx, key)?.is_none() {
            return Err(MarqueeError::NotTracked(key));
        }

        for episode in episodes {
            if watched {
                tx.execute(
                    "INSERT OR IGNORE INTO episode_watch (external_id, season, episode, watched_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![external_id as i64, season, episode, Utc::now().to_rfc3339()],
                )?;
            } else {
                tx.execute(
                    "DELETE FROM episode_watch
                     WHERE external_id = ?1 AND season = ?2 AND episode = ?3",
                    params![external_id as i64, season, episode],
                )?;
            }
        }

        let episodes_seen: u32 = tx.query_row(
            "SELECT COUNT(*) FROM episode_watch WHERE external_id = ?1",
            params![external_id as i64],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE show SET episodes_seen = ?1, updated_at = ?2
             WHERE external_id = ?3 AND is_movie = 0",
            params![episodes_seen, Utc::now().to_rfc3339(), external_id as i64],
        )?;
        tx.commit()?;

        tracing::debug!(external_id, season, watched, episodes_seen, "Toggled episodes");
        self.feed.publish(StoreEvent::EpisodesChanged {
            external_id,
            season,
            episodes_seen,
        });
        Ok(episodes_seen)
    }

    /// Watched episode numbers of one season, ascending.
    pub fn watched_episodes(&self, external_id: u64, season: u32) -> Result<Vec<u32>, MarqueeError> {
        let mut stmt = self.conn.prepare(
            "SELECT episode FROM episode_watch
             WHERE external_id = ?1 AND season = ?2 ORDER BY episode",
        )?;
        let rows = stmt
            .query_map(params![external_id as i64, season], |row| row.get(0))?
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(rows)
    }

    /// Whether episodes `1..=episode_count` of a season are all marked.
    pub fn is_season_watched(
        &self,
        external_id: u64,
        season: u32,
        episode_count: u32,
    ) -> Result<bool, MarqueeError> {
        if episode_count == 0 {
            return Ok(false);
        }
        let marked: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM episode_watch
             WHERE external_id = ?1 AND season = ?2 AND episode BETWEEN 1 AND ?3",
            params![external_id as i64, season, episode_count],
            |row| row.get(0),
        )?;
        Ok(marked == episode_count)
    }

    // ── Genres ──────────────────────────────────────────────────

    /// Replace the stored genre names for one media type.
    pub fn save_genres(&self, kind: MediaKind, genres: &[Genre]) -> Result<(), MarqueeError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM genre WHERE media_type = ?1",
            params![kind.as_db_str()],
        )?;
        for genre in genres {
            tx.execute(
                "INSERT OR REPLACE INTO genre (media_type, id, name) VALUES (?1, ?2, ?3)",
                params![kind.as_db_str(), genre.id, genre.name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_genres(&self, kind: MediaKind) -> Result<Vec<Genre>, MarqueeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM genre WHERE media_type = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![kind.as_db_str()], |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Preferences ─────────────────────────────────────────────

    pub fn get_preference(&self, key: &str) -> Result<Option<String>, MarqueeError> {
        self.conn
            .query_row(
                "SELECT value FROM preference WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set_preference(&self, key: &str, value: &str) -> Result<(), MarqueeError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO preference (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_preference(&self, key: &str) -> Result<(), MarqueeError> {
        self.conn
            .execute("DELETE FROM preference WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ── Patch application ───────────────────────────────────────────

/// Apply the supplied personal fields to a record.
///
/// `previous` is the category before this change (`None` for a new record).
/// Moving into `Watched` sets `episodes_seen` to the known episode total once,
/// at the transition.
fn apply_patch(record: &mut ShowRecord, patch: &PersonalPatch, previous: Option<Category>) {
    if let Some(category) = patch.category {
        record.category = category;
    }
    if let Some(rating) = patch.personal_rating {
        record.personal_rating = rating.map(|r| r.min(10));
    }
    if let Some(date) = patch.start_date {
        record.start_date = date;
    }
    if let Some(date) = patch.finish_date {
        record.finish_date = date;
    }
    if let Some(count) = patch.rewatch_count {
        record.rewatch_count = count;
    }
    if let Some(seen) = patch.episodes_seen {
        record.episodes_seen = seen;
    }

    if record.category == Category::Watched && previous != Some(Category::Watched) {
        if let Some(total) = record.metadata.total_episodes {
            record.episodes_seen = total;
        }
    }
}

fn find_record(conn: &Connection, key: ShowKey) -> Result<Option<ShowRecord>, MarqueeError> {
    conn.query_row(
        &format!("SELECT {SHOW_COLUMNS} FROM show WHERE external_id = ?1 AND is_movie = ?2"),
        params![key.external_id as i64, key.is_movie as i32],
        row_to_record,
    )
    .optional()
    .map_err(Into::into)
}

fn write_record(conn: &Connection, record: &ShowRecord) -> Result<(), MarqueeError> {
    let meta = &record.metadata;
    let genres_json =
        serde_json::to_string(&meta.genre_ids).map_err(|e| MarqueeError::Parse(e.to_string()))?;
    conn.execute(
        &format!(
            "INSERT INTO show ({SHOW_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(external_id, is_movie) DO UPDATE SET
               title = excluded.title,
               summary = excluded.summary,
               poster_ref = excluded.poster_ref,
               backdrop_ref = excluded.backdrop_ref,
               genre_ids = excluded.genre_ids,
               public_rating = excluded.public_rating,
               release_date = excluded.release_date,
               total_episodes = excluded.total_episodes,
               category = excluded.category,
               personal_rating = excluded.personal_rating,
               start_date = excluded.start_date,
               finish_date = excluded.finish_date,
               rewatch_count = excluded.rewatch_count,
               episodes_seen = excluded.episodes_seen,
               updated_at = excluded.updated_at"
        ),
        params![
            meta.external_id as i64,
            meta.is_movie as i32,
            meta.title,
            meta.summary,
            meta.poster_ref,
            meta.backdrop_ref,
            genres_json,
            meta.public_rating,
            meta.release_date,
            meta.total_episodes,
            record.category.as_db_str(),
            record.personal_rating,
            record.start_date.map(|d| d.to_string()),
            record.finish_date.map(|d| d.to_string()),
            record.rewatch_count,
            record.episodes_seen,
            record.added_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), MarqueeError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

/// Parse a datetime string from SQLite (either RFC 3339 or SQLite's `datetime('now')` format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::default()
}

fn parse_personal_date(s: Option<String>) -> Option<NaiveDate> {
    let s = s?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| tracing::debug!(value = %s, error = %e, "Ignoring unreadable date"))
        .ok()
}

// ── Row mapping ─────────────────────────────────────────────────

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShowRecord> {
    let genres_str: String = row.get(6)?;
    let genre_ids: Vec<u32> = serde_json::from_str(&genres_str)
        .map_err(|e| {
            tracing::debug!(value = %genres_str, error = %e, "Ignoring unreadable genre list")
        })
        .unwrap_or_default();
    let category_str: String = row.get(10)?;
    let added_str: String = row.get(16)?;
    let updated_str: String = row.get(17)?;

    Ok(ShowRecord {
        metadata: ShowMetadata {
            external_id: row.get::<_, i64>(0)? as u64,
            is_movie: row.get::<_, i32>(1)? != 0,
            title: row.get(2)?,
            summary: row.get(3)?,
            poster_ref: row.get(4)?,
            backdrop_ref: row.get(5)?,
            genre_ids,
            public_rating: row.get(7)?,
            release_date: row.get(8)?,
            total_episodes: row.get(9)?,
        },
        category: Category::from_db_str(&category_str).unwrap_or_else(|| {
            tracing::debug!(value = %category_str, "Unknown category, using default");
            Category::default()
        }),
        personal_rating: row.get(11)?,
        start_date: parse_personal_date(row.get(12)?),
        finish_date: parse_personal_date(row.get(13)?),
        rewatch_count: row.get(14)?,
        episodes_seen: row.get(15)?,
        added_at: parse_datetime(&added_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaking_bad() -> ShowMetadata {
        ShowMetadata {
            summary: Some("A chemistry teacher turns to crime.".into()),
            genre_ids: vec![18, 80, 18],
            public_rating: Some(8.9),
            release_date: Some("2008-01-20".into()),
            total_episodes: Some(62),
            ..ShowMetadata::new(ShowKey::series(1396), "Breaking Bad")
        }
    }

    fn the_matrix() -> ShowMetadata {
        ShowMetadata {
            genre_ids: vec![28, 878],
            public_rating: Some(8.2),
            release_date: Some("1999-03-30".into()),
            ..ShowMetadata::new(ShowKey::movie(603), "The Matrix")
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_insert_defaults_to_watching() {
        let db = Storage::open_memory().unwrap();
        let record = db.upsert(&the_matrix(), &PersonalPatch::default()).unwrap();
        assert_eq!(record.category, Category::Watching);
        assert_eq!(record.episodes_seen, 0);

        let fetched = db.find(ShowKey::movie(603)).unwrap().unwrap();
        assert_eq!(fetched.title(), "The Matrix");
        assert_eq!(fetched.metadata.genre_ids, vec![28, 878]);
        assert_eq!(fetched.metadata.public_rating, Some(8.2));
    }

    #[test]
    fn test_genre_ids_are_deduplicated_in_order() {
        let db = Storage::open_memory().unwrap();
        let record = db
            .upsert(&breaking_bad(), &PersonalPatch::default())
            .unwrap();
        assert_eq!(record.metadata.genre_ids, vec![18, 80]);
    }

    #[test]
    fn test_metadata_refresh_preserves_personal_fields() {
        let db = Storage::open_memory().unwrap();
        let patch = PersonalPatch {
            category: Some(Category::OnHold),
            personal_rating: Some(Some(9)),
            start_date: Some(Some(date("2024-01-05"))),
            finish_date: Some(Some(date("2024-02-01"))),
            rewatch_count: Some(2),
            episodes_seen: Some(17),
        };
        db.upsert(&breaking_bad(), &patch).unwrap();

        let fresh = ShowMetadata {
            title: "Breaking Bad (Remastered)".into(),
            public_rating: Some(9.1),
            ..breaking_bad()
        };
        let refreshed = db.upsert(&fresh, &PersonalPatch::default()).unwrap();

        assert_eq!(refreshed.title(), "Breaking Bad (Remastered)");
        assert_eq!(refreshed.metadata.public_rating, Some(9.1));
        assert_eq!(refreshed.category, Category::OnHold);
        assert_eq!(refreshed.personal_rating, Some(9));
        assert_eq!(refreshed.start_date, Some(date("2024-01-05")));
        assert_eq!(refreshed.finish_date, Some(date("2024-02-01")));
        assert_eq!(refreshed.rewatch_count, 2);
        assert_eq!(refreshed.episodes_seen, 17);
    }

    #[test]
    fn test_watched_transition_coerces_episode_count() {
        let db = Storage::open_memory().unwrap();
        let meta = ShowMetadata {
            total_episodes: Some(12),
            ..ShowMetadata::new(ShowKey::series(95479), "Jujutsu Kaisen")
        };
        db.upsert(&meta, &PersonalPatch::category(Category::PlanToWatch))
            .unwrap();

        let edited = db
            .edit(meta.key(), &PersonalPatch::category(Category::Watched))
            .unwrap();
        assert_eq!(edited.episodes_seen, 12);
    }

    #[test]
    fn test_coercion_happens_once_at_transition() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&breaking_bad(), &PersonalPatch::category(Category::Watched))
            .unwrap();
        assert_eq!(db.find(ShowKey::series(1396)).unwrap().unwrap().episodes_seen, 62);

        let lowered = db
            .edit(
                ShowKey::series(1396),
                &PersonalPatch {
                    episodes_seen: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(lowered.category, Category::Watched);
        assert_eq!(lowered.episodes_seen, 40);
    }

    #[test]
    fn test_watched_movie_has_no_episode_total() {
        let db = Storage::open_memory().unwrap();
        let record = db
            .upsert(&the_matrix(), &PersonalPatch::category(Category::Watched))
            .unwrap();
        assert_eq!(record.episodes_seen, 0);
    }

    #[test]
    fn test_rating_is_clamped_and_clearable() {
        let db = Storage::open_memory().unwrap();
        let key = ShowKey::movie(603);
        db.upsert(&the_matrix(), &PersonalPatch::default()).unwrap();

        let rated = db
            .edit(
                key,
                &PersonalPatch {
                    personal_rating: Some(Some(14)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(rated.personal_rating, Some(10));

        let cleared = db
            .edit(
                key,
                &PersonalPatch {
                    personal_rating: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.personal_rating, None);
    }

    #[test]
    fn test_edit_untracked_fails() {
        let db = Storage::open_memory().unwrap();
        let err = db
            .edit(ShowKey::movie(1), &PersonalPatch::category(Category::Dropped))
            .unwrap_err();
        assert!(matches!(err, MarqueeError::NotTracked(k) if k == ShowKey::movie(1)));
    }

    #[test]
    fn test_movie_and_series_with_same_id_are_distinct() {
        let db = Storage::open_memory().unwrap();
        db.upsert(
            &ShowMetadata::new(ShowKey::movie(42), "Forty-Two the Movie"),
            &PersonalPatch::default(),
        )
        .unwrap();
        db.upsert(
            &ShowMetadata::new(ShowKey::series(42), "Forty-Two the Series"),
            &PersonalPatch::category(Category::Dropped),
        )
        .unwrap();

        assert_eq!(db.all().unwrap().len(), 2);
        assert_eq!(
            db.find(ShowKey::movie(42)).unwrap().unwrap().category,
            Category::Watching
        );
        assert_eq!(
            db.find(ShowKey::series(42)).unwrap().unwrap().category,
            Category::Dropped
        );
    }

    #[test]
    fn test_remove_is_idempotent_and_cascades() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&breaking_bad(), &PersonalPatch::default())
            .unwrap();
        db.mark_episodes_watched(1396, 1, &[1, 2, 3], true).unwrap();

        assert!(db.remove(ShowKey::series(1396)).unwrap());
        assert!(db.watched_episodes(1396, 1).unwrap().is_empty());
        assert!(db.find(ShowKey::series(1396)).unwrap().is_none());

        assert!(!db.remove(ShowKey::series(1396)).unwrap());
        assert!(db.all().unwrap().is_empty());
    }

    #[test]
    fn test_removing_movie_keeps_series_markers() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&ShowMetadata::new(ShowKey::movie(1396), "Other"), &PersonalPatch::default())
            .unwrap();
        db.upsert(&breaking_bad(), &PersonalPatch::default())
            .unwrap();
        db.mark_episodes_watched(1396, 1, &[1], true).unwrap();

        db.remove(ShowKey::movie(1396)).unwrap();
        assert_eq!(db.watched_episodes(1396, 1).unwrap(), vec![1]);
    }

    #[test]
    fn test_episode_markers_update_seen_count() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&breaking_bad(), &PersonalPatch::default())
            .unwrap();

        assert_eq!(db.mark_episodes_watched(1396, 1, &[3, 1, 2], true).unwrap(), 3);
        assert_eq!(db.mark_episodes_watched(1396, 2, &[1], true).unwrap(), 4);
        // Marking twice doesn't double count.
        assert_eq!(db.mark_episodes_watched(1396, 1, &[1], true).unwrap(), 4);
        assert_eq!(db.mark_episodes_watched(1396, 1, &[2], false).unwrap(), 3);

        assert_eq!(db.watched_episodes(1396, 1).unwrap(), vec![1, 3]);
        let record = db.find(ShowKey::series(1396)).unwrap().unwrap();
        assert_eq!(record.episodes_seen, 3);
    }

    #[test]
    fn test_season_fully_watched() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&breaking_bad(), &PersonalPatch::default())
            .unwrap();
        db.mark_episodes_watched(1396, 1, &[1, 2, 3, 4, 5, 6], true)
            .unwrap();

        assert!(!db.is_season_watched(1396, 1, 7).unwrap());
        db.mark_episodes_watched(1396, 1, &[7], true).unwrap();
        assert!(db.is_season_watched(1396, 1, 7).unwrap());
        assert!(!db.is_season_watched(1396, 2, 13).unwrap());
        assert!(!db.is_season_watched(1396, 1, 0).unwrap());
    }

    #[test]
    fn test_marking_untracked_series_fails() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&the_matrix(), &PersonalPatch::default()).unwrap();
        let err = db.mark_episodes_watched(603, 1, &[1], true).unwrap_err();
        assert!(matches!(err, MarqueeError::NotTracked(_)));
    }

    #[test]
    fn test_mutations_publish_events() {
        let db = Storage::open_memory().unwrap();
        let mut rx = db.subscribe();

        db.upsert(&the_matrix(), &PersonalPatch::default()).unwrap();
        db.edit(ShowKey::movie(603), &PersonalPatch::category(Category::Watched))
            .unwrap();
        db.remove(ShowKey::movie(603)).unwrap();
        db.remove(ShowKey::movie(603)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Upserted {
                key: ShowKey::movie(603),
                inserted: true
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Edited {
                key: ShowKey::movie(603),
                category: Category::Watched,
                previous_category: Category::Watching,
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Removed {
                key: ShowKey::movie(603)
            }
        );
        // Second remove changed nothing.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_genres_roundtrip_per_media_type() {
        let db = Storage::open_memory().unwrap();
        let movie = vec![
            Genre {
                id: 28,
                name: "Action".into(),
            },
            Genre {
                id: 35,
                name: "Comedy".into(),
            },
        ];
        db.save_genres(MediaKind::Movie, &movie).unwrap();
        db.save_genres(
            MediaKind::Series,
            &[Genre {
                id: 10759,
                name: "Action & Adventure".into(),
            }],
        )
        .unwrap();

        assert_eq!(db.load_genres(MediaKind::Movie).unwrap(), movie);
        db.save_genres(MediaKind::Movie, &movie[..1]).unwrap();
        assert_eq!(db.load_genres(MediaKind::Movie).unwrap().len(), 1);
        assert_eq!(db.load_genres(MediaKind::Series).unwrap().len(), 1);
    }

    #[test]
    fn test_preferences() {
        let db = Storage::open_memory().unwrap();
        assert_eq!(db.get_preference("filter_sort").unwrap(), None);

        db.set_preference("filter_sort", "\"alphabetical\"").unwrap();
        db.set_preference("filter_sort", "\"best_rated\"").unwrap();
        assert_eq!(
            db.get_preference("filter_sort").unwrap().as_deref(),
            Some("\"best_rated\"")
        );

        db.remove_preference("filter_sort").unwrap();
        assert_eq!(db.get_preference("filter_sort").unwrap(), None);
    }

    #[test]
    fn test_unreadable_columns_fall_back() {
        let db = Storage::open_memory().unwrap();
        db.upsert(&the_matrix(), &PersonalPatch::category(Category::Dropped))
            .unwrap();
        db.conn
            .execute(
                "UPDATE show SET genre_ids = 'not json', category = 'someday' WHERE external_id = 603",
                [],
            )
            .unwrap();

        let record = db.find(ShowKey::movie(603)).unwrap().unwrap();
        assert!(record.metadata.genre_ids.is_empty());
        assert_eq!(record.category, Category::default());
        assert_eq!(record.title(), "The Matrix");
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marquee.db");
        {
            let db = Storage::open(&path).unwrap();
            db.upsert(&the_matrix(), &PersonalPatch::category(Category::PlanToWatch))
                .unwrap();
        }
        let db = Storage::open(&path).unwrap();
        let record = db.find(ShowKey::movie(603)).unwrap().unwrap();
        assert_eq!(record.category, Category::PlanToWatch);
    }
}
