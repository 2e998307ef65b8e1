use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::error::{classify_list_delete, classify_mutation, parse_payload};
use super::types::{
    CreateListBody, CreateListResponse, FavoriteBody, GenreListResponse, ListDetails,
    ListItemBody, Paged, RatingBody, TmdbTitle, WatchlistBody,
};
use crate::credentials::{Credential, CredentialProvider};
use crate::error::SyncError;
use crate::traits::{
    validate_rating, AccountListService, ListRef, MediaRef, MediaType, MetadataService,
    RatingTarget, RemoteGenre, RemoteTitle, SearchPage, Visibility,
};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TMDB never serves more pages than this.
const MAX_PAGES: u32 = 500;

/// Connection settings for [`TmdbClient`].
#[derive(Debug, Clone)]
pub struct TmdbSettings {
    pub base_url: Url,
    /// Used for catalog calls when no bearer credential is available.
    pub api_key: Option<String>,
    pub language: String,
    pub timeout: Duration,
}

impl TmdbSettings {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_key: None,
            language: "en-US".into(),
            timeout: Duration::from_secs(15),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
    Delete,
}

/// A fully described request, built without I/O.
#[derive(Debug, Clone, PartialEq)]
struct Call {
    verb: Verb,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
}

impl Call {
    fn get(path: String) -> Self {
        Self {
            verb: Verb::Get,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn post(path: String, body: impl Serialize) -> Self {
        Self {
            verb: Verb::Post,
            path,
            query: Vec::new(),
            body: serde_json::to_value(body).ok(),
        }
    }

    fn delete(path: String) -> Self {
        Self {
            verb: Verb::Delete,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

/// TMDB v3 REST client.
pub struct TmdbClient {
    settings: TmdbSettings,
    credentials: Arc<dyn CredentialProvider>,
    http: Client,
}

impl TmdbClient {
    pub fn new(settings: TmdbSettings, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            settings,
            credentials,
            http: Client::new(),
        }
    }

    /// The current credential, or `AuthRejected` without touching the network.
    fn credential(&self) -> Result<Credential, SyncError> {
        self.credentials.credential().ok_or_else(|| {
            tracing::warn!("No TMDB credential configured");
            SyncError::AuthRejected("no access token configured".into())
        })
    }

    fn url(&self, path: &str) -> Result<Url, SyncError> {
        let base = self.settings.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| SyncError::rejected(None, format!("bad request URL: {e}")))
    }

    /// Send a call and return `(status, body)`. Transport errors only.
    async fn send(&self, call: &Call, token: Option<&str>) -> Result<(u16, String), SyncError> {
        let url = self.url(&call.path)?;
        let mut req = match call.verb {
            Verb::Get => self.http.get(url),
            Verb::Post => self.http.post(url),
            Verb::Delete => self.http.delete(url),
        }
        .timeout(self.settings.timeout)
        .query(&call.query);

        match (token, self.settings.api_key.as_deref()) {
            (Some(token), _) => req = req.bearer_auth(token),
            (None, Some(key)) => req = req.query(&[("api_key", key)]),
            (None, None) => {
                return Err(SyncError::AuthRejected(
                    "no access token or API key configured".into(),
                ))
            }
        }
        if let Some(body) = &call.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        tracing::debug!(verb = ?call.verb, path = %call.path, status, "TMDB response");
        Ok((status, body))
    }

    /// Catalog call: bearer token when available, API key otherwise.
    async fn send_catalog(&self, call: &Call) -> Result<(u16, String), SyncError> {
        let token = self.credentials.credential().map(|c| c.token);
        self.send(call, token.as_deref()).await
    }

    async fn mutate(&self, call: &Call, token: &str) -> Result<(), SyncError> {
        let (status, body) = self.send(call, Some(token)).await?;
        classify_mutation(status, &body).inspect_err(|e| {
            tracing::warn!(path = %call.path, status, error = %e, "TMDB mutation failed");
        })
    }
}

// ── Request builders ────────────────────────────────────────────

fn membership_call(account_id: u64, item: MediaRef, list: ListRef, included: bool) -> Call {
    match list {
        ListRef::Watchlist => Call::post(
            format!("/account/{account_id}/watchlist"),
            WatchlistBody {
                media_type: item.media_type,
                media_id: item.id,
                watchlist: included,
            },
        ),
        ListRef::Favorites => Call::post(
            format!("/account/{account_id}/favorite"),
            FavoriteBody {
                media_type: item.media_type,
                media_id: item.id,
                favorite: included,
            },
        ),
        ListRef::Custom(list_id) => {
            let action = if included { "add_item" } else { "remove_item" };
            Call::post(
                format!("/list/{list_id}/{action}"),
                ListItemBody { media_id: item.id },
            )
        }
    }
}

fn rating_path(target: RatingTarget) -> String {
    match target {
        RatingTarget::Title(item) => format!("/{}/{}/rating", item.media_type, item.id),
        RatingTarget::Episode {
            series_id,
            season,
            episode,
        } => format!("/tv/{series_id}/season/{season}/episode/{episode}/rating"),
    }
}

/// Paged account collection: `collection` is `watchlist` or `favorite`.
fn account_list_path(account_id: u64, collection: &str, media_type: MediaType) -> String {
    let segment = match media_type {
        MediaType::Movie => "movies",
        MediaType::Tv => "tv",
    };
    format!("/account/{account_id}/{collection}/{segment}")
}

/// Drop repeated `(id, media_type)` pairs, keeping the first.
/// Page to request after `current`, bounded by the reported total and
/// [`MAX_PAGES`]. The page number echoed by the server is not trusted.
fn next_page(current: u32, total_pages: u32) -> Option<u32> {
    (current < total_pages.min(MAX_PAGES)).then_some(current + 1)
}

fn dedup_titles(titles: impl IntoIterator<Item = RemoteTitle>) -> Vec<RemoteTitle> {
    let mut seen = HashSet::new();
    titles
        .into_iter()
        .filter(|t| seen.insert((t.id, t.media_type)))
        .collect()
}

impl MetadataService for TmdbClient {
    async fn fetch_genres(&self, media_type: MediaType) -> Result<Vec<RemoteGenre>, SyncError> {
        let call = Call::get(format!("/genre/{media_type}/list"))
            .param("language", &self.settings.language);
        let (status, body) = self.send_catalog(&call).await?;
        let list: GenreListResponse = parse_payload(status, &body)?;
        tracing::debug!(%media_type, count = list.genres.len(), "Fetched genres");
        Ok(list.genres)
    }

    #[tracing::instrument(name = "title_details", skip(self))]
    async fn fetch_title_details(&self, item: MediaRef) -> Result<RemoteTitle, SyncError> {
        let call = Call::get(format!("/{}/{}", item.media_type, item.id))
            .param("language", &self.settings.language);
        let (status, body) = self.send_catalog(&call).await?;
        let title: TmdbTitle = parse_payload(status, &body)?;
        title
            .into_remote(Some(item.media_type))
            .ok_or_else(|| SyncError::MalformedResponse(format!("{item} has no media type")))
    }

    #[tracing::instrument(name = "search", skip(self))]
    async fn search_titles(&self, query: &str, page: u32) -> Result<SearchPage, SyncError> {
        let call = Call::get("/search/multi".into())
            .param("query", query)
            .param("page", page.max(1))
            .param("include_adult", false)
            .param("language", &self.settings.language);
        let (status, body) = self.send_catalog(&call).await?;
        let paged: Paged<TmdbTitle> = parse_payload(status, &body)?;

        let items = dedup_titles(paged.results.into_iter().filter_map(|t| t.into_remote(None)));
        Ok(SearchPage {
            items,
            page: paged.page,
            total_pages: paged.total_pages,
        })
    }
}

impl AccountListService for TmdbClient {
    #[tracing::instrument(name = "set_membership", skip(self))]
    async fn set_membership(
        &self,
        item: MediaRef,
        list: ListRef,
        included: bool,
    ) -> Result<(), SyncError> {
        let cred = self.credential()?;
        let call = membership_call(cred.account_id, item, list, included);
        self.mutate(&call, &cred.token).await?;
        tracing::info!(%item, %list, included, "Membership updated");
        Ok(())
    }

    async fn set_rating(&self, target: RatingTarget, value: f32) -> Result<(), SyncError> {
        let value = validate_rating(value)?;
        let cred = self.credential()?;
        let call = Call::post(rating_path(target), RatingBody { value });
        self.mutate(&call, &cred.token).await?;
        tracing::info!(%target, value, "Rating set");
        Ok(())
    }

    async fn clear_rating(&self, target: RatingTarget) -> Result<(), SyncError> {
        let cred = self.credential()?;
        let call = Call::delete(rating_path(target));
        self.mutate(&call, &cred.token).await?;
        tracing::info!(%target, "Rating cleared");
        Ok(())
    }

    async fn create_list(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> Result<ListRef, SyncError> {
        let cred = self.credential()?;
        let call = Call::post(
            "/list".into(),
            CreateListBody {
                name,
                description,
                language: &self.settings.language,
                public: visibility == Visibility::Public,
            },
        );
        let (status, body) = self.send(&call, Some(&cred.token)).await?;
        let created: CreateListResponse = parse_payload(status, &body)?;
        if created.success == Some(false) {
            return Err(SyncError::rejected(
                Some(status),
                created
                    .status_message
                    .unwrap_or_else(|| "list was not created".into()),
            ));
        }
        let id = created
            .list_id
            .ok_or_else(|| SyncError::MalformedResponse("missing list_id".into()))?;
        tracing::info!(list_id = id, name, "Created list");
        Ok(ListRef::Custom(id))
    }

    async fn delete_list(&self, list: ListRef) -> Result<(), SyncError> {
        let ListRef::Custom(id) = list else {
            return Err(SyncError::rejected(None, format!("{list} cannot be deleted")));
        };
        let cred = self.credential()?;
        let (status, body) = self
            .send(&Call::delete(format!("/list/{id}")), Some(&cred.token))
            .await?;
        classify_list_delete(status, &body)?;
        tracing::info!(list_id = id, "Deleted list");
        Ok(())
    }

    #[tracing::instrument(name = "list_items", skip(self))]
    async fn list_items(&self, list: ListRef, media_type: MediaType) -> Result<Vec<u64>, SyncError> {
        let cred = self.credential()?;
        let ids = match list {
            ListRef::Watchlist => {
                let path = account_list_path(cred.account_id, "watchlist", media_type);
                self.paged_ids(&path, &cred.token).await?
            }
            ListRef::Favorites => {
                let path = account_list_path(cred.account_id, "favorite", media_type);
                self.paged_ids(&path, &cred.token).await?
            }
            ListRef::Custom(list_id) => self.custom_list_ids(list_id, media_type, &cred.token).await?,
        };
        tracing::debug!(%list, %media_type, count = ids.len(), "Fetched list items");
        Ok(ids)
    }
}

impl TmdbClient {
    /// Walk every page of an account collection, deduplicating by ID.
    async fn paged_ids(&self, path: &str, token: &str) -> Result<Vec<u64>, SyncError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut page = 1;
        loop {
            let call = Call::get(path.to_owned()).param("page", page);
            let (status, body) = self.send(&call, Some(token)).await?;
            let paged: Paged<TmdbTitle> = parse_payload(status, &body)?;
            ids.extend(paged.results.iter().map(|t| t.id).filter(|id| seen.insert(*id)));

            match next_page(page, paged.total_pages) {
                Some(next) => page = next,
                None => return Ok(ids),
            }
        }
    }

    /// Custom lists come back whole. Items without a type are movies.
    async fn custom_list_ids(
        &self,
        list_id: u64,
        media_type: MediaType,
        token: &str,
    ) -> Result<Vec<u64>, SyncError> {
        let (status, body) = self
            .send(&Call::get(format!("/list/{list_id}")), Some(token))
            .await?;
        let details: ListDetails = parse_payload(status, &body)?;
        let mut seen = HashSet::new();
        Ok(details
            .items
            .iter()
            .filter(|t| t.resolved_media_type(Some(MediaType::Movie)) == Some(media_type))
            .map(|t| t.id)
            .filter(|id| seen.insert(*id))
            .collect())
    }
}
