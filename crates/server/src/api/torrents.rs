//! Torrent record API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bangumi_torrent_core::{StorageError, Torrent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Torrent fields accepted from clients. Ids are assigned by the store or taken from the path.
#[derive(Debug, Deserialize)]
pub struct TorrentBody {
    pub name: String,
    pub url: String,
    pub homepage: Option<String>,
    pub rss_id: Option<i64>,
    pub bangumi_id: Option<i64>,
    pub qb_hash: Option<String>,
    #[serde(default)]
    pub downloaded: bool,
}

impl TorrentBody {
    fn into_torrent(self, id: Option<i64>) -> Torrent {
        Torrent {
            id,
            name: self.name,
            url: self.url,
            homepage: self.homepage,
            rss_id: self.rss_id,
            bangumi_id: self.bangumi_id,
            qb_hash: self.qb_hash,
            downloaded: self.downloaded,
        }
    }
}

/// Query parameters for listing torrents
#[derive(Debug, Deserialize)]
pub struct ListTorrentsParams {
    /// Only torrents discovered in this feed
    pub rss_id: Option<i64>,
}

/// Query parameters for single-torrent lookup. Exactly one must be set.
#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub url: Option<String>,
    pub qb_hash: Option<String>,
}

/// Request body for batch hash lookup
#[derive(Debug, Deserialize)]
pub struct HashesBody {
    pub hashes: Vec<String>,
}

/// Request body for assigning a qBittorrent hash
#[derive(Debug, Deserialize)]
pub struct QbHashBody {
    pub qb_hash: String,
}

/// Response for bulk deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TorrentErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<TorrentErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(TorrentErrorResponse {
            error: error.into(),
        }),
    )
}

fn storage_error(e: StorageError) -> ApiError {
    let status = match e {
        StorageError::ConstraintViolation(_) => StatusCode::CONFLICT,
        StorageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// List all torrents, or those of one feed
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTorrentsParams>,
) -> Result<Json<Vec<Torrent>>, ApiError> {
    let db = state.torrents();
    let torrents = match params.rss_id {
        Some(rss_id) => db.search_rss(rss_id),
        None => db.search_all(),
    }
    .map_err(storage_error)?;

    Ok(Json(torrents))
}

/// Store a new torrent
pub async fn add_torrent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TorrentBody>,
) -> Result<(StatusCode, Json<Torrent>), ApiError> {
    let torrent = state
        .torrents()
        .add(body.into_torrent(None))
        .map_err(storage_error)?;

    Ok((StatusCode::CREATED, Json(torrent)))
}

/// Store a batch of new torrents atomically
pub async fn add_torrents(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Vec<TorrentBody>>,
) -> Result<(StatusCode, Json<Vec<Torrent>>), ApiError> {
    let torrents = body.into_iter().map(|t| t.into_torrent(None)).collect();
    let stored = state.torrents().add_all(torrents).map_err(storage_error)?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Upsert a batch of torrents
pub async fn update_torrents(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Vec<Torrent>>,
) -> Result<StatusCode, ApiError> {
    state.torrents().update_all(body).map_err(storage_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return the candidates whose url is not stored yet
pub async fn check_new(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Vec<TorrentBody>>,
) -> Result<Json<Vec<Torrent>>, ApiError> {
    let candidates = body.into_iter().map(|t| t.into_torrent(None)).collect();
    let fresh = state.torrents().check_new(candidates).map_err(storage_error)?;

    Ok(Json(fresh))
}

/// Find one torrent by url or by qBittorrent hash
pub async fn lookup_torrent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Result<Json<Torrent>, ApiError> {
    let db = state.torrents();
    let (found, key) = match (params.url, params.qb_hash) {
        (Some(url), None) => (db.search_by_url(&url), url),
        (None, Some(qb_hash)) => (db.search_by_qb_hash(&qb_hash), qb_hash),
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Exactly one of 'url' or 'qb_hash' is required",
            ))
        }
    };

    match found.map_err(storage_error)? {
        Some(torrent) => Ok(Json(torrent)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Torrent not found: {}", key),
        )),
    }
}

/// Find every torrent matching one of the given qBittorrent hashes
pub async fn lookup_by_hashes(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HashesBody>,
) -> Result<Json<Vec<Torrent>>, ApiError> {
    let torrents = state
        .torrents()
        .search_by_qb_hashes(&body.hashes)
        .map_err(storage_error)?;

    Ok(Json(torrents))
}

/// Get a torrent by ID
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Torrent>, ApiError> {
    match state.torrents().search(id).map_err(storage_error)? {
        Some(torrent) => Ok(Json(torrent)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Torrent not found: {}", id),
        )),
    }
}

/// Replace the torrent stored under ID, creating it if absent
pub async fn update_torrent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<TorrentBody>,
) -> Result<Json<Torrent>, ApiError> {
    let torrent = state
        .torrents()
        .update(body.into_torrent(Some(id)))
        .map_err(storage_error)?;

    Ok(Json(torrent))
}

/// Assign the qBittorrent hash of a stored torrent
pub async fn set_qb_hash(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<QbHashBody>,
) -> Result<StatusCode, ApiError> {
    let updated = state
        .torrents()
        .update_qb_hash(id, &body.qb_hash)
        .map_err(storage_error)?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Torrent not found: {}", id),
        ))
    }
}

/// Delete every torrent of a show
pub async fn delete_bangumi_torrents(
    State(state): State<Arc<AppState>>,
    Path(bangumi_id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state
        .torrents()
        .delete_by_bangumi_id(bangumi_id)
        .map_err(storage_error)?;

    Ok(Json(DeleteResponse { deleted }))
}
