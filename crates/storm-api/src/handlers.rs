//! REST API handlers.
//!
//! Each handler validates its input, runs RPC calls on a pooled session via
//! [`ApiState::with_session`], and answers JSON. Operations with nothing to
//! report answer 204.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::daemon::{Daemon, TorrentFilter, TorrentOptions, TorrentSource};
use crate::error::{ApiError, ApiResult};
use crate::{ApiResponse, ApiState};

pub(crate) fn ok<T: Serialize>(data: T) -> Response {
    ApiResponse::ok(data).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Query parameters shared by the torrent endpoints.
///
/// `id` may repeat; the last `state`, `files` and `path` win.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TorrentQuery {
    pub ids: Vec<String>,
    pub state: Option<String>,
    pub remove_data: bool,
    pub path: Option<String>,
}

impl TorrentQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "id" => query.ids.push(value),
                "state" => query.state = Some(value).filter(|s| !s.is_empty()),
                "files" => query.remove_data = value == "true",
                "path" => query.path = Some(value).filter(|p| !p.is_empty()),
                _ => {}
            }
        }
        query
    }

    /// Fail unless at least `min` ids were given.
    pub fn require_ids(&self, min: usize) -> ApiResult<&[String]> {
        if self.ids.len() < min {
            return Err(ApiError::bad_request(format!(
                "At least {min} torrent ID(s) are required"
            )));
        }
        Ok(&self.ids)
    }

    pub fn filter(&self) -> TorrentFilter {
        TorrentFilter {
            ids: self.ids.clone(),
            state: self.state.clone(),
        }
    }
}

// ── Torrents ───────────────────────────────────────────────────

/// GET /api/torrents
pub async fn list_torrents<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let filter = TorrentQuery::from_pairs(pairs).filter();
    let torrents = state
        .with_session(|conn| Box::pin(async move { Ok(conn.torrents_status(&filter).await?) }))
        .await?;
    Ok(ok(torrents))
}

/// Add torrent request body.
#[derive(Debug, Deserialize)]
pub struct AddTorrentRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub options: TorrentOptions,
}

impl AddTorrentRequest {
    fn source(self) -> ApiResult<(TorrentSource, TorrentOptions)> {
        let source = match self.kind.as_str() {
            "url" => TorrentSource::Url(self.uri),
            "magnet" => TorrentSource::Magnet(self.uri),
            "file" => TorrentSource::File {
                filename: self.uri,
                data: self.data,
            },
            _ => {
                return Err(ApiError::bad_request(
                    "Torrent Type must be one of url, magnet or file",
                ));
            }
        };
        Ok((source, self.options))
    }
}

#[derive(Debug, Serialize)]
pub struct AddTorrentResponse {
    pub id: String,
}

/// POST /api/torrents
pub async fn add_torrent<D: Daemon>(
    State(state): State<ApiState<D>>,
    payload: Result<Json<AddTorrentRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    let (source, options) = req.source()?;

    let id = state
        .with_session(|conn| {
            Box::pin(async move { Ok(conn.add_torrent(&source, &options).await?) })
        })
        .await?;

    // An empty id means the daemon could not parse the torrent.
    if id.is_empty() {
        return Err(ApiError::Unprocessable(
            "Torrent file could not be read".to_string(),
        ));
    }
    Ok(ok(AddTorrentResponse { id }))
}

/// DELETE /api/torrents
pub async fn remove_torrents<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let query = TorrentQuery::from_pairs(pairs);
    let ids = query.require_ids(1)?.to_vec();
    let remove_data = query.remove_data;

    let failures = state
        .with_session(|conn| {
            Box::pin(async move { Ok(conn.remove_torrents(&ids, remove_data).await?) })
        })
        .await?;

    if failures.is_empty() {
        Ok(no_content())
    } else {
        Ok(ok(failures))
    }
}

/// POST /api/torrents/pause
pub async fn pause_torrents<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let ids = TorrentQuery::from_pairs(pairs).require_ids(1)?.to_vec();
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.pause_torrents(&ids).await?) }))
        .await?;
    Ok(no_content())
}

/// POST /api/torrents/resume
pub async fn resume_torrents<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let ids = TorrentQuery::from_pairs(pairs).require_ids(1)?.to_vec();
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.resume_torrents(&ids).await?) }))
        .await?;
    Ok(no_content())
}

// ── Single torrent ─────────────────────────────────────────────

/// GET /api/torrent/{id}
pub async fn get_torrent<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let status = state
        .with_session(|conn| Box::pin(async move { Ok(conn.torrent_status(&id).await?) }))
        .await?;
    Ok(ok(status))
}

/// DELETE /api/torrent/{id}
pub async fn remove_torrent<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let remove_data = TorrentQuery::from_pairs(pairs).remove_data;
    let removed = state
        .with_session(|conn| {
            Box::pin(async move { Ok(conn.remove_torrent(&id, remove_data).await?) })
        })
        .await?;

    if !removed {
        return Err(ApiError::NotFound(
            "Requested torrent could not be deleted".to_string(),
        ));
    }
    Ok(no_content())
}

/// PUT /api/torrent/{id}
pub async fn set_torrent_options<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
    payload: Result<Json<TorrentOptions>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(options) = payload?;
    state
        .with_session(|conn| {
            Box::pin(async move { Ok(conn.set_torrent_options(&id, &options).await?) })
        })
        .await?;
    Ok(no_content())
}

/// POST /api/torrent/{id}/pause
pub async fn pause_torrent<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.pause_torrents(&[id]).await?) }))
        .await?;
    Ok(no_content())
}

/// POST /api/torrent/{id}/resume
pub async fn resume_torrent<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.resume_torrents(&[id]).await?) }))
        .await?;
    Ok(no_content())
}

// ── Session ────────────────────────────────────────────────────

/// GET /api/session
pub async fn session_status<D: Daemon>(State(state): State<ApiState<D>>) -> ApiResult<Response> {
    let session = state
        .with_session(|conn| Box::pin(async move { Ok(conn.session_status().await?) }))
        .await?;
    Ok(ok(session))
}

// ── Plugins ────────────────────────────────────────────────────

/// GET /api/plugins
pub async fn list_plugins<D: Daemon>(State(state): State<ApiState<D>>) -> ApiResult<Response> {
    let plugins = state
        .with_session(|conn| Box::pin(async move { Ok(conn.enabled_plugins().await?) }))
        .await?;
    Ok(ok(plugins))
}

/// POST /api/plugins/{id}
pub async fn enable_plugin<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.enable_plugin(&name).await?) }))
        .await?;
    Ok(no_content())
}

/// DELETE /api/plugins/{id}
pub async fn disable_plugin<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.disable_plugin(&name).await?) }))
        .await?;
    Ok(no_content())
}

// ── Labels ─────────────────────────────────────────────────────

/// GET /api/labels
pub async fn list_labels<D: Daemon>(State(state): State<ApiState<D>>) -> ApiResult<Response> {
    let labels = state
        .with_session(|conn| Box::pin(async move { Ok(conn.labels().await?) }))
        .await?;
    Ok(ok(labels))
}

/// POST /api/labels/{id}
pub async fn create_label<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(label): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.add_label(&label).await?) }))
        .await?;
    Ok(no_content())
}

/// DELETE /api/labels/{id}
pub async fn delete_label<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(label): Path<String>,
) -> ApiResult<Response> {
    state
        .with_session(|conn| Box::pin(async move { Ok(conn.remove_label(&label).await?) }))
        .await?;
    Ok(no_content())
}

/// GET /api/torrents/labels
pub async fn torrents_labels<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let filter = TorrentQuery::from_pairs(pairs).filter();
    let labels = state
        .with_session(|conn| Box::pin(async move { Ok(conn.torrents_labels(&filter).await?) }))
        .await?;
    Ok(ok(labels))
}

/// Set label request body.
#[derive(Debug, Deserialize)]
pub struct SetTorrentLabelRequest {
    pub label: String,
}

/// POST /api/torrent/{id}/label
pub async fn set_torrent_label<D: Daemon>(
    State(state): State<ApiState<D>>,
    Path(id): Path<String>,
    payload: Result<Json<SetTorrentLabelRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    state
        .with_session(|conn| {
            Box::pin(async move { Ok(conn.set_torrent_label(&id, &req.label).await?) })
        })
        .await?;
    Ok(no_content())
}

// ── Pool ───────────────────────────────────────────────────────

/// GET /api/pool
pub async fn pool_stats<D: Daemon>(State(state): State<ApiState<D>>) -> ApiResult<Response> {
    let stats = state.pool.stats().await?;
    Ok(ok(stats))
}
