//! Combined view update for the web UI.
//!
//! One request returns everything a torrent list needs: statuses sorted by
//! hash, labels, session counters and free disk space. The response carries
//! an ETag; a client sending the same value back in an `ETag` header gets
//! 304 until something changes.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::daemon::{Daemon, SessionStatus, TorrentStatus};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{TorrentQuery, ok};
use crate::ApiState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewTorrent {
    pub hash: String,
    pub label: String,
    #[serde(flatten)]
    pub status: TorrentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewUpdate {
    pub torrents: Vec<ViewTorrent>,
    pub session: SessionStatus,
    pub disk_free: i64,
}

impl ViewUpdate {
    /// Pair statuses with labels. Torrents without a label get an empty one.
    pub fn new(
        torrents: BTreeMap<String, TorrentStatus>,
        mut labels: BTreeMap<String, String>,
        session: SessionStatus,
        disk_free: i64,
    ) -> Self {
        let torrents = torrents
            .into_iter()
            .map(|(hash, status)| ViewTorrent {
                label: labels.remove(&hash).unwrap_or_default(),
                hash,
                status,
            })
            .collect();
        Self {
            torrents,
            session,
            disk_free,
        }
    }

    /// Hex SHA-256 of the serialized update.
    pub fn etag(&self) -> ApiResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[derive(Debug, Serialize)]
pub struct ViewUpdateResponse {
    #[serde(flatten)]
    pub update: ViewUpdate,
    pub etag: String,
}

/// GET /api/view
pub async fn view_update<D: Daemon>(
    State(state): State<ApiState<D>>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let query = TorrentQuery::from_pairs(pairs);
    let filter = query.filter();
    let path = query.path;

    let update = state
        .with_session(|conn| {
            Box::pin(async move {
                let torrents = conn.torrents_status(&filter).await?;
                let labels = match conn.torrents_labels(&filter).await {
                    Ok(labels) => labels,
                    Err(e) => {
                        debug!(error = %e, "torrent labels unavailable");
                        BTreeMap::new()
                    }
                };
                let session = conn.session_status().await?;
                let disk_free = match conn.free_space(path.as_deref()).await {
                    Ok(free) => free,
                    Err(e) => {
                        debug!(error = %e, "free space unavailable");
                        0
                    }
                };
                Ok(ViewUpdate::new(torrents, labels, session, disk_free))
            })
        })
        .await?;

    let etag = update.etag()?;
    let unchanged = headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|requested| requested == etag);
    if unchanged {
        return Err(ApiError::NotModified);
    }

    Ok(ok(ViewUpdateResponse { update, etag }))
}
