//! storm-api: REST API for a torrent daemon.
//!
//! Every handler borrows a daemon session from the connection pool, runs its
//! RPC calls, and gives the session back before answering.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/torrents` | Status of matching torrents (`?id=`, `?state=`) |
//! | POST | `/api/torrents` | Add a torrent from a URL, magnet link or file |
//! | DELETE | `/api/torrents` | Remove torrents (`?id=`, `?files=true`) |
//! | POST | `/api/torrents/pause` | Pause torrents |
//! | POST | `/api/torrents/resume` | Resume torrents |
//! | GET | `/api/torrents/labels` | Torrent to label mapping |
//! | GET | `/api/torrent/{id}` | Status of one torrent |
//! | PUT | `/api/torrent/{id}` | Set torrent options |
//! | DELETE | `/api/torrent/{id}` | Remove one torrent |
//! | POST | `/api/torrent/{id}/pause` | Pause one torrent |
//! | POST | `/api/torrent/{id}/resume` | Resume one torrent |
//! | POST | `/api/torrent/{id}/label` | Set a torrent's label |
//! | GET | `/api/session` | Session status |
//! | GET | `/api/view` | Combined view update with ETag |
//! | GET | `/api/plugins` | Enabled plugins |
//! | POST/DELETE | `/api/plugins/{id}` | Enable / disable a plugin |
//! | GET | `/api/labels` | Labels |
//! | POST/DELETE | `/api/labels/{id}` | Create / delete a label |
//! | GET | `/api/pool` | Connection pool statistics |

pub mod daemon;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod view;

#[cfg(test)]
mod fake;

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, middleware};
use serde::Serialize;
use storm_pool::Pool;
use tracing::error;

pub use daemon::Daemon;
pub use error::{ApiError, ApiResult};

/// Largest accepted request body.
pub const MAX_REQUEST_SIZE: usize = 5 * 1024 * 1024;

/// Future returned by a closure passed to [`ApiState::with_session`].
pub type SessionFuture<'c, T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send + 'c>>;

/// Shared state for API handlers.
pub struct ApiState<D> {
    pub pool: Pool<D>,
    pub acquire_timeout: Duration,
}

impl<D> Clone for ApiState<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<D: Daemon> ApiState<D> {
    pub fn new(pool: Pool<D>, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    /// Run `op` on a pooled session.
    ///
    /// The session goes back to the pool whatever `op` returns, and also when
    /// the request is dropped while `op` is still running. Daemon errors are
    /// logged with their traceback here so handlers don't have to.
    pub async fn with_session<T, F>(&self, op: F) -> ApiResult<T>
    where
        F: for<'c> FnOnce(&'c mut D) -> SessionFuture<'c, T>,
    {
        let conn = self.pool.acquire_timeout(self.acquire_timeout).await?;
        let mut session = Session::new(&self.pool, conn);
        let result = op(&mut *session).await;
        drop(session);

        if let Err(ApiError::Rpc(e)) = &result {
            error!(
                exception = %e.exception_type,
                message = %e.exception_message,
                traceback = %e.traceback,
                "daemon RPC failed"
            );
        }
        result
    }
}

/// A borrowed daemon session. Returns itself to the pool on drop.
struct Session<'p, D: Daemon> {
    pool: &'p Pool<D>,
    conn: Option<D>,
}

impl<'p, D: Daemon> Session<'p, D> {
    fn new(pool: &'p Pool<D>, conn: D) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }
}

impl<D: Daemon> Deref for Session<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("session used after release"),
        }
    }
}

impl<D: Daemon> DerefMut for Session<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("session used after release"),
        }
    }
}

impl<D: Daemon> Drop for Session<'_, D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// JSON 404 for unmatched paths.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::err("Not Found")),
    )
        .into_response()
}

/// Build the API router. Routes live under `/api`.
pub fn build_router<D: Daemon>(state: ApiState<D>) -> Router {
    use handlers::*;

    let api_routes = Router::new()
        .route(
            "/torrents",
            get(list_torrents::<D>)
                .post(add_torrent::<D>)
                .delete(remove_torrents::<D>),
        )
        .route("/torrents/pause", post(pause_torrents::<D>))
        .route("/torrents/resume", post(resume_torrents::<D>))
        .route("/torrents/labels", get(torrents_labels::<D>))
        .route(
            "/torrent/{id}",
            get(get_torrent::<D>)
                .put(set_torrent_options::<D>)
                .delete(remove_torrent::<D>),
        )
        .route("/torrent/{id}/pause", post(pause_torrent::<D>))
        .route("/torrent/{id}/resume", post(resume_torrent::<D>))
        .route("/torrent/{id}/label", post(set_torrent_label::<D>))
        .route("/session", get(session_status::<D>))
        .route("/view", get(view::view_update::<D>))
        .route("/plugins", get(list_plugins::<D>))
        .route(
            "/plugins/{id}",
            post(enable_plugin::<D>).delete(disable_plugin::<D>),
        )
        .route("/labels", get(list_labels::<D>))
        .route(
            "/labels/{id}",
            post(create_label::<D>).delete(delete_label::<D>),
        )
        .route("/pool", get(pool_stats::<D>))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(logging::log_request))
}
