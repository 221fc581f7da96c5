//! API errors and their HTTP mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use storm_pool::PoolError;

use crate::ApiResponse;
use crate::daemon::RpcError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("view has not changed")]
    NotModified,

    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::Body(rejection) => rejection.status(),
            Self::Encode(_) | Self::Rpc(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Pool(PoolError::Cancelled) => StatusCode::GATEWAY_TIMEOUT,
            Self::Pool(PoolError::PoolClosed) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pool(PoolError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::NOT_MODIFIED {
            return status.into_response();
        }
        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}
