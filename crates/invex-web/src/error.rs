//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use invex_core::{InvexError, PersistenceError};
use serde::Serialize;
use thiserror::Error;

/// Errors that end a request before any per-file report exists.
#[derive(Error, Debug)]
pub enum WebError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WebError::BadRequest(_) => "bad_request",
            WebError::NotFound(_) => "not_found",
            WebError::Internal(_) => "internal_error",
        }
    }
}

impl From<PersistenceError> for WebError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(_) => WebError::NotFound(err.to_string()),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl From<InvexError> for WebError {
    fn from(err: InvexError) -> Self {
        match err {
            InvexError::Persistence(inner) => inner.into(),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
