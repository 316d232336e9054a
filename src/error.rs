use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Failures of the network-facing glue. The parser itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} is not configured on the server.")]
    MissingConfig(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{service} returned {status}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Upstream { body, .. } => json!({ "error": self.to_string(), "details": body }),
            _ => json!({ "error": self.to_string() }),
        };
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(body)).into_response()
    }
}
