use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced by the identity provider.
///
/// Foreground session operations hand these back to the caller untouched so
/// the provider's own message can be shown.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered with an error body.
    #[error("{message}")]
    Provider { status: u16, message: String },

    /// The provider could not be reached or the body could not be read.
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// An operation needed a signed-in session and there was none.
    #[error("no active session")]
    MissingSession,
}

/// Errors from the persisted session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors produced while serving gateway requests.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("request body could not be read: {0}")]
    Body(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Body(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        };
        tracing::warn!(error = %self, status = status.as_u16(), "gateway request failed");
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
