use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaidError {
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status: {0}")]
    Status(StatusCode),

    #[error("invalid or unexpected response format: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("api rejected request: {0}")]
    Api(#[from] ApiError),
}

/// Broad class of a rejected request, derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    RequestFailed,
    NotFound,
    Server,
    Other,
}

impl From<StatusCode> for ApiErrorKind {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ApiErrorKind::BadRequest,
            StatusCode::UNAUTHORIZED => ApiErrorKind::Unauthorized,
            StatusCode::PAYMENT_REQUIRED => ApiErrorKind::RequestFailed,
            StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
            s if s.is_server_error() => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            ApiErrorKind::BadRequest => "bad request",
            ApiErrorKind::Unauthorized => "unauthorized",
            ApiErrorKind::RequestFailed => "request failed",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::Server => "server error",
            ApiErrorKind::Other => "rejected",
        };
        f.write_str(v)
    }
}

/// Error body returned by Plaid for a rejected request.
#[derive(Debug, Clone, Error)]
#[error("{kind} ({status}): {message} [code {code}]")]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ApiErrorKind,
    pub code: i64,
    pub message: String,
    pub resolve: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
    resolve: Option<String>,
}

impl ApiError {
    /// Decode a Plaid error body; `None` when the body has another shape.
    pub(crate) fn from_body(status: StatusCode, body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        Self::from_value(status, &value)
    }

    /// Plaid may answer a failed call with a success status; such a body has
    /// a `code` and no `access_token`.
    pub(crate) fn from_success_body(status: StatusCode, body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        if value.get("access_token").is_some() || value.get("code").is_none() {
            return None;
        }
        Self::from_value(status, &value)
    }

    fn from_value(status: StatusCode, value: &Value) -> Option<Self> {
        let parsed = ErrorBody::deserialize(value).ok()?;
        Some(ApiError {
            status,
            kind: ApiErrorKind::from(status),
            code: parsed.code,
            message: parsed.message,
            resolve: parsed.resolve.filter(|s| !s.is_empty()),
        })
    }
}
