// API error type and its JSON body: {"error": {"code", "message"}}.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::error;

use courier_common::keys::KeyError;

use crate::clients::ClientError;
use crate::content::model::ContentTreeError;
use crate::store::course_sync::CourseSyncError;
use crate::store::rapid_response::RunStoreError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    InvalidKey,
    Forbidden,
    NotFound,
    Conflict,
    NotConfigured,
    PayloadTooLarge,
    UpstreamFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidKey => "INVALID_KEY",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UpstreamFailed => "UPSTREAM_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed | Self::InvalidKey | Self::NotConfigured => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamFailed => StatusCode::BAD_GATEWAY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Log the full error chain; the client only sees a generic message.
    pub fn internal(error: anyhow::Error) -> Self {
        error!(error = %format!("{error:#}"), "request failed");
        Self::new(ErrorCode::InternalError, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error)
    }
}

impl From<KeyError> for ApiError {
    fn from(error: KeyError) -> Self {
        Self::new(ErrorCode::InvalidKey, error.to_string())
    }
}

impl From<ContentTreeError> for ApiError {
    fn from(error: ContentTreeError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl From<RunStoreError> for ApiError {
    fn from(error: RunStoreError) -> Self {
        match error {
            RunStoreError::RunNotFound(_) => Self::not_found(error.to_string()),
            RunStoreError::NoOpenRun { .. } | RunStoreError::RunInUse { .. } => {
                Self::new(ErrorCode::Conflict, error.to_string())
            }
            RunStoreError::Storage(source) => Self::internal(source),
        }
    }
}

impl From<CourseSyncError> for ApiError {
    fn from(error: CourseSyncError) -> Self {
        match error {
            CourseSyncError::UnknownOrganization(_) => Self::not_found(error.to_string()),
            CourseSyncError::Storage(source) => Self::internal(source),
            CourseSyncError::OrganizationInUse { .. } => Self::new(ErrorCode::Conflict, error.to_string()),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(error: ClientError) -> Self {
        match &error {
            ClientError::NotConfigured { .. } => Self::new(ErrorCode::NotConfigured, error.to_string()),
            ClientError::Status { status, .. } if status.as_u16() == 404 => Self::not_found(error.to_string()),
            _ => Self::new(ErrorCode::UpstreamFailed, error.to_string()),
        }
    }
}

// ── JSON bodies ────────────────────────────────────────────────────

/// `Json<T>` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(classify_json_rejection(&rejection)),
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(ErrorCode::PayloadTooLarge, "request body is too large");
    }
    match rejection {
        JsonRejection::JsonDataError(e) => ApiError::bad_request(format!("invalid JSON payload: {}", e.body_text())),
        JsonRejection::JsonSyntaxError(e) => ApiError::bad_request(format!("malformed JSON: {}", e.body_text())),
        JsonRejection::MissingJsonContentType(_) => ApiError::bad_request("expected Content-Type: application/json"),
        other => ApiError::bad_request(format!("request body error: {}", other.body_text())),
    }
}
