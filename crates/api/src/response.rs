//! The wire envelope
//!
//! Every response is `{success, data, error}`; errors carry
//! `{code, message, detail?}` with codes from the closed set the clients
//! know: TASK_RUNNING, NO_BASE_VERSION, HOOK_FAILED, NEO4J_ERROR,
//! BAD_REQUEST, NOT_FOUND.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kgraph_core::KgError;
use serde::Serialize;
use serde_json::{json, Value};

/// The `{success, data, error}` wrapper.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// True for 2xx responses.
    pub success: bool,
    /// Payload on success, `null` otherwise.
    pub data: Option<T>,
    /// Error body on failure, `null` otherwise.
    pub error: Option<ErrorBody>,
}

/// The `error` member of the envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Structured context, e.g. the running task on a 409.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// A successful payload; serializes as the envelope with `success: true`.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            success: true,
            data: Some(self.0),
            error: None,
        })
        .into_response()
    }
}

/// A failed request; serializes as the envelope with `success: false`.
#[derive(Debug)]
pub struct ApiError(pub KgError);

impl From<KgError> for ApiError {
    fn from(e: KgError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            KgError::TaskRunning { .. } => StatusCode::CONFLICT,
            KgError::NoBaseVersion | KgError::BadRequest(_) | KgError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            KgError::NoReadyVersion => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<Value> {
        match &self.0 {
            KgError::TaskRunning {
                status,
                task_id,
                version,
            } => Some(json!({
                "task_id": task_id,
                "version": version,
                "status": status,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<Value> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.0.code(),
                message: self.0.to_string(),
                detail: self.detail(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<ApiJson<T>, ApiError>;
