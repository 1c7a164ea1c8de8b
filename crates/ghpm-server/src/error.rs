use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ghpm_core::error::{GhpmError, ToolFailure};

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

fn status_for(e: &GhpmError) -> StatusCode {
    match e {
        GhpmError::NotFound { .. } => StatusCode::NOT_FOUND,
        GhpmError::Validation(_) => StatusCode::BAD_REQUEST,
        GhpmError::TemplateExists(_) => StatusCode::CONFLICT,
        GhpmError::ExternalTool {
            failure: ToolFailure::Timeout(_),
            ..
        } => StatusCode::GATEWAY_TIMEOUT,
        GhpmError::ExternalTool { .. } => StatusCode::BAD_GATEWAY,
        GhpmError::ToolNotFound(_) | GhpmError::ToolNotAuthenticated(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GhpmError::PartialFailure { .. }
        | GhpmError::Store(_)
        | GhpmError::Io(_)
        | GhpmError::Yaml(_)
        | GhpmError::Json(_)
        | GhpmError::Toml(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Some(e) = self.0.downcast_ref::<GhpmError>() else {
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = status_for(e);
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }

        let mut body = serde_json::json!({ "error": e.to_string() });
        if let Some(remote_id) = e.orphaned_remote_id() {
            body["remote_id"] = remote_id.into();
            body["partial_failure"] = true.into();
        }
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
