pub mod issues;
pub mod projects;
pub mod templates;

use axum::Json;
use ghpm_core::Page;
use serde::Deserialize;

use crate::error::AppError;

/// `?skip=&limit=` (plus `project_id` for issues).
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub project_id: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        let default = Page::default();
        Page::new(
            self.skip.unwrap_or(default.skip),
            self.limit.unwrap_or(default.limit),
        )
    }
}

/// Run a blocking core call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> ghpm_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
    Ok(result?)
}

pub(crate) fn deleted(what: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": format!("{what} deleted successfully") }))
}

/// GET / — welcome message.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the ghpm project management API"
    }))
}
