use axum::extract::{Path, Query, State};
use axum::Json;
use ghpm_core::issue::{Issue, IssueChanges, NewIssue};
use ghpm_core::MergeReport;
use serde::Deserialize;

use super::{blocking, deleted, ListQuery};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/issues — optionally filtered by `project_id`.
pub async fn list_issues(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Issue>>, AppError> {
    let page = q.page();
    let issues = blocking(move || app.sync.list_issues(q.project_id, page)).await?;
    Ok(Json(issues))
}

/// POST /api/issues
pub async fn create_issue(
    State(app): State<AppState>,
    Json(draft): Json<NewIssue>,
) -> Result<Json<Issue>, AppError> {
    let issue = blocking(move || app.sync.create_issue(&draft)).await?;
    Ok(Json(issue))
}

/// GET /api/issues/{id}
pub async fn get_issue(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Issue>, AppError> {
    let issue = blocking(move || app.sync.get_issue(id)).await?;
    Ok(Json(issue))
}

/// PUT /api/issues/{id}
pub async fn update_issue(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<IssueChanges>,
) -> Result<Json<Issue>, AppError> {
    let issue = blocking(move || app.sync.update_issue(id, &changes)).await?;
    Ok(Json(issue))
}

/// DELETE /api/issues/{id}
pub async fn delete_issue(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    blocking(move || app.sync.delete_issue(id)).await?;
    Ok(deleted("Issue"))
}

#[derive(Debug, Deserialize)]
pub struct ApplyTemplateBody {
    pub template_id: i64,
}

/// POST /api/issues/{id}/apply-template
pub async fn apply_template(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ApplyTemplateBody>,
) -> Result<Json<MergeReport>, AppError> {
    let report = blocking(move || app.sync.apply_template(id, body.template_id)).await?;
    Ok(Json(report))
}
