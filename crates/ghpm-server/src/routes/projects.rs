use axum::extract::{Path, Query, State};
use axum::Json;
use ghpm_core::project::{NewProject, Project, ProjectChanges};

use super::{blocking, deleted, ListQuery};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/projects
pub async fn list_projects(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Project>>, AppError> {
    let page = q.page();
    let projects = blocking(move || app.sync.list_projects(page)).await?;
    Ok(Json(projects))
}

/// POST /api/projects — create remotely, then record locally.
pub async fn create_project(
    State(app): State<AppState>,
    Json(draft): Json<NewProject>,
) -> Result<Json<Project>, AppError> {
    let project = blocking(move || app.sync.create_project(&draft)).await?;
    Ok(Json(project))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, AppError> {
    let project = blocking(move || app.sync.get_project(id)).await?;
    Ok(Json(project))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<ProjectChanges>,
) -> Result<Json<Project>, AppError> {
    let project = blocking(move || app.sync.update_project(id, &changes)).await?;
    Ok(Json(project))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    blocking(move || app.sync.delete_project(id)).await?;
    Ok(deleted("Project"))
}
