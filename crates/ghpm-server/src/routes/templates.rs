use axum::extract::{Path, Query, State};
use axum::Json;
use ghpm_core::template::{NewTemplate, Template, TemplateChanges};

use super::{blocking, deleted, ListQuery};
use crate::error::AppError;
use crate::state::AppState;

// Templates live only in the local store; none of these touch the remote tool.

pub async fn list_templates(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Template>>, AppError> {
    let page = q.page();
    let templates = blocking(move || app.sync.list_templates(page)).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(app): State<AppState>,
    Json(draft): Json<NewTemplate>,
) -> Result<Json<Template>, AppError> {
    let template = blocking(move || app.sync.create_template(&draft)).await?;
    Ok(Json(template))
}

pub async fn get_template(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Template>, AppError> {
    let template = blocking(move || app.sync.get_template(id)).await?;
    Ok(Json(template))
}

pub async fn update_template(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<TemplateChanges>,
) -> Result<Json<Template>, AppError> {
    let template = blocking(move || app.sync.update_template(id, &changes)).await?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    blocking(move || app.sync.delete_template(id)).await?;
    Ok(deleted("Template"))
}
