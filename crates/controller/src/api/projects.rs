/// 项目管理接口

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::extract::ApiJson;
use super::{detached, links, nodes, notifications, shapes, ApiError};
use crate::app_state::AppState;
use crate::models::project::{CreateProjectDto, ProjectResponse};
use crate::services::project_service::ProjectService;

/// 项目路由，包含节点、链路、图形与通知子路由
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:project_id", get(get_project).delete(delete_project))
        .route("/:project_id/close", post(close_project))
        .merge(nodes::node_routes())
        .merge(links::link_routes())
        .merge(shapes::shape_routes())
        .merge(notifications::project_routes())
}

/// GET /projects
pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<ProjectResponse>> {
    Json(ProjectService::new(state).list_projects().await)
}

/// 创建项目
///
/// POST /projects
/// Body: { "name": "..." }
pub async fn create_project(
    State(state): State<AppState>,
    ApiJson(dto): ApiJson<CreateProjectDto>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let project = ProjectService::new(state).create_project(dto.name).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /projects/:project_id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    Ok(Json(ProjectService::new(state).get_project(project_id).await?))
}

/// 关闭项目
///
/// POST /projects/:project_id/close
pub async fn close_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    detached(async move { ProjectService::new(state).close_project(project_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 删除项目
///
/// DELETE /projects/:project_id
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    detached(async move { ProjectService::new(state).delete_project(project_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}
