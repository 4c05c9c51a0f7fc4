/// 链路管理接口

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::extract::{optional_json, ApiJson};
use super::{detached, ApiError};
use crate::app_state::AppState;
use crate::models::link::{CreateLinkDto, Link, StartCaptureDto};
use crate::services::link_service::LinkService;

/// 链路路由
pub fn link_routes() -> Router<AppState> {
    Router::new()
        .route("/:project_id/links", get(list_links).post(create_link))
        .route("/:project_id/links/:link_id", get(get_link).delete(delete_link))
        .route("/:project_id/links/:link_id/start_capture", post(start_capture))
        .route("/:project_id/links/:link_id/stop_capture", post(stop_capture))
}

/// GET /projects/:project_id/links
pub async fn list_links(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Link>>, ApiError> {
    Ok(Json(LinkService::new(state).list_links(project_id).await?))
}

/// 连接两个端点
///
/// POST /projects/:project_id/links
/// Body: { "nodes": [{node_id, adapter_number, port_number}, {...}] }
pub async fn create_link(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    ApiJson(dto): ApiJson<CreateLinkDto>,
) -> Result<(StatusCode, Json<Link>), ApiError> {
    let link =
        detached(async move { LinkService::new(state).create_link(project_id, dto).await }).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// GET /projects/:project_id/links/:link_id
pub async fn get_link(
    State(state): State<AppState>,
    Path((project_id, link_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Link>, ApiError> {
    Ok(Json(LinkService::new(state).get_link(project_id, link_id).await?))
}

/// DELETE /projects/:project_id/links/:link_id
pub async fn delete_link(
    State(state): State<AppState>,
    Path((project_id, link_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    detached(async move { LinkService::new(state).delete_link(project_id, link_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 开始抓包，请求体可省略
///
/// POST /projects/:project_id/links/:link_id/start_capture
/// Body: { "capture_file_name"?, "data_link_type"? }
pub async fn start_capture(
    State(state): State<AppState>,
    Path((project_id, link_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let dto: StartCaptureDto = optional_json(&body)?;
    detached(async move {
        LinkService::new(state)
            .start_capture(project_id, link_id, dto)
            .await
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/:project_id/links/:link_id/stop_capture
pub async fn stop_capture(
    State(state): State<AppState>,
    Path((project_id, link_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    detached(async move { LinkService::new(state).stop_capture(project_id, link_id).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
