/// 节点管理接口

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::extract::ApiJson;
use super::{detached, ApiError};
use crate::app_state::AppState;
use crate::models::node::{CreateNodeDto, Node, NodeTypeInfo, UpdateNodeDto};
use crate::services::node_service::NodeService;

/// 节点路由
pub fn node_routes() -> Router<AppState> {
    Router::new()
        .route("/:project_id/nodes", get(list_nodes).post(create_node))
        .route(
            "/:project_id/nodes/:node_id",
            get(get_node).put(update_node).delete(delete_node),
        )
        .route("/:project_id/nodes/:node_id/start", post(start_node))
        .route("/:project_id/nodes/:node_id/stop", post(stop_node))
        .route("/:project_id/nodes/:node_id/suspend", post(suspend_node))
        .route("/:project_id/nodes/:node_id/reload", post(reload_node))
        .route("/:project_id/nodes/:node_id/refresh", post(refresh_node))
}

/// 支持的节点类型
///
/// GET /node_types
pub async fn list_node_types() -> Json<Vec<NodeTypeInfo>> {
    Json(NodeService::list_node_types())
}

/// GET /projects/:project_id/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Node>>, ApiError> {
    Ok(Json(NodeService::new(state).list_nodes(project_id).await?))
}

/// 创建节点，控制台端口由服务端分配
///
/// POST /projects/:project_id/nodes
/// Body: CreateNodeDto
pub async fn create_node(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    ApiJson(dto): ApiJson<CreateNodeDto>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let node =
        detached(async move { NodeService::new(state).create_node(project_id, dto).await }).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// GET /projects/:project_id/nodes/:node_id
pub async fn get_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(NodeService::new(state).get_node(project_id, node_id).await?))
}

/// PUT /projects/:project_id/nodes/:node_id
pub async fn update_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
    ApiJson(dto): ApiJson<UpdateNodeDto>,
) -> Result<Json<Node>, ApiError> {
    let node = detached(async move {
        NodeService::new(state)
            .update_node(project_id, node_id, dto)
            .await
    })
    .await?;
    Ok(Json(node))
}

/// 删除节点（须已停止），同时删除其链路
///
/// DELETE /projects/:project_id/nodes/:node_id
pub async fn delete_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    detached(async move { NodeService::new(state).delete_node(project_id, node_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/:project_id/nodes/:node_id/start
pub async fn start_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    detached(async move { NodeService::new(state).start_node(project_id, node_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/:project_id/nodes/:node_id/stop
pub async fn stop_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    detached(async move { NodeService::new(state).stop_node(project_id, node_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/:project_id/nodes/:node_id/suspend
pub async fn suspend_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Node>, ApiError> {
    let node =
        detached(async move { NodeService::new(state).suspend_node(project_id, node_id).await })
            .await?;
    Ok(Json(node))
}

/// POST /projects/:project_id/nodes/:node_id/reload
pub async fn reload_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Node>, ApiError> {
    let node =
        detached(async move { NodeService::new(state).reload_node(project_id, node_id).await })
            .await?;
    Ok(Json(node))
}

/// 重新查询后端状态
///
/// POST /projects/:project_id/nodes/:node_id/refresh
pub async fn refresh_node(
    State(state): State<AppState>,
    Path((project_id, node_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Node>, ApiError> {
    let node =
        detached(async move { NodeService::new(state).refresh_node(project_id, node_id).await })
            .await?;
    Ok(Json(node))
}
