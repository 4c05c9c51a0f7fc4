/// 图形管理接口

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::extract::ApiJson;
use super::ApiError;
use crate::app_state::AppState;
use crate::models::shape::{CreateShapeDto, Shape, UpdateShapeDto};
use crate::services::shape_service::ShapeService;

pub fn shape_routes() -> Router<AppState> {
    Router::new()
        .route("/:project_id/shapes", get(list_shapes).post(create_shape))
        .route(
            "/:project_id/shapes/:shape_id",
            get(get_shape).put(update_shape).delete(delete_shape),
        )
}

pub async fn list_shapes(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Shape>>, ApiError> {
    Ok(Json(ShapeService::new(state).list_shapes(project_id).await?))
}

/// POST /projects/:project_id/shapes
/// Body: { "x", "y", "z"?, "rotation"?, "svg" }
pub async fn create_shape(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    ApiJson(dto): ApiJson<CreateShapeDto>,
) -> Result<(StatusCode, Json<Shape>), ApiError> {
    let shape = ShapeService::new(state).create_shape(project_id, dto).await?;
    Ok((StatusCode::CREATED, Json(shape)))
}

pub async fn get_shape(
    State(state): State<AppState>,
    Path((project_id, shape_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Shape>, ApiError> {
    Ok(Json(ShapeService::new(state).get_shape(project_id, shape_id).await?))
}

pub async fn update_shape(
    State(state): State<AppState>,
    Path((project_id, shape_id)): Path<(Uuid, Uuid)>,
    ApiJson(dto): ApiJson<UpdateShapeDto>,
) -> Result<Json<Shape>, ApiError> {
    let shape = ShapeService::new(state)
        .update_shape(project_id, shape_id, dto)
        .await?;
    Ok(Json(shape))
}

pub async fn delete_shape(
    State(state): State<AppState>,
    Path((project_id, shape_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    ShapeService::new(state)
        .delete_shape(project_id, shape_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
