/// Compute 管理接口

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::extract::ApiJson;
use super::{detached, ApiError};
use crate::app_state::AppState;
use crate::models::compute::{ComputeSpec, ComputeSummary};
use crate::services::compute_service::ComputeService;

/// Compute 路由
pub fn compute_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_computes).post(add_compute))
        .route("/:compute_id", get(get_compute).delete(remove_compute))
}

/// GET /computes
pub async fn list_computes(State(state): State<AppState>) -> Json<Vec<ComputeSummary>> {
    Json(ComputeService::new(state).list_computes().await)
}

/// 注册 Compute
///
/// POST /computes
/// Body: ComputeSpec
pub async fn add_compute(
    State(state): State<AppState>,
    ApiJson(spec): ApiJson<ComputeSpec>,
) -> Result<(StatusCode, Json<ComputeSummary>), ApiError> {
    let summary = ComputeService::new(state).add_compute(spec).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /computes/:compute_id
pub async fn get_compute(
    State(state): State<AppState>,
    Path(compute_id): Path<String>,
) -> Result<Json<ComputeSummary>, ApiError> {
    Ok(Json(ComputeService::new(state).get_compute(&compute_id).await?))
}

/// 注销 Compute
///
/// DELETE /computes/:compute_id
pub async fn remove_compute(
    State(state): State<AppState>,
    Path(compute_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    detached(async move { ComputeService::new(state).remove_compute(&compute_id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}
