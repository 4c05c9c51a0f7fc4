/// 通知接口
///
/// 长连接 NDJSON 流、历史查询与 WebSocket 三种方式

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use uuid::Uuid;

use super::ApiError;
use crate::app_state::AppState;
use crate::notifications::{Notification, Subscription};
use crate::ws::notification_handler::{
    handle_controller_websocket, handle_project_websocket, SinceQuery,
};

/// 项目通知路由（挂在 /projects 下）
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/:project_id/notifications", get(project_notifications))
        .route("/:project_id/notifications/history", get(project_history))
        .route("/:project_id/notifications/ws", get(handle_project_websocket))
}

/// Controller 通知路由
pub fn controller_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(controller_notifications))
        .route("/ws", get(handle_controller_websocket))
}

/// 项目通知流，每行一条 JSON，项目关闭后结束
///
/// GET /projects/:project_id/notifications?since=N
pub async fn project_notifications(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SinceQuery>,
) -> Result<Response, ApiError> {
    let subscription = match query.since {
        Some(since) => state.notifications.subscribe_from(project_id, since)?,
        None => state.notifications.subscribe(project_id)?,
    };
    Ok(ndjson(subscription))
}

/// GET /projects/:project_id/notifications/history?since=N
pub async fn project_history(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let events = state
        .notifications
        .poll(project_id, query.since.unwrap_or(0))?;
    Ok(Json(events))
}

/// GET /notifications
pub async fn controller_notifications(State(state): State<AppState>) -> Response {
    ndjson(state.notifications.subscribe_controller())
}

fn ndjson(subscription: Subscription) -> Response {
    let lines = subscription.into_stream().map(|notification| {
        let mut line = serde_json::to_string(&notification).unwrap_or_default();
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}
