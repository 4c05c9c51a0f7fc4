/// 通知 WebSocket 处理器
///
/// 客户端连接后按序号顺序接收通知，客户端发送的消息仅用于检测断开

use axum::extract::ws::{Message as AxumWsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::app_state::AppState;
use crate::notifications::{Notification, Subscription};

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    /// 只推送序号大于该值的通知
    pub since: Option<u64>,
}

/// 项目通知 WebSocket
///
/// 项目不存在时在升级之前返回 404
pub async fn handle_project_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SinceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = match query.since {
        Some(since) => state.notifications.subscribe_from(project_id, since)?,
        None => state.notifications.subscribe(project_id)?,
    };
    let label = format!("project {}", project_id);
    Ok(ws.on_upgrade(move |socket| stream_notifications(socket, subscription, label)))
}

/// Controller 通知 WebSocket
pub async fn handle_controller_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let subscription = state.notifications.subscribe_controller();
    ws.on_upgrade(move |socket| stream_notifications(socket, subscription, "controller".to_string()))
}

async fn stream_notifications(socket: WebSocket, mut subscription: Subscription, label: String) {
    let connection_id = Uuid::new_v4();
    info!("新的通知 WebSocket 连接: {} ({})", connection_id, label);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(notification) = subscription.next().await {
            if let Err(e) = send_notification(&mut ws_sender, &notification).await {
                error!("发送通知失败: {}", e);
                return;
            }
        }
        // 通知流结束（项目已关闭）
        let _ = ws_sender.send(AxumWsMessage::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(AxumWsMessage::Close(_)) => break,
                Ok(_) => debug!("忽略客户端消息"),
                Err(e) => {
                    debug!("接收客户端消息错误: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    info!("通知 WebSocket 连接已关闭: {} ({})", connection_id, label);
}

async fn send_notification(
    sender: &mut SplitSink<WebSocket, AxumWsMessage>,
    notification: &Notification,
) -> Result<(), String> {
    let json = serde_json::to_string(notification)
        .map_err(|e| format!("序列化通知失败: {}", e))?;

    sender
        .send(AxumWsMessage::Text(json))
        .await
        .map_err(|e| format!("发送 WebSocket 消息失败: {}", e))
}
