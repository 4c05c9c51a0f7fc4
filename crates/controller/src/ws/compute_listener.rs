/// Compute 通知监听
///
/// 每个 Compute 一个后台任务，连接其通知 WebSocket，断开后按配置间隔重连，
/// Compute 注销时退出

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::compute_api::message::codec;
use common::compute_api::{ComputeErrorCode, ComputeNotification};
use common::models::NodeStatus;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::compute::Compute;
use crate::models::compute::ComputeUsage;
use crate::services::node_service::NodeService;

/// 启动监听任务
pub fn spawn(state: AppState, compute: Arc<Compute>) {
    tokio::spawn(async move { run(state, compute).await });
}

async fn run(state: AppState, compute: Arc<Compute>) {
    let token = compute.shutdown_token();
    let reconnect = Duration::from_secs(state.config.notification_reconnect_secs.max(1));

    loop {
        info!("尝试连接 Compute {} 的通知: {}", compute.compute_id, notification_url(&compute));

        tokio::select! {
            _ = token.cancelled() => break,
            result = connect_and_listen(&state, &compute) => match result {
                Ok(()) => info!("Compute {} 通知连接已关闭", compute.compute_id),
                Err(e) => warn!("Compute {} 通知连接错误: {}", compute.compute_id, e),
            },
        }

        debug!("{}秒后重新连接 Compute {}", reconnect.as_secs(), compute.compute_id);
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(reconnect) => {}
        }
    }

    info!("Compute {} 通知监听已停止", compute.compute_id);
}

fn notification_url(compute: &Compute) -> String {
    format!(
        "{}://{}:{}/v2/compute/notifications/ws",
        compute.protocol.ws_scheme(),
        compute.host,
        compute.port
    )
}

async fn connect_and_listen(state: &AppState, compute: &Compute) -> anyhow::Result<()> {
    let mut request = notification_url(compute).into_client_request()?;
    if let Some(user) = &compute.user {
        let credentials = BASE64.encode(format!("{}:{}", user, compute.password().unwrap_or("")));
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", credentials))?,
        );
    }

    let (mut ws_stream, _) = connect_async(request).await?;
    info!("✅ 已连接 Compute {} 的通知", compute.compute_id);

    while let Some(msg) = ws_stream.next().await {
        match codec::decode(msg?) {
            Ok(Some(notification)) => {
                handle_compute_notification(state, &compute.compute_id, notification).await;
            }
            Ok(None) => {}
            Err(e) if e.code == ComputeErrorCode::ConnectionFailed => return Ok(()),
            Err(e) => warn!("无法解析 Compute {} 的通知: {}", compute.compute_id, e),
        }
    }

    Ok(())
}

/// 处理 Compute 推送的通知
///
/// - `ping`：记录资源使用情况
/// - 带状态的 `node.updated`：同步节点状态，已删除的节点被忽略
/// - 其他带 project_id 的事件：转发到项目通知流
pub(crate) async fn handle_compute_notification(
    state: &AppState,
    compute_id: &str,
    notification: ComputeNotification,
) {
    match notification.action.as_str() {
        "ping" => {
            let usage: ComputeUsage =
                serde_json::from_value(notification.event).unwrap_or_default();
            state.computes.record_ping(compute_id, usage).await;
        }
        "node.updated" => {
            let status = notification
                .event
                .get("status")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<NodeStatus>().ok());

            match (notification.project_id(), notification.node_id(), status) {
                (Some(project_id), Some(node_id), Some(status)) => {
                    NodeService::new(state.clone())
                        .apply_backend_status(project_id, node_id, status)
                        .await;
                }
                _ => forward(state, compute_id, notification),
            }
        }
        _ => forward(state, compute_id, notification),
    }
}

fn forward(state: &AppState, compute_id: &str, notification: ComputeNotification) {
    match notification.project_id() {
        Some(project_id) => {
            state
                .notifications
                .publish(project_id, &notification.action, notification.event);
        }
        None => debug!(
            "忽略 Compute {} 的通知: {}",
            compute_id, notification.action
        ),
    }
}
