/// REST 接口
///
/// 所有路由的统一入口

pub mod computes;
pub mod error;
pub mod extract;
pub mod links;
pub mod nodes;
pub mod notifications;
pub mod projects;
pub mod shapes;

use std::future::Future;

use axum::{routing::get, Json, Router};
use common::Error;
use serde_json::{json, Value};

use crate::app_state::AppState;

pub use error::ApiError;

/// 所有 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/version", get(version))
        .route("/node_types", get(nodes::list_node_types))
        .nest("/computes", computes::compute_routes())
        .nest("/projects", projects::project_routes())
        .nest("/notifications", notifications::controller_routes())
}

async fn banner() -> &'static str {
    "Netlab Controller"
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// 在独立任务中执行服务调用
///
/// 客户端断开只会丢弃响应，已发往 Compute 的调用照常完成并提交状态
pub(crate) async fn detached<T, F>(fut: F) -> Result<T, ApiError>
where
    F: Future<Output = common::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError(Error::Internal(format!("后台任务失败: {}", e)))),
    }
}
