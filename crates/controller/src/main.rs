/// Netlab Controller
///
/// 网络仿真控制器主程序：管理 Compute、项目拓扑与通知，提供 REST/WebSocket 接口

mod api;
mod app_state;
mod compute;
mod config;
mod models;
mod notifications;
mod project_store;
mod services;
mod ws;

#[cfg(test)]
mod testing;

use axum::Router;
use common::models::constants::LOCAL_COMPUTE_ID;
use common::models::ComputeProtocol;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
    app_state::AppState, models::compute::ComputeSpec, services::compute_service::ComputeService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    info!("🚀 启动 Netlab Controller...");

    dotenvy::dotenv().ok();

    let cfg = config::Config::load()?;
    info!("✅ 配置加载成功");

    let app_state = AppState::new(cfg);
    register_computes(&app_state).await;

    app_state
        .computes
        .clone()
        .start_health_monitor(app_state.config.health_check_interval_secs);
    info!(
        "✅ 健康检查任务已启动（每{}秒）",
        app_state.config.health_check_interval_secs
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let addr = format!(
        "{}:{}",
        app_state.config.server_host, app_state.config.server_port
    );
    info!("🎯 服务器监听在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 注册配置中的 Compute，注册失败只记录错误
async fn register_computes(state: &AppState) {
    let mut specs = state.config.computes.clone();
    if state.config.local_compute && !specs.iter().any(|s| s.compute_id == LOCAL_COMPUTE_ID) {
        specs.insert(
            0,
            ComputeSpec {
                compute_id: LOCAL_COMPUTE_ID.to_string(),
                name: Some("Local".to_string()),
                host: "127.0.0.1".to_string(),
                host_ip: state.config.local_compute_host_ip.clone(),
                port: state.config.local_compute_port,
                protocol: ComputeProtocol::Http,
                user: None,
                password: None,
            },
        );
    }

    let service = ComputeService::new(state.clone());
    for spec in specs {
        let compute_id = spec.compute_id.clone();
        match service.add_compute(spec).await {
            Ok(summary) => info!("✅ Compute 已注册: {} ({}:{})", compute_id, summary.host, summary.port),
            Err(e) => error!("Compute {} 注册失败: {}", compute_id, e),
        }
    }
}
