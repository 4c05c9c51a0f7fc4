/// Compute 注册表
///
/// 负责管理所有 Compute 后端，所有发往后端的调用都经过 `invoke`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::compute_api::{ComputeError, ComputeOperation};
use common::models::{ComputeProtocol, ComputeStatus};
use common::{Error, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ComputeClient;
use crate::models::compute::{ComputeSpec, ComputeSummary, ComputeUsage};
use crate::notifications::{event, NotificationBus};

/// Compute 运行时状态
#[derive(Debug, Clone)]
struct ComputeRuntime {
    status: ComputeStatus,
    usage: ComputeUsage,
    last_seen: Option<DateTime<Utc>>,
}

/// 已注册的 Compute
pub struct Compute {
    pub compute_id: String,
    pub name: String,
    pub host: String,
    pub host_ip: Option<String>,
    pub port: u16,
    pub protocol: ComputeProtocol,
    pub user: Option<String>,
    password: Option<String>,
    client: Arc<dyn ComputeClient>,
    runtime: RwLock<ComputeRuntime>,
    /// 注销时取消通知监听等后台任务
    shutdown: CancellationToken,
}

impl Compute {
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// UDP 隧道对端使用的地址
    pub fn tunnel_host(&self) -> &str {
        self.host_ip.as_deref().unwrap_or(&self.host)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn status(&self) -> ComputeStatus {
        self.runtime.read().await.status
    }

    pub async fn summary(&self) -> ComputeSummary {
        let runtime = self.runtime.read().await;
        ComputeSummary {
            compute_id: self.compute_id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            host_ip: self.host_ip.clone(),
            port: self.port,
            protocol: self.protocol,
            user: self.user.clone(),
            status: runtime.status,
            usage: runtime.usage.clone(),
            last_seen: runtime.last_seen,
        }
    }

    /// 更新连接状态，返回状态是否发生变化
    async fn set_status(&self, status: ComputeStatus) -> bool {
        let mut runtime = self.runtime.write().await;
        if status == ComputeStatus::Connected {
            runtime.last_seen = Some(Utc::now());
        }
        let changed = runtime.status != status;
        runtime.status = status;
        changed
    }
}

/// Compute 注册表
#[derive(Clone)]
pub struct ComputeRegistry {
    /// compute_id -> Compute
    computes: Arc<RwLock<HashMap<String, Arc<Compute>>>>,
    timeout: Duration,
    bus: NotificationBus,
}

impl ComputeRegistry {
    pub fn new(timeout: Duration, bus: NotificationBus) -> Self {
        Self {
            computes: Arc::new(RwLock::new(HashMap::new())),
            timeout,
            bus,
        }
    }

    /// 注册 Compute，初始状态为未连接
    pub async fn register(
        &self,
        spec: ComputeSpec,
        client: Arc<dyn ComputeClient>,
    ) -> Result<Arc<Compute>> {
        let mut computes = self.computes.write().await;
        if computes.contains_key(&spec.compute_id) {
            return Err(Error::conflict(format!(
                "Compute 已存在: {}",
                spec.compute_id
            )));
        }

        let compute = Arc::new(Compute {
            name: spec.name.clone().unwrap_or_else(|| spec.compute_id.clone()),
            compute_id: spec.compute_id,
            host: spec.host,
            host_ip: spec.host_ip,
            port: spec.port,
            protocol: spec.protocol,
            user: spec.user,
            password: spec.password,
            client,
            runtime: RwLock::new(ComputeRuntime {
                status: ComputeStatus::Disconnected,
                usage: ComputeUsage::default(),
                last_seen: None,
            }),
            shutdown: CancellationToken::new(),
        });
        computes.insert(compute.compute_id.clone(), compute.clone());
        drop(computes);

        info!(
            "Compute 已注册: {} ({}:{})",
            compute.compute_id, compute.host, compute.port
        );
        self.bus
            .publish_controller("compute.created", event(&compute.summary().await));
        Ok(compute)
    }

    /// 注销 Compute，并停止其后台任务
    pub async fn remove(&self, compute_id: &str) -> Result<Arc<Compute>> {
        let mut computes = self.computes.write().await;
        let compute = computes
            .remove(compute_id)
            .ok_or_else(|| Error::not_found(format!("Compute 不存在: {}", compute_id)))?;
        compute.shutdown.cancel();
        info!("Compute 已注销: {}", compute_id);
        Ok(compute)
    }

    pub async fn get(&self, compute_id: &str) -> Result<Arc<Compute>> {
        let computes = self.computes.read().await;
        computes
            .get(compute_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Compute 不存在: {}", compute_id)))
    }

    pub async fn list(&self) -> Vec<ComputeSummary> {
        let computes: Vec<Arc<Compute>> = {
            let computes = self.computes.read().await;
            computes.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(computes.len());
        for compute in computes {
            summaries.push(compute.summary().await);
        }
        summaries.sort_by(|a, b| a.compute_id.cmp(&b.compute_id));
        summaries
    }

    /// 调用 Compute
    ///
    /// 成功或后端返回错误都说明 Compute 可达；超时与连接失败将其标记为未连接。
    /// 超时不代表操作被拒绝，调用方需要重新查询实体状态
    pub async fn invoke(&self, compute_id: &str, op: ComputeOperation) -> Result<Value> {
        let compute = self.get(compute_id).await?;

        info!("📤 [Controller -> Compute] {}: compute={}", op.name(), compute_id);
        debug!("📤 请求: {} {}", op.method().as_str(), op.path());

        let result = match tokio::time::timeout(self.timeout, compute.client.invoke(&op, self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ComputeError::timeout(format!(
                "{} 超时 ({}秒)",
                op.name(),
                self.timeout.as_secs_f32()
            ))),
        };

        match &result {
            Ok(_) => {
                info!("📥 [Compute -> Controller] {} 成功: compute={}", op.name(), compute_id);
                self.mark(&compute, ComputeStatus::Connected).await;
            }
            Err(err) if err.is_transport() => {
                warn!("📥 [Compute -> Controller] {} 传输失败: compute={}, {}", op.name(), compute_id, err);
                self.mark(&compute, ComputeStatus::Disconnected).await;
            }
            Err(err) => {
                warn!("📥 [Compute -> Controller] {} 被拒绝: compute={}, {}", op.name(), compute_id, err);
                self.mark(&compute, ComputeStatus::Connected).await;
            }
        }

        result.map_err(Error::from)
    }

    async fn mark(&self, compute: &Compute, status: ComputeStatus) {
        if compute.set_status(status).await {
            info!("Compute {} 状态变更: {:?}", compute.compute_id, status);
            self.bus
                .publish_controller("compute.updated", event(&compute.summary().await));
        }
    }

    /// 记录 Compute 推送的心跳与资源使用情况
    pub async fn record_ping(&self, compute_id: &str, usage: ComputeUsage) {
        let Ok(compute) = self.get(compute_id).await else {
            return;
        };
        {
            let mut runtime = compute.runtime.write().await;
            runtime.usage = usage;
        }
        self.mark(&compute, ComputeStatus::Connected).await;
    }

    /// 对所有 Compute 执行一次健康检查
    pub async fn health_check_all(&self) {
        let ids: Vec<String> = {
            let computes = self.computes.read().await;
            computes.keys().cloned().collect()
        };

        for compute_id in ids {
            if let Err(e) = self.invoke(&compute_id, ComputeOperation::Version).await {
                debug!("健康检查失败: compute={}, {}", compute_id, e);
            }
        }
    }

    /// 启动健康检查任务
    pub fn start_health_monitor(self, interval_secs: u64) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

            loop {
                interval.tick().await;
                self.health_check_all().await;
            }
        });
    }
}
