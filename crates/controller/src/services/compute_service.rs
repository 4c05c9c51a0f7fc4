/// Compute 管理服务

use std::sync::Arc;

use common::utils::validate_host;
use common::{Error, Result};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::app_state::AppState;
use crate::compute::{ComputeClient, HttpComputeClient};
use crate::models::compute::{ComputeSpec, ComputeSummary};
use crate::ws::compute_listener;

pub struct ComputeService {
    state: AppState,
}

impl ComputeService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn list_computes(&self) -> Vec<ComputeSummary> {
        self.state.computes.list().await
    }

    pub async fn get_compute(&self, compute_id: &str) -> Result<ComputeSummary> {
        Ok(self.state.computes.get(compute_id).await?.summary().await)
    }

    /// 注册 Compute 并启动其通知监听
    pub async fn add_compute(&self, spec: ComputeSpec) -> Result<ComputeSummary> {
        let client = Self::check_spec(&spec)?;
        self.register(spec, Arc::new(client), true).await
    }

    fn check_spec(spec: &ComputeSpec) -> Result<HttpComputeClient> {
        spec.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;
        if !validate_host(&spec.host) {
            return Err(Error::validation(format!("无效的主机地址: {}", spec.host)));
        }
        if let Some(host_ip) = spec.host_ip.as_deref().filter(|h| !validate_host(h)) {
            return Err(Error::validation(format!("无效的 host_ip: {}", host_ip)));
        }
        Ok(HttpComputeClient::new(
            spec.protocol,
            &spec.host,
            spec.port,
            spec.user.clone(),
            spec.password.clone(),
        ))
    }

    pub(crate) async fn register(
        &self,
        spec: ComputeSpec,
        client: Arc<dyn ComputeClient>,
        listen: bool,
    ) -> Result<ComputeSummary> {
        let compute = self.state.computes.register(spec, client).await?;
        if listen {
            compute_listener::spawn(self.state.clone(), compute.clone());
        }
        Ok(compute.summary().await)
    }

    /// 注销 Compute；仍有节点引用时冲突
    pub async fn remove_compute(&self, compute_id: &str) -> Result<()> {
        self.state.computes.get(compute_id).await?;

        let in_use = self.state.projects.nodes_on_compute(compute_id).await;
        if in_use > 0 {
            return Err(Error::conflict(format!(
                "Compute {} 上仍有 {} 个节点",
                compute_id, in_use
            )));
        }

        self.state.computes.remove(compute_id).await?;
        self.state.allocator.forget_compute(compute_id);
        self.state
            .notifications
            .publish_controller("compute.deleted", json!({"compute_id": compute_id}));
        info!("Compute 已移除: {}", compute_id);
        Ok(())
    }
}
