/// 项目管理服务

use std::sync::Arc;

use common::compute_api::ComputeOperation;
use common::models::NodeStatus;
use common::{Error, Result};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::models::link::Link;
use crate::models::node::Node;
use crate::models::project::{CreateProjectDto, Project, ProjectResponse};
use crate::notifications::event;
use crate::services::link_service::LinkService;

/// 项目结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Close,
    Delete,
}

impl Teardown {
    fn action(&self) -> &'static str {
        match self {
            Teardown::Close => "project.closed",
            Teardown::Delete => "project.deleted",
        }
    }
}

pub struct ProjectService {
    state: AppState,
}

impl ProjectService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn create_project(&self, name: String) -> Result<ProjectResponse> {
        let dto = CreateProjectDto { name };
        dto.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;

        let project = self.state.projects.create(dto.name).await;
        self.state.notifications.open_project(project.project_id);
        let response = project.to_response();
        self.state
            .notifications
            .publish_controller("project.created", event(&response));
        Ok(response)
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<ProjectResponse> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| st.ensure_open(project_id))?;
        Ok(project.to_response())
    }

    pub async fn list_projects(&self) -> Vec<ProjectResponse> {
        self.state
            .projects
            .list()
            .await
            .iter()
            .filter(|project| project.with_state(|st| !st.closing))
            .map(|project| project.to_response())
            .collect()
    }

    /// 关闭项目：停止所有节点并释放全部资源
    pub async fn close_project(&self, project_id: Uuid) -> Result<()> {
        self.teardown(project_id, Teardown::Close).await
    }

    /// 删除项目；存在未停止的节点时冲突
    pub async fn delete_project(&self, project_id: Uuid) -> Result<()> {
        self.teardown(project_id, Teardown::Delete).await
    }

    async fn teardown(&self, project_id: Uuid, mode: Teardown) -> Result<()> {
        let project = self.state.projects.get(project_id).await?;

        let (nodes, links, computes) = project.with_state(|st| {
            st.ensure_open(project_id)?;
            if mode == Teardown::Delete {
                let running = st.running_nodes();
                if !running.is_empty() {
                    return Err(Error::conflict(format!(
                        "项目中有 {} 个节点未停止",
                        running.len()
                    )));
                }
            }
            st.closing = true;
            st.claimed.clear();
            st.shapes.clear();
            let nodes: Vec<Node> = st.nodes.drain().map(|(_, node)| node).collect();
            let links: Vec<Link> = st.links.drain().map(|(_, link)| link).collect();
            let computes: Vec<String> = st.computes.iter().cloned().collect();
            Ok((nodes, links, computes))
        })?;

        info!(
            "开始{}项目 {}: {} 个节点, {} 条链路",
            if mode == Teardown::Close { "关闭" } else { "删除" },
            project_id,
            nodes.len(),
            links.len()
        );

        let link_service = LinkService::new(self.state.clone());
        for link in &links {
            link_service.teardown(link).await;
        }
        for node in &nodes {
            self.release_node(&project, node).await;
        }
        for compute_id in &computes {
            let op = ComputeOperation::CloseProject { project_id };
            if let Err(e) = self.state.computes.invoke(compute_id, op).await {
                warn!("Compute {} 关闭项目失败（忽略）: {}", compute_id, e);
            }
        }

        self.state.projects.remove(project_id).await;
        self.state
            .notifications
            .publish(project_id, mode.action(), event(&project.to_response()));
        self.state.notifications.close_project(project_id);
        self.state
            .notifications
            .publish_controller(mode.action(), json!({"project_id": project_id}));

        info!("✅ 项目已{}: {} ({})", if mode == Teardown::Close { "关闭" } else { "删除" }, project.name, project_id);
        Ok(())
    }

    /// 尽力停止并删除节点，释放控制台端口
    async fn release_node(&self, project: &Arc<Project>, node: &Node) {
        if node.status != NodeStatus::Stopped {
            let op = ComputeOperation::StopNode {
                target: node.target(),
            };
            if let Err(e) = self.state.computes.invoke(&node.compute_id, op).await {
                warn!("停止节点 {} 失败（忽略）: {}", node.node_id, e);
            }
        }

        let op = ComputeOperation::DeleteNode {
            target: node.target(),
        };
        if let Err(e) = self.state.computes.invoke(&node.compute_id, op).await {
            warn!(
                "删除节点 {} 失败（忽略）: project={}, {}",
                node.node_id, project.project_id, e
            );
        }

        if let Some(port) = node.console {
            self.state
                .allocator
                .release_console_port(&node.compute_id, port);
        }
    }
}
