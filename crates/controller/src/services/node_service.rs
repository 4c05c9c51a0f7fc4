/// 节点管理服务
///
/// 状态机：stopped ⇄ started，支持挂起的类型可进入 suspended。
/// 所有修改遵循 加锁校验 -> 解锁调用 Compute -> 加锁提交并发布通知 的顺序

use std::sync::Arc;

use common::compute_api::{ComputeErrorCode, ComputeOperation};
use common::models::{ConsoleType, NodeStatus, NodeType};
use common::{Error, Result};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::compute::Compute;
use crate::models::node::{user_properties, CreateNodeDto, Node, NodeTypeInfo, UpdateNodeDto};
use crate::models::project::Project;
use crate::notifications::event;
use crate::services::link_service::LinkService;

pub struct NodeService {
    state: AppState,
}

impl NodeService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 支持的节点类型
    pub fn list_node_types() -> Vec<NodeTypeInfo> {
        NodeType::ALL.into_iter().map(NodeTypeInfo::from).collect()
    }

    pub async fn list_nodes(&self, project_id: Uuid) -> Result<Vec<Node>> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let mut nodes: Vec<Node> = st.nodes.values().cloned().collect();
            nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.node_id.cmp(&b.node_id)));
            Ok(nodes)
        })
    }

    pub async fn get_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.node(node_id).cloned()
        })
    }

    /// 创建节点
    ///
    /// 客户端指定的 node_id 已存在时：Compute 与类型一致则直接返回已有节点，否则冲突
    pub async fn create_node(&self, project_id: Uuid, dto: CreateNodeDto) -> Result<Node> {
        dto.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;
        let missing = dto.missing_properties();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "{} 节点缺少必填属性: {}",
                dto.node_type,
                missing.join(", ")
            )));
        }

        let project = self.state.projects.get(project_id).await?;
        let compute = self.state.computes.get(&dto.compute_id).await?;
        let node_id = dto.node_id.unwrap_or_else(common::utils::generate_id);

        let existing = project.with_state(|st| -> Result<Option<Node>> {
            st.ensure_open(project_id)?;
            if let Some(node) = st.nodes.get(&node_id) {
                if node.compute_id == dto.compute_id && node.node_type == dto.node_type {
                    return Ok(Some(node.clone()));
                }
                return Err(Error::conflict(format!(
                    "节点 {} 已存在于 Compute {} ({})",
                    node_id, node.compute_id, node.node_type
                )));
            }
            if !st.creating.insert(node_id) {
                return Err(Error::conflict(format!("节点正在创建: {}", node_id)));
            }
            Ok(None)
        })?;
        if let Some(node) = existing {
            debug!("节点已存在，直接返回: {}", node_id);
            return Ok(node);
        }

        let node = match self.provision(&project, &compute, node_id, &dto).await {
            Ok(node) => node,
            Err(e) => {
                project.with_state(|st| st.creating.remove(&node_id));
                return Err(e);
            }
        };

        let committed = project.with_state(|st| {
            st.creating.remove(&node_id);
            if st.closing {
                return false;
            }
            st.nodes.insert(node_id, node.clone());
            self.state
                .notifications
                .publish(project_id, "node.created", event(&node));
            true
        });

        if !committed {
            warn!("项目 {} 已关闭，回滚节点 {}", project_id, node_id);
            self.discard(&node).await;
            return Err(Error::not_found(format!("项目不存在: {}", project_id)));
        }

        info!(
            "✅ 节点已创建: {} ({}, compute={}, console={:?})",
            node.name, node.node_id, node.compute_id, node.console
        );
        Ok(node)
    }

    /// 分配控制台端口并在 Compute 上创建节点；失败时释放端口
    async fn provision(
        &self,
        project: &Project,
        compute: &Compute,
        node_id: Uuid,
        dto: &CreateNodeDto,
    ) -> Result<Node> {
        self.open_on_compute(project, &compute.compute_id).await?;

        let console_type = dto
            .console_type
            .unwrap_or_else(|| dto.node_type.default_console_type());
        let allocator = &self.state.allocator;
        let console = match (console_type, dto.console) {
            (ConsoleType::None, _) => None,
            (_, Some(port)) => Some(allocator.reserve_console_port(&compute.compute_id, port)?),
            (_, None) => Some(allocator.allocate_console_port(&compute.compute_id, None)?),
        };

        let properties = user_properties(&dto.properties);
        let mut body = properties.clone();
        body.insert("node_id".to_string(), Value::String(node_id.to_string()));
        body.insert("name".to_string(), Value::String(dto.name.clone()));
        body.insert("console".to_string(), serde_json::to_value(console)?);
        body.insert("console_type".to_string(), serde_json::to_value(console_type)?);

        let op = ComputeOperation::CreateNode {
            project_id: project.project_id,
            node_type: dto.node_type,
            body: Value::Object(body),
        };
        let response = match self.state.computes.invoke(&compute.compute_id, op).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(port) = console {
                    allocator.release_console_port(&compute.compute_id, port);
                }
                return Err(e);
            }
        };

        let mut node = Node {
            node_id,
            project_id: project.project_id,
            compute_id: compute.compute_id.clone(),
            name: dto.name.clone(),
            node_type: dto.node_type,
            status: NodeStatus::Stopped,
            console,
            console_host: compute.host.clone(),
            console_type,
            properties,
            stale: false,
        };
        node.merge_properties(&response);
        Ok(node)
    }

    /// 首次在某个 Compute 上创建节点前打开项目
    async fn open_on_compute(&self, project: &Project, compute_id: &str) -> Result<()> {
        if project.with_state(|st| st.computes.contains(compute_id)) {
            return Ok(());
        }

        let op = ComputeOperation::CreateProject {
            project_id: project.project_id,
            name: project.name.clone(),
        };
        match self.state.computes.invoke(compute_id, op).await {
            Ok(_) => {}
            Err(e) if e.compute_code() == Some(ComputeErrorCode::Conflict) => {
                debug!("项目已在 Compute {} 上打开", compute_id);
            }
            Err(e) => return Err(e),
        }

        project.with_state(|st| st.computes.insert(compute_id.to_string()));
        Ok(())
    }

    /// 尽力删除后端实例并释放端口
    async fn discard(&self, node: &Node) {
        let op = ComputeOperation::DeleteNode {
            target: node.target(),
        };
        if let Err(e) = self.state.computes.invoke(&node.compute_id, op).await {
            warn!("回滚节点 {} 失败: {}", node.node_id, e);
        }
        if let Some(port) = node.console {
            self.state
                .allocator
                .release_console_port(&node.compute_id, port);
        }
    }

    /// 读取可修改的节点快照
    async fn snapshot(&self, project_id: Uuid, node_id: Uuid) -> Result<(Arc<Project>, Node)> {
        let project = self.state.projects.get(project_id).await?;
        let node = project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.writable_node(node_id).cloned()
        })?;
        Ok((project, node))
    }

    /// 提交 Compute 调用结果
    ///
    /// 节点已被删除时丢弃更新；传输失败时节点状态未知，标记为 stale
    fn commit_status(
        &self,
        project: &Project,
        node_id: Uuid,
        result: Result<Value>,
        status: NodeStatus,
    ) -> Result<Node> {
        let project_id = project.project_id;
        match result {
            Ok(_) => project.with_state(|st| {
                let Ok(node) = st.node_mut(node_id) else {
                    debug!("节点 {} 已删除，丢弃状态更新", node_id);
                    return Err(Error::not_found(format!("节点不存在: {}", node_id)));
                };
                node.status = status;
                node.stale = false;
                let node = node.clone();
                self.state
                    .notifications
                    .publish(project_id, "node.updated", event(&node));
                Ok(node)
            }),
            Err(e) => {
                if e.is_transport() {
                    project.with_state(|st| {
                        if let Ok(node) = st.node_mut(node_id) {
                            node.stale = true;
                            let node = node.clone();
                            self.state
                                .notifications
                                .publish(project_id, "node.updated", event(&node));
                        }
                    });
                }
                Err(e)
            }
        }
    }

    /// 启动节点；已启动时直接返回
    pub async fn start_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let (project, node) = self.snapshot(project_id, node_id).await?;
        if node.status == NodeStatus::Started {
            return Ok(node);
        }

        let op = ComputeOperation::StartNode {
            target: node.target(),
        };
        let result = self.state.computes.invoke(&node.compute_id, op).await;
        let node = self.commit_status(&project, node_id, result, NodeStatus::Started)?;
        info!("▶️ 节点已启动: {} ({})", node.name, node_id);
        Ok(node)
    }

    /// 停止节点，并停止相连链路上的抓包
    pub async fn stop_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let (project, node) = self.snapshot(project_id, node_id).await?;
        if node.status == NodeStatus::Stopped {
            return Ok(node);
        }

        let op = ComputeOperation::StopNode {
            target: node.target(),
        };
        let result = self.state.computes.invoke(&node.compute_id, op).await;
        let node = self.commit_status(&project, node_id, result, NodeStatus::Stopped)?;
        info!("⏹️ 节点已停止: {} ({})", node.name, node_id);

        LinkService::new(self.state.clone())
            .stop_captures_for_node(&project, node_id)
            .await;
        Ok(node)
    }

    pub async fn suspend_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let (project, node) = self.snapshot(project_id, node_id).await?;
        if !node.node_type.supports_suspend() {
            return Err(Error::validation(format!(
                "{} 节点不支持挂起",
                node.node_type
            )));
        }
        match node.status {
            NodeStatus::Suspended => return Ok(node),
            NodeStatus::Stopped => {
                return Err(Error::conflict(format!("节点未启动: {}", node_id)));
            }
            NodeStatus::Started => {}
        }

        let op = ComputeOperation::SuspendNode {
            target: node.target(),
        };
        let result = self.state.computes.invoke(&node.compute_id, op).await;
        self.commit_status(&project, node_id, result, NodeStatus::Suspended)
    }

    /// 重新加载节点，结束于 started
    pub async fn reload_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let (project, node) = self.snapshot(project_id, node_id).await?;
        if node.status == NodeStatus::Stopped {
            return Err(Error::conflict(format!("节点未启动: {}", node_id)));
        }

        let op = ComputeOperation::ReloadNode {
            target: node.target(),
        };
        let result = self.state.computes.invoke(&node.compute_id, op).await;
        self.commit_status(&project, node_id, result, NodeStatus::Started)
    }

    /// 重新查询后端，采用后端报告的状态
    pub async fn refresh_node(&self, project_id: Uuid, node_id: Uuid) -> Result<Node> {
        let (project, node) = self.snapshot(project_id, node_id).await?;

        let op = ComputeOperation::GetNode {
            target: node.target(),
        };
        let response = self.state.computes.invoke(&node.compute_id, op).await?;
        let status = response
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<NodeStatus>().ok());

        project.with_state(|st| {
            let node = st.node_mut(node_id)?;
            if let Some(status) = status {
                node.status = status;
            }
            node.stale = false;
            node.merge_properties(&response);
            let node = node.clone();
            self.state
                .notifications
                .publish(project_id, "node.updated", event(&node));
            Ok(node)
        })
    }

    pub async fn update_node(
        &self,
        project_id: Uuid,
        node_id: Uuid,
        dto: UpdateNodeDto,
    ) -> Result<Node> {
        dto.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;
        let (project, node) = self.snapshot(project_id, node_id).await?;

        let mut body = dto
            .properties
            .as_ref()
            .map(user_properties)
            .unwrap_or_default();
        if let Some(name) = &dto.name {
            body.insert("name".to_string(), Value::String(name.clone()));
        }

        let op = ComputeOperation::UpdateNode {
            target: node.target(),
            body: Value::Object(body),
        };
        let response = self.state.computes.invoke(&node.compute_id, op).await?;

        project.with_state(|st| {
            let node = st.node_mut(node_id)?;
            if let Some(name) = dto.name {
                node.name = name;
            }
            if let Some(properties) = dto.properties {
                node.merge_properties(&Value::Object(properties));
            }
            node.merge_properties(&response);
            let node = node.clone();
            self.state
                .notifications
                .publish(project_id, "node.updated", event(&node));
            Ok(node)
        })
    }

    /// 删除节点
    ///
    /// 只有已停止的节点可以删除；相连的链路会先被删除
    pub async fn delete_node(&self, project_id: Uuid, node_id: Uuid) -> Result<()> {
        let project = self.state.projects.get(project_id).await?;
        let node = project.with_state(|st| -> Result<Node> {
            st.ensure_open(project_id)?;
            let node = st.writable_node(node_id)?.clone();
            if node.status != NodeStatus::Stopped {
                return Err(Error::conflict(format!(
                    "节点 {} 处于 {} 状态，无法删除",
                    node.name,
                    node.status.as_str()
                )));
            }
            st.deleting.insert(node_id);
            Ok(node)
        })?;

        if let Err(e) = self.teardown(&project, &node).await {
            project.with_state(|st| st.deleting.remove(&node_id));
            return Err(e);
        }

        project.with_state(|st| {
            st.deleting.remove(&node_id);
            st.nodes.remove(&node_id);
            self.state
                .notifications
                .publish(project_id, "node.deleted", event(&node));
        });
        if let Some(port) = node.console {
            self.state
                .allocator
                .release_console_port(&node.compute_id, port);
        }

        info!("🗑️ 节点已删除: {} ({})", node.name, node_id);
        Ok(())
    }

    async fn teardown(&self, project: &Project, node: &Node) -> Result<()> {
        let links = LinkService::new(self.state.clone());
        let link_ids = project.with_state(|st| st.links_touching(node.node_id));
        for link_id in link_ids {
            match links.delete_link(project.project_id, link_id).await {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let op = ComputeOperation::DeleteNode {
            target: node.target(),
        };
        match self.state.computes.invoke(&node.compute_id, op).await {
            Ok(_) => Ok(()),
            Err(e) if e.compute_code() == Some(ComputeErrorCode::NotFound) => {
                warn!("Compute 上已不存在节点 {}，继续删除", node.node_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 应用 Compute 推送的节点状态，并在项目通知流上重新发布 `node.updated`
    ///
    /// 状态未变化时同样发布；节点已删除（或正在删除）时丢弃，返回 None
    pub async fn apply_backend_status(
        &self,
        project_id: Uuid,
        node_id: Uuid,
        status: NodeStatus,
    ) -> Option<Node> {
        let project = self.state.projects.get(project_id).await.ok()?;
        project.with_state(|st| {
            if st.deleting.contains(&node_id) {
                debug!("节点 {} 正在删除，丢弃状态更新", node_id);
                return None;
            }
            let Ok(node) = st.node_mut(node_id) else {
                debug!("节点 {} 不存在，丢弃状态更新", node_id);
                return None;
            };
            if node.status != status || node.stale {
                debug!("节点 {} 状态同步: {:?} -> {:?}", node_id, node.status, status);
            }
            node.status = status;
            node.stale = false;
            let node = node.clone();
            self.state
                .notifications
                .publish(project_id, "node.updated", event(&node));
            Some(node)
        })
    }
}
