/// Compute 调用数据类型定义
///
/// 每个 `ComputeOperation` 对应 Compute 上的一个 REST 接口

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{DataLinkType, NodeType};

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

// ============================================================================
// 调用目标
// ============================================================================

/// Compute 上的某个节点实例
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub project_id: Uuid,
    pub node_type: NodeType,
    pub node_id: Uuid,
}

impl NodeTarget {
    fn path(&self) -> String {
        format!(
            "/v2/compute/projects/{}/{}/nodes/{}",
            self.project_id, self.node_type, self.node_id
        )
    }
}

/// 节点上的某个适配器端口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTarget {
    pub node: NodeTarget,
    pub adapter_number: u32,
    pub port_number: u32,
}

impl PortTarget {
    fn path(&self) -> String {
        format!(
            "{}/adapters/{}/ports/{}",
            self.node.path(),
            self.adapter_number,
            self.port_number
        )
    }
}

// ============================================================================
// NIO
// ============================================================================

/// Compute 本地的网络 I/O 绑定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Nio {
    /// UDP 隧道：本地监听 lport，向 rhost:rport 发送
    #[serde(rename = "nio_udp")]
    Udp {
        lport: u16,
        rhost: String,
        rport: u16,
    },
}

/// 抓包请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureRequest {
    pub capture_file_name: String,
    pub data_link_type: DataLinkType,
}

// ============================================================================
// 操作
// ============================================================================

/// Controller 发往 Compute 的操作
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOperation {
    /// 版本查询，兼作健康检查
    Version,
    CreateProject { project_id: Uuid, name: String },
    CloseProject { project_id: Uuid },
    CreateNode {
        project_id: Uuid,
        node_type: NodeType,
        body: Value,
    },
    UpdateNode { target: NodeTarget, body: Value },
    GetNode { target: NodeTarget },
    StartNode { target: NodeTarget },
    StopNode { target: NodeTarget },
    SuspendNode { target: NodeTarget },
    ReloadNode { target: NodeTarget },
    DeleteNode { target: NodeTarget },
    AddNio { target: PortTarget, nio: Nio },
    DeleteNio { target: PortTarget },
    StartCapture { target: PortTarget, capture: CaptureRequest },
    StopCapture { target: PortTarget },
}

impl ComputeOperation {
    /// 操作名（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::CreateProject { .. } => "create_project",
            Self::CloseProject { .. } => "close_project",
            Self::CreateNode { .. } => "create_node",
            Self::UpdateNode { .. } => "update_node",
            Self::GetNode { .. } => "get_node",
            Self::StartNode { .. } => "start_node",
            Self::StopNode { .. } => "stop_node",
            Self::SuspendNode { .. } => "suspend_node",
            Self::ReloadNode { .. } => "reload_node",
            Self::DeleteNode { .. } => "delete_node",
            Self::AddNio { .. } => "add_nio",
            Self::DeleteNio { .. } => "delete_nio",
            Self::StartCapture { .. } => "start_capture",
            Self::StopCapture { .. } => "stop_capture",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Version | Self::GetNode { .. } => HttpMethod::Get,
            Self::UpdateNode { .. } => HttpMethod::Put,
            Self::DeleteNode { .. } | Self::DeleteNio { .. } => HttpMethod::Delete,
            _ => HttpMethod::Post,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Version => "/v2/compute/version".to_string(),
            Self::CreateProject { .. } => "/v2/compute/projects".to_string(),
            Self::CloseProject { project_id } => {
                format!("/v2/compute/projects/{}/close", project_id)
            }
            Self::CreateNode {
                project_id,
                node_type,
                ..
            } => format!("/v2/compute/projects/{}/{}/nodes", project_id, node_type),
            Self::UpdateNode { target, .. }
            | Self::GetNode { target }
            | Self::DeleteNode { target } => target.path(),
            Self::StartNode { target } => format!("{}/start", target.path()),
            Self::StopNode { target } => format!("{}/stop", target.path()),
            Self::SuspendNode { target } => format!("{}/suspend", target.path()),
            Self::ReloadNode { target } => format!("{}/reload", target.path()),
            Self::AddNio { target, .. } | Self::DeleteNio { target } => {
                format!("{}/nio", target.path())
            }
            Self::StartCapture { target, .. } => format!("{}/start_capture", target.path()),
            Self::StopCapture { target } => format!("{}/stop_capture", target.path()),
        }
    }

    /// 请求体（无请求体时为 None）
    pub fn body(&self) -> Option<Value> {
        match self {
            Self::CreateProject { project_id, name } => Some(json!({
                "project_id": project_id,
                "name": name,
            })),
            Self::CreateNode { body, .. } | Self::UpdateNode { body, .. } => Some(body.clone()),
            Self::AddNio { nio, .. } => serde_json::to_value(nio).ok(),
            Self::StartCapture { capture, .. } => serde_json::to_value(capture).ok(),
            _ => None,
        }
    }
}
