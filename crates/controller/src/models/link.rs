/// 链路数据模型

use common::compute_api::PortTarget;
use common::models::{DataLinkType, NodeType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 链路端点：(节点, 适配器, 端口)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node_id: Uuid,
    pub adapter_number: u32,
    pub port_number: u32,
}

/// 抓包状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CaptureState {
    #[default]
    Inactive,
    Capturing {
        capture_file_name: String,
        data_link_type: DataLinkType,
        /// 实际执行抓包的端点
        endpoint: Endpoint,
    },
}

impl CaptureState {
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::Capturing { .. })
    }
}

/// 链路一侧的 UDP 隧道参数
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelSide {
    pub endpoint: Endpoint,
    pub compute_id: String,
    pub node_type: NodeType,
    /// 本侧监听端口
    pub udp_port: u16,
}

impl TunnelSide {
    pub fn port_target(&self, project_id: Uuid) -> PortTarget {
        PortTarget {
            node: common::compute_api::NodeTarget {
                project_id,
                node_type: self.node_type,
                node_id: self.endpoint.node_id,
            },
            adapter_number: self.endpoint.adapter_number,
            port_number: self.endpoint.port_number,
        }
    }
}

/// 链路
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Link {
    pub link_id: Uuid,
    pub project_id: Uuid,
    pub nodes: [Endpoint; 2],
    pub capture: CaptureState,
    #[serde(skip)]
    pub tunnel: [TunnelSide; 2],
}

impl Link {
    pub fn touches(&self, node_id: Uuid) -> bool {
        self.nodes.iter().any(|e| e.node_id == node_id)
    }

    pub fn side(&self, endpoint: &Endpoint) -> Option<&TunnelSide> {
        self.tunnel.iter().find(|side| &side.endpoint == endpoint)
    }
}

/// 创建链路 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLinkDto {
    pub nodes: Vec<Endpoint>,
}

/// 开始抓包 DTO
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartCaptureDto {
    pub capture_file_name: Option<String>,
    pub data_link_type: Option<String>,
}
