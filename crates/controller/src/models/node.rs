/// 节点数据模型

use common::compute_api::NodeTarget;
use common::models::{ConsoleType, NodeStatus, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

/// 由 Controller 维护、不允许被属性覆盖的字段
pub const RESERVED_KEYS: &[&str] = &[
    "node_id",
    "project_id",
    "compute_id",
    "node_type",
    "name",
    "status",
    "console",
    "console_host",
    "console_type",
];

/// 去掉保留字段后的客户端属性
pub fn user_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// 节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: Uuid,
    pub project_id: Uuid,
    pub compute_id: String,
    pub name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub console: Option<u16>,
    pub console_host: String,
    pub console_type: ConsoleType,
    /// 类型相关属性，原样透传给 Compute
    pub properties: Map<String, Value>,
    /// 传输失败后状态未知，需要刷新
    #[serde(default)]
    pub stale: bool,
}

impl Node {
    pub fn target(&self) -> NodeTarget {
        NodeTarget {
            project_id: self.project_id,
            node_type: self.node_type,
            node_id: self.node_id,
        }
    }

    /// 合并 Compute 返回的属性，保留字段除外
    pub fn merge_properties(&mut self, response: &Value) {
        if let Some(fields) = response.as_object() {
            for (key, value) in fields {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    self.properties.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// 创建节点 DTO
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNodeDto {
    /// 客户端可指定 ID 以便重复提交
    pub node_id: Option<Uuid>,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub node_type: NodeType,

    #[validate(length(min = 1, max = 64))]
    pub compute_id: String,

    /// 指定控制台端口
    pub console: Option<u16>,

    pub console_type: Option<ConsoleType>,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CreateNodeDto {
    /// 检查节点类型要求的必填属性
    pub fn missing_properties(&self) -> Vec<&'static str> {
        self.node_type
            .required_properties()
            .iter()
            .copied()
            .filter(|key| !self.properties.contains_key(*key))
            .collect()
    }
}

/// 更新节点 DTO
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateNodeDto {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    pub properties: Option<Map<String, Value>>,
}

/// 节点类型描述
#[derive(Debug, Clone, Serialize)]
pub struct NodeTypeInfo {
    pub node_type: NodeType,
    pub required_properties: &'static [&'static str],
    pub supports_suspend: bool,
    pub default_console_type: ConsoleType,
    pub builtin: bool,
}

impl From<NodeType> for NodeTypeInfo {
    fn from(node_type: NodeType) -> Self {
        Self {
            node_type,
            required_properties: node_type.required_properties(),
            supports_suspend: node_type.supports_suspend(),
            default_console_type: node_type.default_console_type(),
            builtin: node_type.is_builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_properties() {
        let dto: CreateNodeDto = serde_json::from_value(json!({
            "name": "R1",
            "node_type": "dynamips",
            "compute_id": "local",
            "properties": {"platform": "c7200"}
        }))
        .unwrap();
        assert_eq!(dto.missing_properties(), vec!["image"]);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_reserved_fields() {
        let mut node = Node {
            node_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            compute_id: "local".to_string(),
            name: "PC1".to_string(),
            node_type: NodeType::Vpcs,
            status: NodeStatus::Stopped,
            console: Some(5000),
            console_host: "127.0.0.1".to_string(),
            console_type: ConsoleType::Telnet,
            properties: Map::new(),
            stale: false,
        };
        node.merge_properties(&json!({"status": "started", "console": 1, "startup_script": "ip dhcp"}));

        assert_eq!(node.status, NodeStatus::Stopped);
        assert_eq!(node.console, Some(5000));
        assert_eq!(node.properties["startup_script"], "ip dhcp");
        assert!(!node.properties.contains_key("status"));
    }
}
