/// Compute 推送的通知消息定义

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use super::ComputeError;

/// Compute 通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeNotification {
    /// 事件类型，例如 `node.updated`、`ping`
    pub action: String,

    /// 事件负载
    #[serde(default)]
    pub event: serde_json::Value,
}

impl ComputeNotification {
    pub fn new(action: impl Into<String>, event: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            event,
        }
    }

    /// 事件所属项目
    pub fn project_id(&self) -> Option<Uuid> {
        self.uuid_field("project_id")
    }

    /// 事件涉及的节点
    pub fn node_id(&self) -> Option<Uuid> {
        self.uuid_field("node_id")
    }

    fn uuid_field(&self, key: &str) -> Option<Uuid> {
        self.event
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 消息编解码辅助函数
pub mod codec {
    use super::*;

    /// 解码 WebSocket 消息；控制帧返回 `Ok(None)`
    pub fn decode(ws_msg: WsMessage) -> Result<Option<ComputeNotification>, ComputeError> {
        match ws_msg {
            WsMessage::Text(text) => Ok(Some(ComputeNotification::from_json(&text)?)),
            WsMessage::Binary(data) => {
                let text = String::from_utf8(data).map_err(ComputeError::invalid_response)?;
                Ok(Some(ComputeNotification::from_json(&text)?))
            }
            WsMessage::Close(_) => Err(ComputeError::connection_failed("通知连接已关闭")),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_ids() {
        let project_id = Uuid::new_v4();
        let node_id = Uuid::new_v4();
        let notif = ComputeNotification::new(
            "node.updated",
            json!({"project_id": project_id, "node_id": node_id, "status": "started"}),
        );
        assert_eq!(notif.project_id(), Some(project_id));
        assert_eq!(notif.node_id(), Some(node_id));

        let ping = ComputeNotification::new("ping", json!({"cpu_usage_percent": 3.5}));
        assert_eq!(ping.project_id(), None);
    }

    #[test]
    fn test_decode() {
        let msg = WsMessage::Text(r#"{"action": "ping", "event": {}}"#.to_string());
        let notif = codec::decode(msg).unwrap().unwrap();
        assert_eq!(notif.action, "ping");

        let missing_event = WsMessage::Text(r#"{"action": "log.info"}"#.to_string());
        assert!(codec::decode(missing_event).unwrap().unwrap().event.is_null());

        assert!(codec::decode(WsMessage::Ping(vec![])).unwrap().is_none());
        assert!(codec::decode(WsMessage::Close(None)).is_err());
        assert!(codec::decode(WsMessage::Text("not json".to_string())).is_err());
    }
}
