/// Compute 数据模型

use chrono::{DateTime, Utc};
use common::models::{ComputeProtocol, ComputeStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 注册 Compute 所需的参数（配置文件与 POST /computes 共用）
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ComputeSpec {
    #[validate(length(min = 1, max = 64))]
    pub compute_id: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// 其他 Compute 访问本机时使用的地址，缺省时使用 host
    #[serde(default)]
    #[validate(length(min = 1, max = 255))]
    pub host_ip: Option<String>,

    #[validate(range(min = 1))]
    pub port: u16,

    #[serde(default)]
    pub protocol: ComputeProtocol,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// Compute 最近一次上报的资源使用情况
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComputeUsage {
    #[serde(default)]
    pub cpu_usage_percent: Option<f64>,
    #[serde(default)]
    pub memory_usage_percent: Option<f64>,
}

/// Compute 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeSummary {
    pub compute_id: String,
    pub name: String,
    pub host: String,
    pub host_ip: Option<String>,
    pub port: u16,
    pub protocol: ComputeProtocol,
    pub user: Option<String>,
    pub status: ComputeStatus,
    pub usage: ComputeUsage,
    pub last_seen: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_defaults_and_validation() {
        let spec: ComputeSpec = serde_json::from_value(json!({
            "compute_id": "remote",
            "host": "10.0.0.2",
            "port": 3080,
            "password": "secret"
        }))
        .unwrap();
        assert_eq!(spec.protocol, ComputeProtocol::Http);
        assert!(spec.validate().is_ok());

        // 密码不会出现在序列化结果中
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("password").is_none());

        let bad = ComputeSpec {
            compute_id: String::new(),
            ..spec
        };
        assert!(bad.validate().is_err());
    }
}
