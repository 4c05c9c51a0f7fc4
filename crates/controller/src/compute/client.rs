/// Compute 客户端
///
/// `ComputeClient` 是 Controller 与后端之间唯一的调用接口，
/// HTTP 实现之外，测试中使用内存实现替代

use std::time::Duration;

use async_trait::async_trait;
use common::compute_api::{ComputeError, ComputeOperation, HttpMethod};
use common::models::ComputeProtocol;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Compute 调用接口
#[async_trait]
pub trait ComputeClient: Send + Sync + 'static {
    /// 执行一次操作并返回后端的 JSON 响应
    async fn invoke(&self, op: &ComputeOperation, timeout: Duration) -> Result<Value, ComputeError>;
}

/// 基于 REST 的 Compute 客户端
pub struct HttpComputeClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpComputeClient {
    pub fn new(
        protocol: ComputeProtocol,
        host: &str,
        port: u16,
        user: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}://{}:{}", protocol.as_str(), host, port),
            credentials: user.map(|user| (user, password)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_send_error(err: reqwest::Error) -> ComputeError {
    if err.is_timeout() {
        ComputeError::timeout(format!("请求超时: {}", err))
    } else {
        ComputeError::connection_failed(format!("无法连接 Compute: {}", err))
    }
}

/// 从错误响应体中提取消息
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                body.to_string()
            }
        })
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn invoke(&self, op: &ComputeOperation, timeout: Duration) -> Result<Value, ComputeError> {
        let url = format!("{}{}", self.base_url, op.path());
        debug!("{} {}", op.method().as_str(), url);

        let mut request = match op.method() {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Put => self.http.put(&url),
            HttpMethod::Delete => self.http.delete(&url),
        }
        .timeout(timeout);

        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(body) = op.body() {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body = response.text().await.map_err(map_send_error)?;
        if !status.is_success() {
            return Err(ComputeError::backend(
                status.as_u16(),
                error_message(status, &body),
            ));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(ComputeError::invalid_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let client = HttpComputeClient::new(ComputeProtocol::Https, "10.0.0.1", 3080, None, None);
        assert_eq!(client.base_url(), "https://10.0.0.1:3080");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message": "Node not found", "status": 404}"#),
            "Node not found"
        );
        assert_eq!(error_message(StatusCode::CONFLICT, ""), "Conflict");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, "oops"), "oops");
    }

    #[tokio::test]
    async fn test_unreachable_compute_is_transport_error() {
        // 端口 9 (discard) 通常没有监听
        let client = HttpComputeClient::new(ComputeProtocol::Http, "127.0.0.1", 9, None, None);
        let err = client
            .invoke(&ComputeOperation::Version, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
