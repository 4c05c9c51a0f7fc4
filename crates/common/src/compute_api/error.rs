/// Compute 调用错误定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute 错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComputeErrorCode {
    // 后端返回的错误（不可重试）
    BadRequest,
    NotFound,
    Conflict,
    BackendError,

    // 传输层错误（可由调用方决定是否重试）
    Timeout,
    ConnectionFailed,
    InvalidResponse,
}

impl ComputeErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::BackendError => "BACKEND_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::InvalidResponse
        )
    }
}

impl fmt::Display for ComputeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute 错误
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeError {
    pub code: ComputeErrorCode,
    /// 后端返回的 HTTP 状态码（传输错误时为空）
    pub status: Option<u16>,
    pub message: String,
}

impl ComputeError {
    pub fn new(code: ComputeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
        }
    }

    /// 由后端状态码构造错误
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        let code = match status {
            400 => ComputeErrorCode::BadRequest,
            404 => ComputeErrorCode::NotFound,
            409 => ComputeErrorCode::Conflict,
            _ => ComputeErrorCode::BackendError,
        };
        Self {
            code,
            status: Some(status),
            message: message.into(),
        }
    }

    /// 超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ComputeErrorCode::Timeout, message)
    }

    /// 连接失败
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ComputeErrorCode::ConnectionFailed, message)
    }

    /// 响应无法解析
    pub fn invalid_response(err: impl fmt::Display) -> Self {
        Self::new(
            ComputeErrorCode::InvalidResponse,
            format!("无效的 Compute 响应: {}", err),
        )
    }

    pub fn is_transport(&self) -> bool {
        self.code.is_transport()
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{} {}] {}", self.code, status, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ComputeError {}

impl From<serde_json::Error> for ComputeError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_response(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_mapping() {
        assert_eq!(ComputeError::backend(400, "x").code, ComputeErrorCode::BadRequest);
        assert_eq!(ComputeError::backend(404, "x").code, ComputeErrorCode::NotFound);
        assert_eq!(ComputeError::backend(409, "x").code, ComputeErrorCode::Conflict);

        let err = ComputeError::backend(500, "boom");
        assert_eq!(err.code, ComputeErrorCode::BackendError);
        assert_eq!(err.status, Some(500));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_display() {
        let err = ComputeError::timeout("请求超时");
        assert_eq!(err.to_string(), "[TIMEOUT] 请求超时");
        assert!(err.is_transport());

        let err = ComputeError::backend(404, "node missing");
        assert_eq!(err.to_string(), "[NOT_FOUND 404] node missing");
    }
}
