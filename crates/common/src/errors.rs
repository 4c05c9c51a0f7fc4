use thiserror::Error;

use crate::compute_api::{ComputeError, ComputeErrorCode};

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 请求字段缺失或格式错误，端点寻址无效等
    #[error("无效请求: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 删除运行中的节点、端点已被占用、端口耗尽等
    #[error("资源冲突: {0}")]
    Conflict(String),

    /// Compute 后端返回的错误或传输失败
    #[error("Compute 错误: {0}")]
    Compute(#[from] ComputeError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// 是否为可由调用方重试的传输层失败
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Compute(err) if err.is_transport())
    }

    /// Compute 返回的错误码
    pub fn compute_code(&self) -> Option<ComputeErrorCode> {
        match self {
            Error::Compute(err) => Some(err.code),
            _ => None,
        }
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
