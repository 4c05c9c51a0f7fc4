/// Netlab Controller - 公共库
/// 
/// 提供 Controller 与 Compute 之间共享的类型、错误处理、通信协议与工具函数

pub mod compute_api;
pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use compute_api::{ComputeError, ComputeErrorCode, ComputeNotification, ComputeOperation};
pub use errors::{Error, Result};
