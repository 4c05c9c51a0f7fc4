/// Controller -> Compute 通信协议
/// 
/// Controller 通过 REST 调用 Compute，Compute 通过 WebSocket 推送通知

pub mod error;
pub mod message;
pub mod types;

pub use error::{ComputeError, ComputeErrorCode};
pub use message::ComputeNotification;
pub use types::*;
