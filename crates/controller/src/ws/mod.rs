/// WebSocket 模块
///
/// - compute_listener：订阅各 Compute 的通知
/// - notification_handler：向客户端推送项目与 Controller 通知

pub mod compute_listener;
pub mod notification_handler;
