/// 应用全局状态

use std::sync::Arc;
use std::time::Duration;

use crate::compute::{ComputeRegistry, ResourceAllocator};
use crate::config::Config;
use crate::notifications::NotificationBus;
use crate::project_store::ProjectStore;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Compute 注册表
    pub computes: ComputeRegistry,
    /// 端口分配器
    pub allocator: ResourceAllocator,
    pub projects: ProjectStore,
    /// 通知总线
    pub notifications: NotificationBus,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let notifications = NotificationBus::new(config.notification_log_limit);
        let computes = ComputeRegistry::new(
            Duration::from_secs(config.compute_timeout_secs),
            notifications.clone(),
        );
        let allocator = ResourceAllocator::new(config.console_port_range, config.udp_port_range);

        Self {
            config: Arc::new(config),
            computes,
            allocator,
            projects: ProjectStore::new(),
            notifications,
        }
    }
}
