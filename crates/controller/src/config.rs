/// 配置管理

use common::models::constants::{
    DEFAULT_COMPUTE_TIMEOUT, DEFAULT_CONSOLE_PORT_RANGE, DEFAULT_CONTROLLER_PORT,
    DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_LOCAL_COMPUTE_PORT, DEFAULT_NOTIFICATION_LOG_LIMIT,
    DEFAULT_UDP_PORT_RANGE,
};
use serde::Deserialize;
use validator::Validate;

use crate::compute::allocator::PortRange;
use crate::models::compute::ComputeSpec;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// 单次 Compute 调用的超时时间
    pub compute_timeout_secs: u64,
    pub health_check_interval_secs: u64,
    /// Compute 通知连接断开后的重连间隔
    pub notification_reconnect_secs: u64,
    /// 每个项目保留的通知条数
    pub notification_log_limit: usize,
    pub console_port_range: PortRange,
    pub udp_port_range: PortRange,
    /// 是否注册本地 Compute
    pub local_compute: bool,
    /// 本地 Compute 的监听端口，不能与 server_port 相同
    pub local_compute_port: u16,
    /// 其他 Compute 建立隧道时访问本地 Compute 的地址
    pub local_compute_host_ip: Option<String>,
    pub computes: Vec<ComputeSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: DEFAULT_CONTROLLER_PORT,
            compute_timeout_secs: DEFAULT_COMPUTE_TIMEOUT,
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL,
            notification_reconnect_secs: 5,
            notification_log_limit: DEFAULT_NOTIFICATION_LOG_LIMIT,
            console_port_range: PortRange::new(
                DEFAULT_CONSOLE_PORT_RANGE.0,
                DEFAULT_CONSOLE_PORT_RANGE.1,
            ),
            udp_port_range: PortRange::new(DEFAULT_UDP_PORT_RANGE.0, DEFAULT_UDP_PORT_RANGE.1),
            local_compute: true,
            local_compute_port: DEFAULT_LOCAL_COMPUTE_PORT,
            local_compute_host_ip: None,
            computes: Vec::new(),
        }
    }
}

impl Config {
    /// 加载配置：默认值 -> controller.toml（可选）-> CONTROLLER_ 前缀的环境变量
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONTROLLER_CONFIG").unwrap_or_else(|_| "controller".to_string());

        let cfg: Config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("CONTROLLER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.console_port_range.is_empty() {
            anyhow::bail!("无效的控制台端口范围: {}", self.console_port_range);
        }
        if self.udp_port_range.is_empty() {
            anyhow::bail!("无效的 UDP 端口范围: {}", self.udp_port_range);
        }
        if self.console_port_range.overlaps(&self.udp_port_range) {
            anyhow::bail!(
                "控制台端口范围 {} 与 UDP 端口范围 {} 重叠",
                self.console_port_range,
                self.udp_port_range
            );
        }
        if self.local_compute && self.local_compute_port == self.server_port {
            anyhow::bail!(
                "local_compute_port 不能与 server_port 相同 ({})",
                self.server_port
            );
        }
        if self.compute_timeout_secs == 0 {
            anyhow::bail!("compute_timeout_secs 必须大于 0");
        }
        for spec in &self.computes {
            spec.validate()
                .map_err(|e| anyhow::anyhow!("Compute {} 配置无效: {}", spec.compute_id, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.check().is_ok());
        assert_eq!(cfg.server_port, 3080);
        assert!(cfg.local_compute);
        assert_ne!(cfg.local_compute_port, cfg.server_port);
    }

    #[test]
    fn test_local_compute_port_must_differ_from_server_port() {
        let cfg = Config {
            local_compute_port: 3080,
            ..Config::default()
        };
        assert!(cfg.check().is_err());

        let without_local = Config {
            local_compute: false,
            ..cfg
        };
        assert!(without_local.check().is_ok());
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let cfg = Config {
            udp_port_range: PortRange::new(9000, 12000),
            ..Config::default()
        };
        assert!(cfg.check().is_err());
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                server_port = 4000
                [[computes]]
                compute_id = "remote-1"
                host = "10.0.0.5"
                port = 3080
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.server_port, 4000);
        assert_eq!(cfg.compute_timeout_secs, DEFAULT_COMPUTE_TIMEOUT);
        assert_eq!(cfg.computes.len(), 1);
        assert_eq!(cfg.computes[0].host, "10.0.0.5");
        assert!(cfg.check().is_ok());
    }
}
