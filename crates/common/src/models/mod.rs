/// 共享数据模型
///
/// 定义 Controller 与 Compute 共享的枚举与常量

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Stopped,
    Started,
    Suspended,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Stopped => "stopped",
            NodeStatus::Started => "started",
            NodeStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(NodeStatus::Stopped),
            "started" => Ok(NodeStatus::Started),
            "suspended" => Ok(NodeStatus::Suspended),
            other => Err(format!("未知的节点状态: {}", other)),
        }
    }
}

/// Compute 连接状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComputeStatus {
    Connected,
    Disconnected,
}

/// Compute 访问协议
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeProtocol {
    #[default]
    Http,
    Https,
}

impl ComputeProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeProtocol::Http => "http",
            ComputeProtocol::Https => "https",
        }
    }

    /// 对应的 WebSocket scheme
    pub fn ws_scheme(&self) -> &'static str {
        match self {
            ComputeProtocol::Http => "ws",
            ComputeProtocol::Https => "wss",
        }
    }
}

/// 控制台类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleType {
    Telnet,
    Vnc,
    Http,
    None,
}

/// 节点类型
///
/// 封闭的类型集合；各类型的属性校验交由 Compute 后端完成，
/// Controller 只关心必填属性、是否支持挂起以及默认控制台类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Vpcs,
    Dynamips,
    Iou,
    Qemu,
    Virtualbox,
    Vmware,
    Docker,
    Cloud,
    Nat,
    EthernetHub,
    EthernetSwitch,
    FrameRelaySwitch,
    AtmSwitch,
    Traceng,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        NodeType::Vpcs,
        NodeType::Dynamips,
        NodeType::Iou,
        NodeType::Qemu,
        NodeType::Virtualbox,
        NodeType::Vmware,
        NodeType::Docker,
        NodeType::Cloud,
        NodeType::Nat,
        NodeType::EthernetHub,
        NodeType::EthernetSwitch,
        NodeType::FrameRelaySwitch,
        NodeType::AtmSwitch,
        NodeType::Traceng,
    ];

    /// Compute REST 路径中使用的类型名
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Vpcs => "vpcs",
            NodeType::Dynamips => "dynamips",
            NodeType::Iou => "iou",
            NodeType::Qemu => "qemu",
            NodeType::Virtualbox => "virtualbox",
            NodeType::Vmware => "vmware",
            NodeType::Docker => "docker",
            NodeType::Cloud => "cloud",
            NodeType::Nat => "nat",
            NodeType::EthernetHub => "ethernet_hub",
            NodeType::EthernetSwitch => "ethernet_switch",
            NodeType::FrameRelaySwitch => "frame_relay_switch",
            NodeType::AtmSwitch => "atm_switch",
            NodeType::Traceng => "traceng",
        }
    }

    /// 创建时必须提供的属性
    pub fn required_properties(&self) -> &'static [&'static str] {
        match self {
            NodeType::Dynamips => &["platform", "image"],
            NodeType::Iou => &["path"],
            NodeType::Virtualbox => &["vmname"],
            NodeType::Vmware => &["vmx_path"],
            NodeType::Docker => &["image"],
            _ => &[],
        }
    }

    pub fn supports_suspend(&self) -> bool {
        matches!(
            self,
            NodeType::Dynamips | NodeType::Qemu | NodeType::Virtualbox | NodeType::Vmware
        )
    }

    pub fn default_console_type(&self) -> ConsoleType {
        match self {
            NodeType::Cloud
            | NodeType::Nat
            | NodeType::EthernetHub
            | NodeType::FrameRelaySwitch
            | NodeType::AtmSwitch => ConsoleType::None,
            _ => ConsoleType::Telnet,
        }
    }

    /// 由 Compute 内置实现的节点（无独立模拟器进程）
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            NodeType::Cloud
                | NodeType::Nat
                | NodeType::EthernetHub
                | NodeType::EthernetSwitch
                | NodeType::FrameRelaySwitch
                | NodeType::AtmSwitch
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 抓包链路层类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DataLinkType {
    #[default]
    #[serde(rename = "DLT_EN10MB")]
    En10mb,
    #[serde(rename = "DLT_C_HDLC")]
    CHdlc,
    #[serde(rename = "DLT_PPP_SERIAL")]
    PppSerial,
    #[serde(rename = "DLT_FRELAY")]
    Frelay,
    #[serde(rename = "DLT_ATM_RFC1483")]
    AtmRfc1483,
}

impl DataLinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataLinkType::En10mb => "DLT_EN10MB",
            DataLinkType::CHdlc => "DLT_C_HDLC",
            DataLinkType::PppSerial => "DLT_PPP_SERIAL",
            DataLinkType::Frelay => "DLT_FRELAY",
            DataLinkType::AtmRfc1483 => "DLT_ATM_RFC1483",
        }
    }
}

impl FromStr for DataLinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DLT_EN10MB" => Ok(DataLinkType::En10mb),
            "DLT_C_HDLC" => Ok(DataLinkType::CHdlc),
            "DLT_PPP_SERIAL" => Ok(DataLinkType::PppSerial),
            "DLT_FRELAY" => Ok(DataLinkType::Frelay),
            "DLT_ATM_RFC1483" => Ok(DataLinkType::AtmRfc1483),
            other => Err(format!("不支持的链路层类型: {}", other)),
        }
    }
}

/// 常量定义
pub mod constants {
    /// 默认 Controller 端口
    pub const DEFAULT_CONTROLLER_PORT: u16 = 3080;

    /// 本地 Compute 的 ID
    pub const LOCAL_COMPUTE_ID: &str = "local";

    /// 本地 Compute 的默认端口
    pub const DEFAULT_LOCAL_COMPUTE_PORT: u16 = 3081;

    /// 默认 Compute 请求超时（秒）
    pub const DEFAULT_COMPUTE_TIMEOUT: u64 = 30;

    /// 默认健康检查间隔（秒）
    pub const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 15;

    /// 每个项目保留的通知条数
    pub const DEFAULT_NOTIFICATION_LOG_LIMIT: usize = 1000;

    /// 控制台端口范围
    pub const DEFAULT_CONSOLE_PORT_RANGE: (u16, u16) = (5000, 9999);

    /// UDP 隧道端口范围
    pub const DEFAULT_UDP_PORT_RANGE: (u16, u16) = (10000, 20000);
}
