/// 资源分配器
///
/// 按 Compute 分配控制台 TCP 端口与链路 UDP 端口，同一 Compute 上的分配互斥进行

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 端口范围（闭区间）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// 单个 Compute 上已占用的端口
#[derive(Debug, Default)]
struct ComputePorts {
    console: BTreeSet<u16>,
    udp: BTreeSet<u16>,
}

/// 端口类别
#[derive(Debug, Clone, Copy)]
enum PortKind {
    Console,
    Udp,
}

impl ComputePorts {
    fn used(&mut self, kind: PortKind) -> &mut BTreeSet<u16> {
        match kind {
            PortKind::Console => &mut self.console,
            PortKind::Udp => &mut self.udp,
        }
    }
}

#[derive(Clone)]
pub struct ResourceAllocator {
    console_range: PortRange,
    udp_range: PortRange,
    /// compute_id -> 端口占用表
    pools: Arc<Mutex<HashMap<String, Arc<Mutex<ComputePorts>>>>>,
}

impl ResourceAllocator {
    pub fn new(console_range: PortRange, udp_range: PortRange) -> Self {
        Self {
            console_range,
            udp_range,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pool(&self, compute_id: &str) -> Arc<Mutex<ComputePorts>> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools.entry(compute_id.to_string()).or_default().clone()
    }

    /// 在范围内按首次适配分配
    fn allocate(&self, compute_id: &str, kind: PortKind, range: PortRange) -> Result<u16> {
        let pool = self.pool(compute_id);
        let mut ports = pool.lock().unwrap_or_else(PoisonError::into_inner);
        let used = ports.used(kind);

        let port = (range.start..=range.end)
            .find(|port| !used.contains(port))
            .ok_or_else(|| {
                Error::conflict(format!(
                    "Compute {} 上 {:?} 端口已耗尽 ({})",
                    compute_id, kind, range
                ))
            })?;
        used.insert(port);

        debug!("分配端口: compute={}, kind={:?}, port={}", compute_id, kind, port);
        Ok(port)
    }

    fn release(&self, compute_id: &str, kind: PortKind, port: u16) {
        let pool = self.pool(compute_id);
        let mut ports = pool.lock().unwrap_or_else(PoisonError::into_inner);
        if ports.used(kind).remove(&port) {
            debug!("释放端口: compute={}, kind={:?}, port={}", compute_id, kind, port);
        }
    }

    /// 分配控制台端口；未指定范围时使用配置的默认范围
    pub fn allocate_console_port(
        &self,
        compute_id: &str,
        preferred_range: Option<PortRange>,
    ) -> Result<u16> {
        let range = preferred_range.unwrap_or(self.console_range);
        if range.is_empty() {
            return Err(Error::validation(format!("无效的端口范围: {}", range)));
        }
        self.allocate(compute_id, PortKind::Console, range)
    }

    /// 占用指定的控制台端口，端口须在控制台范围内
    pub fn reserve_console_port(&self, compute_id: &str, port: u16) -> Result<u16> {
        if !self.console_range.contains(port) {
            return Err(Error::validation(format!(
                "控制台端口 {} 不在范围 {} 内",
                port, self.console_range
            )));
        }
        let pool = self.pool(compute_id);
        let mut ports = pool.lock().unwrap_or_else(PoisonError::into_inner);
        if !ports.console.insert(port) {
            return Err(Error::conflict(format!(
                "控制台端口 {} 在 Compute {} 上已被占用",
                port, compute_id
            )));
        }
        Ok(port)
    }

    /// 释放控制台端口；重复释放为空操作
    pub fn release_console_port(&self, compute_id: &str, port: u16) {
        self.release(compute_id, PortKind::Console, port)
    }

    pub fn allocate_udp_port(&self, compute_id: &str) -> Result<u16> {
        self.allocate(compute_id, PortKind::Udp, self.udp_range)
    }

    pub fn release_udp_port(&self, compute_id: &str, port: u16) {
        self.release(compute_id, PortKind::Udp, port)
    }

    /// 某个 Compute 上已占用的控制台端口
    pub fn console_ports_in_use(&self, compute_id: &str) -> Vec<u16> {
        let pool = self.pool(compute_id);
        let ports = pool.lock().unwrap_or_else(PoisonError::into_inner);
        ports.console.iter().copied().collect()
    }

    /// Compute 移除后丢弃其端口表
    pub fn forget_compute(&self, compute_id: &str) {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools.remove(compute_id);
    }
}
