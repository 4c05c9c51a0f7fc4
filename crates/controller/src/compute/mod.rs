/// Compute 后端管理
///
/// 包括客户端、注册表以及端口分配

pub mod allocator;
pub mod client;
pub mod registry;

pub use allocator::{PortRange, ResourceAllocator};
pub use client::{ComputeClient, HttpComputeClient};
pub use registry::{Compute, ComputeRegistry};
