/// 业务逻辑服务层

pub mod compute_service;
pub mod link_service;
pub mod node_service;
pub mod project_service;
pub mod shape_service;
