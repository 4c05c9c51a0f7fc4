/// 项目数据模型

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use common::models::NodeStatus;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::link::{Endpoint, Link};
use super::node::Node;
use super::shape::Shape;

/// 项目
///
/// 项目内的节点、链路和图形只能在 `with_state` 的作用域内修改，
/// 该作用域即项目级互斥锁，不可跨越 await
pub struct Project {
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    state: Mutex<ProjectState>,
}

impl Project {
    pub fn new(project_id: Uuid, name: String) -> Self {
        Self {
            project_id,
            name,
            created_at: Utc::now(),
            state: Mutex::new(ProjectState::default()),
        }
    }

    /// 在项目锁内执行闭包
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ProjectState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn to_response(&self) -> ProjectResponse {
        self.with_state(|st| ProjectResponse {
            project_id: self.project_id,
            name: self.name.clone(),
            created_at: self.created_at,
            node_count: st.nodes.len(),
            link_count: st.links.len(),
            shape_count: st.shapes.len(),
        })
    }
}

/// 项目内部状态
#[derive(Debug, Default)]
pub struct ProjectState {
    pub nodes: HashMap<Uuid, Node>,
    pub links: HashMap<Uuid, Link>,
    pub shapes: HashMap<Uuid, Shape>,
    /// 已被链路占用（或正在建立链路）的端点
    pub claimed: HashMap<Endpoint, Uuid>,
    /// 正在创建中的节点
    pub creating: HashSet<Uuid>,
    /// 正在删除中的节点
    pub deleting: HashSet<Uuid>,
    /// 已在其上打开本项目的 Compute
    pub computes: HashSet<String>,
    /// 项目正在关闭或删除
    pub closing: bool,
}

impl ProjectState {
    pub fn ensure_open(&self, project_id: Uuid) -> Result<()> {
        if self.closing {
            return Err(Error::not_found(format!("项目不存在: {}", project_id)));
        }
        Ok(())
    }

    pub fn node(&self, node_id: Uuid) -> Result<&Node> {
        self.nodes
            .get(&node_id)
            .ok_or_else(|| Error::not_found(format!("节点不存在: {}", node_id)))
    }

    pub fn node_mut(&mut self, node_id: Uuid) -> Result<&mut Node> {
        self.nodes
            .get_mut(&node_id)
            .ok_or_else(|| Error::not_found(format!("节点不存在: {}", node_id)))
    }

    /// 可被修改的节点（未处于删除过程中）
    pub fn writable_node(&self, node_id: Uuid) -> Result<&Node> {
        if self.deleting.contains(&node_id) {
            return Err(Error::conflict(format!("节点正在删除: {}", node_id)));
        }
        self.node(node_id)
    }

    pub fn link(&self, link_id: Uuid) -> Result<&Link> {
        self.links
            .get(&link_id)
            .ok_or_else(|| Error::not_found(format!("链路不存在: {}", link_id)))
    }

    pub fn link_mut(&mut self, link_id: Uuid) -> Result<&mut Link> {
        self.links
            .get_mut(&link_id)
            .ok_or_else(|| Error::not_found(format!("链路不存在: {}", link_id)))
    }

    /// 与节点相连的链路 ID
    pub fn links_touching(&self, node_id: Uuid) -> Vec<Uuid> {
        self.links
            .values()
            .filter(|link| link.touches(node_id))
            .map(|link| link.link_id)
            .collect()
    }

    /// 释放链路占用的端点
    pub fn release_endpoints(&mut self, link_id: Uuid, endpoints: &[Endpoint]) {
        for endpoint in endpoints {
            if self.claimed.get(endpoint) == Some(&link_id) {
                self.claimed.remove(endpoint);
            }
        }
    }

    /// 未停止的节点
    pub fn running_nodes(&self) -> Vec<Uuid> {
        self.nodes
            .values()
            .filter(|node| node.status != NodeStatus::Stopped)
            .map(|node| node.node_id)
            .collect()
    }
}

/// 创建项目 DTO
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProjectDto {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

/// 项目响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub link_count: usize,
    pub shape_count: usize,
}
