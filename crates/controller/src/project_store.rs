/// 项目存储
///
/// 仅保存项目索引；项目内实体的修改经由各 Service 在项目锁内完成

use std::collections::HashMap;
use std::sync::Arc;

use common::{Error, Result};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::project::Project;

#[derive(Clone, Default)]
pub struct ProjectStore {
    projects: Arc<RwLock<HashMap<Uuid, Arc<Project>>>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建项目，名称不要求唯一
    pub async fn create(&self, name: String) -> Arc<Project> {
        let project = Arc::new(Project::new(common::utils::generate_id(), name));
        let mut projects = self.projects.write().await;
        projects.insert(project.project_id, project.clone());
        info!("项目已创建: {} ({})", project.name, project.project_id);
        project
    }

    pub async fn get(&self, project_id: Uuid) -> Result<Arc<Project>> {
        let projects = self.projects.read().await;
        projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("项目不存在: {}", project_id)))
    }

    pub async fn list(&self) -> Vec<Arc<Project>> {
        let projects = self.projects.read().await;
        let mut list: Vec<_> = projects.values().cloned().collect();
        list.sort_by_key(|p| p.created_at);
        list
    }

    pub async fn remove(&self, project_id: Uuid) -> Option<Arc<Project>> {
        let mut projects = self.projects.write().await;
        projects.remove(&project_id)
    }

    /// 引用指定 Compute 的节点数量
    pub async fn nodes_on_compute(&self, compute_id: &str) -> usize {
        let projects = self.projects.read().await;
        projects
            .values()
            .map(|project| {
                project.with_state(|st| {
                    st.nodes
                        .values()
                        .filter(|node| node.compute_id == compute_id)
                        .count()
                })
            })
            .sum()
    }
}
