/// 图形管理服务

use common::{Error, Result};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::models::shape::{CreateShapeDto, Shape, UpdateShapeDto};
use crate::notifications::event;

pub struct ShapeService {
    state: AppState,
}

impl ShapeService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn list_shapes(&self, project_id: Uuid) -> Result<Vec<Shape>> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let mut shapes: Vec<Shape> = st.shapes.values().cloned().collect();
            shapes.sort_by_key(|s| (s.z, s.shape_id));
            Ok(shapes)
        })
    }

    pub async fn get_shape(&self, project_id: Uuid, shape_id: Uuid) -> Result<Shape> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.shapes
                .get(&shape_id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("图形不存在: {}", shape_id)))
        })
    }

    pub async fn create_shape(&self, project_id: Uuid, dto: CreateShapeDto) -> Result<Shape> {
        dto.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;
        let project = self.state.projects.get(project_id).await?;

        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let shape = Shape {
                shape_id: common::utils::generate_id(),
                project_id,
                x: dto.x,
                y: dto.y,
                z: dto.z,
                rotation: dto.rotation,
                svg: dto.svg,
            };
            st.shapes.insert(shape.shape_id, shape.clone());
            self.state
                .notifications
                .publish(project_id, "shape.created", event(&shape));
            Ok(shape)
        })
    }

    pub async fn update_shape(
        &self,
        project_id: Uuid,
        shape_id: Uuid,
        dto: UpdateShapeDto,
    ) -> Result<Shape> {
        dto.validate()
            .map_err(|e| Error::validation(format!("验证失败: {}", e)))?;
        let project = self.state.projects.get(project_id).await?;

        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let shape = st
                .shapes
                .get_mut(&shape_id)
                .ok_or_else(|| Error::not_found(format!("图形不存在: {}", shape_id)))?;
            shape.apply(dto);
            let shape = shape.clone();
            self.state
                .notifications
                .publish(project_id, "shape.updated", event(&shape));
            Ok(shape)
        })
    }

    pub async fn delete_shape(&self, project_id: Uuid, shape_id: Uuid) -> Result<()> {
        let project = self.state.projects.get(project_id).await?;

        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let shape = st
                .shapes
                .remove(&shape_id)
                .ok_or_else(|| Error::not_found(format!("图形不存在: {}", shape_id)))?;
            self.state
                .notifications
                .publish(project_id, "shape.deleted", event(&shape));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::project_service::ProjectService;
    use crate::testing::test_state;
    use serde_json::json;

    #[tokio::test]
    async fn test_shape_crud() {
        let (state, _) = test_state().await;
        let project_id = ProjectService::new(state.clone())
            .create_project("test".to_string())
            .await
            .unwrap()
            .project_id;
        let service = ShapeService::new(state.clone());

        let dto: CreateShapeDto =
            serde_json::from_value(json!({"x": 10, "y": 20, "svg": "<svg></svg>"})).unwrap();
        let shape = service.create_shape(project_id, dto).await.unwrap();
        assert_eq!(shape.z, 0);

        let update = UpdateShapeDto {
            x: Some(50),
            ..Default::default()
        };
        let updated = service
            .update_shape(project_id, shape.shape_id, update)
            .await
            .unwrap();
        assert_eq!((updated.x, updated.y), (50, 20));

        service.delete_shape(project_id, shape.shape_id).await.unwrap();
        assert!(service.list_shapes(project_id).await.unwrap().is_empty());

        let actions: Vec<String> = state
            .notifications
            .poll(project_id, 0)
            .unwrap()
            .into_iter()
            .map(|n| n.action)
            .collect();
        assert_eq!(actions, vec!["shape.created", "shape.updated", "shape.deleted"]);
    }

    #[tokio::test]
    async fn test_empty_svg_rejected() {
        let (state, _) = test_state().await;
        let project_id = ProjectService::new(state.clone())
            .create_project("test".to_string())
            .await
            .unwrap()
            .project_id;
        let service = ShapeService::new(state);

        let dto: CreateShapeDto =
            serde_json::from_value(json!({"x": 0, "y": 0, "svg": ""})).unwrap();
        assert!(matches!(
            service.create_shape(project_id, dto).await,
            Err(Error::Validation(_))
        ));
    }
}
