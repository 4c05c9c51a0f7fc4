/// 图形数据模型（仅用于拓扑展示）

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shape {
    pub shape_id: Uuid,
    pub project_id: Uuid,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub rotation: i32,
    pub svg: String,
}

/// 创建图形 DTO
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateShapeDto {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: i32,
    #[serde(default)]
    #[validate(range(min = -359, max = 359))]
    pub rotation: i32,
    #[validate(length(min = 1))]
    pub svg: String,
}

/// 更新图形 DTO
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateShapeDto {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub z: Option<i32>,
    #[validate(range(min = -359, max = 359))]
    pub rotation: Option<i32>,
    #[validate(length(min = 1))]
    pub svg: Option<String>,
}

impl Shape {
    pub fn apply(&mut self, dto: UpdateShapeDto) {
        if let Some(x) = dto.x {
            self.x = x;
        }
        if let Some(y) = dto.y {
            self.y = y;
        }
        if let Some(z) = dto.z {
            self.z = z;
        }
        if let Some(rotation) = dto.rotation {
            self.rotation = rotation;
        }
        if let Some(svg) = dto.svg {
            self.svg = svg;
        }
    }
}
