/// Controller 内存模型

pub mod compute;
pub mod link;
pub mod node;
pub mod project;
pub mod shape;
