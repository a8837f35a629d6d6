//! Avatar Engine - 蒙皮角色模型运行时
//!
//! 提供游戏客户端中替换玩家模型所需的核心运行时：
//! - 节点树与组件系统（网格、关节、IK 目标、相机、附加变换）
//! - 分层节点变换（矩阵 / 分解 / Bedrock 枢轴）
//! - 动画通道求值（线性、球面、贝塞尔、Molang 脚本）
//! - 蒙皮矩阵调色板与 CCD IK 求解
//! - 异步引用计数 GPU 资源加载与场景重建

pub mod animation;
pub mod config;
pub mod instance;
pub mod load;
pub mod resource;
pub mod scene;
pub mod skeleton;
pub mod skinning;
pub mod transform;

pub use animation::{Animation, AnimationChannel, AnimationContext, AnimationState, Interpolation};
pub use instance::{CameraTransform, ModelInstance, RenderTask};
pub use load::{ModelLoadInfo, ModelSlots, SceneReconstructor};
pub use resource::{AsyncResourceLoader, Deferred, GpuBackend, RefCountedBuffer, RefCountedTexture};
pub use scene::{Component, ComponentType, Node, NodeId, RenderScene, UpdatePhase};
pub use skeleton::IkSolver;
pub use skinning::{Skin, SkinPalette};
pub use transform::{NodeTransform, TransformId, TransformMap};

use thiserror::Error;

use crate::resource::ResourceError;
use crate::scene::ComponentType as Type;

/// 运行时不变量检查开关（debug 构建或 `validation` feature 时启用）
pub const VALIDATION: bool = cfg!(any(debug_assertions, feature = "validation"));

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("node {node} has more than one {component:?} component")]
    DuplicateComponent { node: usize, component: Type },

    #[error("node {node} has a {component:?} component but no primitive")]
    MissingMesh { node: usize, component: Type },

    #[error("invalid node hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("duplicate {kind} index {index}")]
    DuplicateIndex { kind: &'static str, index: usize },

    #[error("interpolation expects {expected} bezier channels, channel provides {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },

    #[error("interpolation requires a bezier channel component")]
    MissingChannelComponent,

    #[error("{interpolation} interpolation cannot drive {value} channels")]
    UnsupportedInterpolation { interpolation: &'static str, value: &'static str },

    #[error("unsupported transform conversion: {0}")]
    UnsupportedConversion(&'static str),

    #[error("node index {0} out of range")]
    InvalidNodeIndex(usize),

    #[error("invalid keyframe data: {0}")]
    InvalidKeyframeData(String),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("script error: {0}")]
    Script(String),

    #[error("model load superseded by a newer request")]
    LoadCancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;
