//! 场景图
//!
//! - `Node`: 节点（变换、子节点、组件）
//! - `Component`: 封闭的组件集合（网格、关节、附加变换源、相机、IK 目标）
//! - `RenderScene`: 重建完成后的不可变场景，供多个模型实例共享

mod component;
mod expression;
mod node;
mod render_scene;

pub use component::{
    Camera, CameraComponent, Component, ComponentType, InfluenceSourceComponent, JointComponent,
    PrimitiveComponent, SkinJoint,
};
pub use expression::{Expression, MorphTargetBinding};
pub use node::{Node, NodeBuilder};
pub use render_scene::{NodeHandle, RenderScene, SceneId, SceneParts};

use bitflags::bitflags;

/// 引用计数持有的场景，归零时释放全部图元资源
pub type SceneHandle = crate::resource::RefCounted<RenderScene>;

/// 模型标识（由外部加载器分配）
pub type ModelId = u32;

/// 节点标识：模型内的稳定节点 ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub model_id: ModelId,
    pub index: u32,
}

impl NodeId {
    pub const fn new(model_id: ModelId, index: u32) -> Self {
        Self { model_id, index }
    }
}

/// 人形骨骼标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HumanoidTag {
    Hips,
    Spine,
    Chest,
    UpperChest,
    Neck,
    Head,
    LeftEye,
    RightEye,
    LeftShoulder,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    LeftToes,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
    RightToes,
}

// ============================================================================
// 更新阶段
// ============================================================================

/// 每帧更新阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    /// 父链向下传播世界变换（节点自身处理，不属于组件）
    GlobalTransformPropagation,
    IkUpdate,
    InfluenceTransformUpdate,
    RenderDataUpdate,
    CameraUpdate,
    DebugRender,
}

impl UpdatePhase {
    pub fn flag(self) -> UpdatePhases {
        match self {
            UpdatePhase::GlobalTransformPropagation => UpdatePhases::GLOBAL_TRANSFORM_PROPAGATION,
            UpdatePhase::IkUpdate => UpdatePhases::IK_UPDATE,
            UpdatePhase::InfluenceTransformUpdate => UpdatePhases::INFLUENCE_TRANSFORM_UPDATE,
            UpdatePhase::RenderDataUpdate => UpdatePhases::RENDER_DATA_UPDATE,
            UpdatePhase::CameraUpdate => UpdatePhases::CAMERA_UPDATE,
            UpdatePhase::DebugRender => UpdatePhases::DEBUG_RENDER,
        }
    }
}

bitflags! {
    /// 节点参与的阶段集合
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UpdatePhases: u32 {
        const GLOBAL_TRANSFORM_PROPAGATION = 0x0001;
        const IK_UPDATE                    = 0x0002;
        const INFLUENCE_TRANSFORM_UPDATE   = 0x0004;
        const RENDER_DATA_UPDATE           = 0x0008;
        const CAMERA_UPDATE                = 0x0010;
        const DEBUG_RENDER                 = 0x0020;
    }
}
