//! 节点组件
//!
//! 组件集合是封闭的，按类型分派到各更新阶段。

use std::sync::Arc;

use crate::resource::RenderPrimitive;
use crate::skeleton::IkTargetComponent;

use super::UpdatePhase;

/// 组件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Primitive,
    Joint,
    InfluenceSource,
    Camera,
    IkTarget,
}

impl ComponentType {
    /// 同一节点上是否只允许出现一次
    pub fn single_instance(self) -> bool {
        matches!(self, ComponentType::Joint | ComponentType::Camera | ComponentType::IkTarget)
    }

    /// 所在节点是否必须同时挂有网格组件；关节从蒙皮引用节点，不依赖本节点的网格
    pub fn requires_mesh(self) -> bool {
        match self {
            ComponentType::Primitive
            | ComponentType::Joint
            | ComponentType::InfluenceSource
            | ComponentType::Camera
            | ComponentType::IkTarget => false,
        }
    }
}

/// 网格组件：引用一个共享图元
#[derive(Clone, Debug)]
pub struct PrimitiveComponent {
    pub primitive_index: usize,
    pub primitive: Arc<RenderPrimitive>,
    pub skin_index: Option<usize>,
    /// 带变形目标时在实例变形权重表中的位置
    pub morphed_primitive_index: Option<usize>,
}

/// 节点在某个蒙皮中的关节位置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkinJoint {
    pub skin_index: usize,
    pub joint_index: usize,
}

/// 关节组件
///
/// 同一节点可以是多个蒙皮的关节，每个节点只挂一个组件，其余蒙皮中的位置放在 `shared`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointComponent {
    pub skin_index: usize,
    pub joint_index: usize,
    pub shared: Vec<SkinJoint>,
}

impl JointComponent {
    pub fn new(skin_index: usize, joint_index: usize) -> Self {
        Self { skin_index, joint_index, shared: Vec::new() }
    }

    /// 节点在所有蒙皮中的关节位置
    pub fn bindings(&self) -> impl Iterator<Item = SkinJoint> + '_ {
        std::iter::once(SkinJoint { skin_index: self.skin_index, joint_index: self.joint_index })
            .chain(self.shared.iter().copied())
    }
}

/// 附加变换源：把本节点的世界变换按权重写到目标节点
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfluenceSourceComponent {
    pub target_node_index: usize,
    pub influence_rotation: f32,
    pub influence_translation: f32,
    /// true 时叠加到目标已有附加层上，否则覆盖
    pub append_local: bool,
}

/// 相机参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Camera {
    Perspective {
        aspect_ratio: Option<f32>,
        yfov: f32,
        znear: f32,
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraComponent {
    pub camera_index: usize,
    pub camera: Camera,
}

/// 节点组件
#[derive(Clone, Debug)]
pub enum Component {
    Primitive(PrimitiveComponent),
    Joint(JointComponent),
    InfluenceSource(InfluenceSourceComponent),
    Camera(CameraComponent),
    IkTarget(IkTargetComponent),
}

impl Component {
    pub fn component_type(&self) -> ComponentType {
        match self {
            Component::Primitive(_) => ComponentType::Primitive,
            Component::Joint(_) => ComponentType::Joint,
            Component::InfluenceSource(_) => ComponentType::InfluenceSource,
            Component::Camera(_) => ComponentType::Camera,
            Component::IkTarget(_) => ComponentType::IkTarget,
        }
    }

    /// 组件参与的阶段
    pub fn update_phases(&self) -> &'static [UpdatePhase] {
        match self {
            Component::Primitive(_) => &[UpdatePhase::RenderDataUpdate],
            Component::Joint(_) => &[UpdatePhase::RenderDataUpdate, UpdatePhase::DebugRender],
            Component::InfluenceSource(_) => &[UpdatePhase::InfluenceTransformUpdate],
            Component::Camera(_) => &[UpdatePhase::CameraUpdate],
            Component::IkTarget(_) => &[UpdatePhase::IkUpdate],
        }
    }
}
