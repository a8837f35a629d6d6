//! 骨骼 IK
//!
//! - `IkTargetComponent`: 挂在 IK 目标节点上的组件（链、末端、迭代参数）
//! - `IkPose`: 求解器读写节点姿态的接口，由模型实例实现
//! - `IkSolver`: CCD 迭代求解，支持角度限制与单轴模式

mod ik_solver;

pub use ik_solver::{IkSolveStats, IkSolver};

use glam::{Mat4, Quat, Vec3};

use crate::transform::TransformId;

// ============================================================================
// IK 链定义
// ============================================================================

/// 关节欧拉角限制（弧度，按 X / Y / Z 分量）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkLimit {
    pub min: Vec3,
    pub max: Vec3,
}

impl IkLimit {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }
}

/// IK 链中的一个关节
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkChainLink {
    pub node_index: usize,
    pub limit: Option<IkLimit>,
}

/// IK 目标组件
#[derive(Clone, Debug, PartialEq)]
pub struct IkTargetComponent {
    pub ik_index: usize,
    /// 末端节点（需要贴近目标的节点）
    pub effector_node_index: usize,
    /// 从链根到末端的父关节依次排列（求解时逆序遍历）
    pub chain: Vec<IkChainLink>,
    /// 单次迭代单关节最大旋转角
    pub limit_radian: f32,
    pub loop_count: u32,
    /// 求解结果写入的变换层
    pub transform_id: TransformId,
}

impl IkTargetComponent {
    /// 引用的全部节点索引（末端 + 链）
    pub fn referenced_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.effector_node_index).chain(self.chain.iter().map(|link| link.node_index))
    }
}

// ============================================================================
// 姿态访问
// ============================================================================

/// IK 求解器看到的节点姿态
pub trait IkPose {
    /// 节点当前世界矩阵
    fn world_transform(&self, node: usize) -> Mat4;

    /// IK 层之前（动画等）叠加出的本地旋转
    fn base_rotation(&self, node: usize) -> Quat;

    /// 写入节点的 IK 旋转并刷新其子树的世界矩阵
    fn set_ik_rotation(&mut self, node: usize, rotation: Quat);
}
