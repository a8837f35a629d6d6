//! 分层变换表
//!
//! 每个节点的本地变换由若干层按顺序叠加：
//! Absolute → RelativeAnimation → Influence → Ik → External

use glam::Mat4;

use super::{Bedrock, Decomposed, NodeTransform};
use crate::{EngineError, Result};

/// 变换层标识（按叠加顺序排列）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformId {
    /// 节点自身变换（加载时给出，动画可覆盖）
    Absolute = 0,
    /// 相对动画（叠加在绝对变换之上）
    RelativeAnimation = 1,
    /// 附加变换（InfluenceSource 写入）
    Influence = 2,
    /// IK 求解结果
    Ik = 3,
    /// 外部（宿主）覆盖
    External = 4,
}

impl TransformId {
    pub const COUNT: usize = 5;

    pub const ALL: [TransformId; Self::COUNT] = [
        TransformId::Absolute,
        TransformId::RelativeAnimation,
        TransformId::Influence,
        TransformId::Ik,
        TransformId::External,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 下一层（最后一层返回 None）
    pub fn next(self) -> Option<TransformId> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

/// 分层变换表
#[derive(Clone, Debug)]
pub struct TransformMap {
    layers: [Option<NodeTransform>; TransformId::COUNT],
}

impl TransformMap {
    pub fn new(absolute: NodeTransform) -> Self {
        let mut layers = [None; TransformId::COUNT];
        layers[TransformId::Absolute.index()] = Some(absolute);
        Self { layers }
    }

    pub fn get(&self, id: TransformId) -> Option<&NodeTransform> {
        self.layers[id.index()].as_ref()
    }

    /// 清除从 `id` 开始的所有层（绝对层保留为单位变换）
    pub fn clear_from(&mut self, id: TransformId) {
        for layer in &mut self.layers[id.index()..] {
            *layer = None;
        }
        if id == TransformId::Absolute {
            self.layers[0] = Some(NodeTransform::default());
        }
    }

    /// 仅清除单独一层
    pub fn clear(&mut self, id: TransformId) {
        self.layers[id.index()] = match id {
            TransformId::Absolute => Some(NodeTransform::default()),
            _ => None,
        };
    }

    pub fn set(&mut self, id: TransformId, transform: NodeTransform) {
        self.layers[id.index()] = Some(transform);
    }

    pub fn set_matrix(&mut self, id: TransformId, matrix: Mat4) {
        self.set(id, NodeTransform::Matrix(matrix));
    }

    pub fn set_decomposed(&mut self, id: TransformId, decomposed: Decomposed) {
        self.set(id, NodeTransform::Decomposed(decomposed));
    }

    /// 以 TRS 形式修改某层
    ///
    /// 空层从单位变换开始；矩阵层先分解；Bedrock 层无法分解，返回错误。
    pub fn update_decomposed(&mut self, id: TransformId, updater: impl FnOnce(&mut Decomposed)) -> Result<()> {
        let mut decomposed = match &self.layers[id.index()] {
            None => Decomposed::IDENTITY,
            Some(transform) => transform.to_decomposed()?,
        };
        updater(&mut decomposed);
        self.layers[id.index()] = Some(NodeTransform::Decomposed(decomposed));
        Ok(())
    }

    /// 以 Bedrock 形式修改某层（空层从单位变换开始）
    pub fn update_bedrock(&mut self, id: TransformId, updater: impl FnOnce(&mut Bedrock)) -> Result<()> {
        let mut bedrock = match &self.layers[id.index()] {
            None => Bedrock::IDENTITY,
            Some(NodeTransform::Bedrock(b)) => *b,
            Some(_) => return Err(EngineError::UnsupportedConversion("non-bedrock layer -> bedrock")),
        };
        updater(&mut bedrock);
        self.layers[id.index()] = Some(NodeTransform::Bedrock(bedrock));
        Ok(())
    }

    /// 组合后的本地矩阵
    pub fn matrix(&self) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        for layer in self.layers.iter().flatten() {
            layer.apply_on_matrix(&mut matrix);
        }
        matrix
    }

    /// 组合截止到 `id`（不含）之前的所有层
    pub fn matrix_before(&self, id: TransformId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        for layer in self.layers[..id.index()].iter().flatten() {
            layer.apply_on_matrix(&mut matrix);
        }
        matrix
    }
}
