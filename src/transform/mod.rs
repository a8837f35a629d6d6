//! 节点变换
//!
//! 三种可互换的表示：
//! - Matrix: 原始 4x4 矩阵
//! - Decomposed: 平移 / 旋转 / 缩放 (TRS)
//! - Bedrock: 基岩版枢轴旋转（缩放 → 枢轴 → 旋转 → 反枢轴 → 平移）

mod map;

pub use map::{TransformId, TransformMap};

use glam::{Mat4, Quat, Vec3};

use crate::{EngineError, Result};

// ============================================================================
// 分解变换
// ============================================================================

/// TRS 分解变换
///
/// 派生矩阵在每次修改后立即重新计算，读取时不再需要 `&mut self`。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    cache: Mat4,
}

impl Decomposed {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        cache: Mat4::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let mut d = Self { translation, rotation, scale, cache: Mat4::IDENTITY };
        d.invalidate();
        d
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.invalidate();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.invalidate();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.invalidate();
    }

    /// 从另一个分解变换复制全部分量
    pub fn set(&mut self, other: &Decomposed) {
        *self = *other;
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        self.cache
    }

    fn invalidate(&mut self) {
        self.cache = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
    }
}

impl Default for Decomposed {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Bedrock 变换
// ============================================================================

/// 基岩版枢轴变换
///
/// matrix = S * T(pivot) * R * T(-pivot) * T(translation)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bedrock {
    pivot: Vec3,
    rotation: Quat,
    translation: Vec3,
    scale: Vec3,
    cache: Mat4,
}

impl Bedrock {
    pub const IDENTITY: Self = Self {
        pivot: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
        cache: Mat4::IDENTITY,
    };

    pub fn new(pivot: Vec3, rotation: Quat, translation: Vec3, scale: Vec3) -> Self {
        let mut b = Self { pivot, rotation, translation, scale, cache: Mat4::IDENTITY };
        b.invalidate();
        b
    }

    #[inline]
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_pivot(&mut self, pivot: Vec3) {
        self.pivot = pivot;
        self.invalidate();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.invalidate();
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.invalidate();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.invalidate();
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        self.cache
    }

    fn invalidate(&mut self) {
        self.cache = Mat4::from_scale(self.scale)
            * Mat4::from_translation(self.pivot)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_translation(-self.pivot)
            * Mat4::from_translation(self.translation);
    }
}

impl Default for Bedrock {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// 节点变换
// ============================================================================

/// 节点变换（三种表示之一）
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeTransform {
    Matrix(Mat4),
    Decomposed(Decomposed),
    Bedrock(Bedrock),
}

impl NodeTransform {
    pub fn decomposed(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::Decomposed(Decomposed::new(translation, rotation, scale))
    }

    pub fn bedrock(pivot: Vec3, rotation: Quat, translation: Vec3, scale: Vec3) -> Self {
        Self::Bedrock(Bedrock::new(pivot, rotation, translation, scale))
    }

    /// 派生矩阵
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        match self {
            Self::Matrix(m) => *m,
            Self::Decomposed(d) => d.matrix(),
            Self::Bedrock(b) => b.matrix(),
        }
    }

    pub fn to_matrix(&self) -> NodeTransform {
        Self::Matrix(self.matrix())
    }

    /// 转换为 TRS 表示
    ///
    /// Bedrock 的枢轴无法用 TRS 表达，返回 `UnsupportedConversion`。
    pub fn to_decomposed(&self) -> Result<Decomposed> {
        match self {
            Self::Matrix(m) => {
                let (scale, rotation, translation) = m.to_scale_rotation_translation();
                Ok(Decomposed::new(translation, rotation, scale))
            }
            Self::Decomposed(d) => Ok(*d),
            Self::Bedrock(_) => Err(EngineError::UnsupportedConversion("bedrock -> decomposed")),
        }
    }

    /// 叠加到已有矩阵上：matrix = matrix * self（用于父链组合）
    #[inline]
    pub fn apply_on_matrix(&self, matrix: &mut Mat4) {
        *matrix *= self.matrix();
    }

    /// 覆盖已有矩阵
    #[inline]
    pub fn set_on_matrix(&self, matrix: &mut Mat4) {
        *matrix = self.matrix();
    }

    pub fn translation(&self) -> Vec3 {
        match self {
            Self::Matrix(m) => m.col(3).truncate(),
            Self::Decomposed(d) => d.translation(),
            Self::Bedrock(b) => b.translation(),
        }
    }

    pub fn rotation(&self) -> Quat {
        match self {
            Self::Matrix(m) => m.to_scale_rotation_translation().1,
            Self::Decomposed(d) => d.rotation().normalize(),
            Self::Bedrock(b) => b.rotation(),
        }
    }

    pub fn scale(&self) -> Vec3 {
        match self {
            Self::Matrix(m) => m.to_scale_rotation_translation().0,
            Self::Decomposed(d) => d.scale(),
            Self::Bedrock(b) => b.scale(),
        }
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::Decomposed(Decomposed::IDENTITY)
    }
}

impl From<Mat4> for NodeTransform {
    fn from(m: Mat4) -> Self {
        Self::Matrix(m)
    }
}

impl From<Decomposed> for NodeTransform {
    fn from(d: Decomposed) -> Self {
        Self::Decomposed(d)
    }
}

impl From<Bedrock> for NodeTransform {
    fn from(b: Bedrock) -> Self {
        Self::Bedrock(b)
    }
}
