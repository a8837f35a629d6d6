//! 蒙皮
//!
//! - `Skin`: 关节节点列表与逆绑定矩阵
//! - `SkinPalette`: 每个实例每个蒙皮一份的双缓冲关节矩阵调色板

mod palette;

pub use palette::SkinPalette;

use glam::Mat4;

/// 蒙皮
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub name: Option<String>,
    /// 关节节点索引（按关节序号排列）
    pub joints: Vec<usize>,
    /// 缺省时所有逆绑定矩阵为单位矩阵
    pub inverse_bind_matrices: Option<Vec<Mat4>>,
}

impl Skin {
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn inverse_bind_matrix(&self, joint_index: usize) -> Mat4 {
        self.inverse_bind_matrices
            .as_ref()
            .and_then(|matrices| matrices.get(joint_index).copied())
            .unwrap_or(Mat4::IDENTITY)
    }

    /// 调色板条目 = 关节世界矩阵 * 逆绑定矩阵
    #[inline]
    pub fn joint_matrix(&self, joint_index: usize, world: Mat4) -> Mat4 {
        world * self.inverse_bind_matrix(joint_index)
    }
}
