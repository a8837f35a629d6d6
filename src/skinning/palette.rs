//! 关节矩阵调色板
//!
//! RenderDataUpdate 阶段写入后台缓冲，阶段结束时整体发布；
//! 渲染任务只持有已发布的快照，不会读到写了一半的调色板。

use std::sync::Arc;

use glam::Mat4;

use crate::VALIDATION;

#[derive(Clone, Debug)]
pub struct SkinPalette {
    writing: Vec<Mat4>,
    published: Arc<[Mat4]>,
    in_write: bool,
}

impl SkinPalette {
    pub fn new(joint_count: usize) -> Self {
        Self {
            writing: vec![Mat4::IDENTITY; joint_count],
            published: vec![Mat4::IDENTITY; joint_count].into(),
            in_write: false,
        }
    }

    pub fn len(&self) -> usize {
        self.writing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writing.is_empty()
    }

    /// 开始写入（RenderDataUpdate 阶段开始）
    pub fn begin_write(&mut self) {
        self.in_write = true;
    }

    pub fn is_writing(&self) -> bool {
        self.in_write
    }

    /// 写入单个关节矩阵
    pub fn set(&mut self, joint_index: usize, matrix: Mat4) {
        if VALIDATION {
            assert!(self.in_write, "skin palette written outside of RenderDataUpdate");
        }
        if let Some(slot) = self.writing.get_mut(joint_index) {
            *slot = matrix;
        } else {
            log::warn!("[Skin] 关节索引 {} 超出调色板大小 {}", joint_index, self.writing.len());
        }
    }

    /// 发布后台缓冲（RenderDataUpdate 阶段结束）
    pub fn publish(&mut self) {
        self.published = Arc::from(self.writing.as_slice());
        self.in_write = false;
    }

    /// 已发布的调色板快照
    pub fn snapshot(&self) -> Arc<[Mat4]> {
        Arc::clone(&self.published)
    }
}
