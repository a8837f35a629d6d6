//! 渲染任务
//!
//! 提交绘制所需的全部快照。任务持有场景的一份引用，
//! 调用方提交后必须 `release`；未释放就被丢弃时记录警告并补释放。

use std::sync::Arc;

use glam::Mat4;

use crate::resource::RenderPrimitive;
use crate::scene::SceneHandle;

/// 单个图元的绘制参数
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub primitive: Arc<RenderPrimitive>,
    pub model_matrix: Mat4,
    pub skin_index: Option<usize>,
    pub morphed_primitive_index: Option<usize>,
}

#[derive(Debug)]
pub struct RenderTask {
    scene: SceneHandle,
    released: bool,
    pub model_matrix: Mat4,
    /// 打包的光照坐标
    pub light: u32,
    /// 受击 / 闪烁叠加参数
    pub overlay: u32,
    pub draws: Vec<DrawItem>,
    pub skin_palettes: Vec<Arc<[Mat4]>>,
    pub morph_weights: Vec<Arc<[f32]>>,
}

impl RenderTask {
    pub(crate) fn new(
        scene: SceneHandle,
        model_matrix: Mat4,
        light: u32,
        overlay: u32,
        draws: Vec<DrawItem>,
        skin_palettes: Vec<Arc<[Mat4]>>,
        morph_weights: Vec<Arc<[f32]>>,
    ) -> Self {
        scene.increase_reference_count();
        Self { scene, released: false, model_matrix, light, overlay, draws, skin_palettes, morph_weights }
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// 提交完成后释放场景引用
    pub fn release(mut self) {
        self.released = true;
        self.scene.decrease_reference_count();
    }
}

impl Drop for RenderTask {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("[RenderTask] 渲染任务未调用 release 就被丢弃");
            self.scene.decrease_reference_count();
        }
    }
}
