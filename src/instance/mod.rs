//! 模型实例
//!
//! 场景本身不可变且被共享，所有逐帧状态（变换层、世界矩阵、蒙皮调色板、
//! 变形权重、相机）都存放在 `ModelInstance` 中。

mod model_instance;
mod render_task;

pub use model_instance::ModelInstance;
pub use render_task::{DrawItem, RenderTask};

use glam::{Mat4, Quat, Vec3};

use crate::scene::Camera;

/// 相机的世界变换与投影参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTransform {
    pub camera: Camera,
    pub world: Mat4,
    /// 世界矩阵的逆
    pub view: Mat4,
    pub position: Vec3,
    pub rotation: Quat,
}

impl CameraTransform {
    pub fn from_world(camera: Camera, world: Mat4) -> Self {
        let (_, rotation, position) = world.to_scale_rotation_translation();
        Self { camera, world, view: world.inverse(), position, rotation }
    }

    /// 投影矩阵；相机未指定宽高比时使用视口的
    pub fn projection(&self, viewport_aspect: f32) -> Mat4 {
        match self.camera {
            Camera::Perspective { aspect_ratio, yfov, znear, zfar } => {
                let aspect = aspect_ratio.unwrap_or(viewport_aspect);
                match zfar {
                    Some(zfar) => Mat4::perspective_rh(yfov, aspect, znear, zfar),
                    None => Mat4::perspective_infinite_rh(yfov, aspect, znear),
                }
            }
            Camera::Orthographic { xmag, ymag, znear, zfar } => {
                Mat4::orthographic_rh(-xmag, xmag, -ymag, ymag, znear, zfar)
            }
        }
    }
}

/// 调试线段（模型空间）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
}
