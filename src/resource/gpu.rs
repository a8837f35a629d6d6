//! GPU 后端边界
//!
//! 引擎只通过 `GpuBackend` 申请和销毁资源，具体图形 API 由宿主实现。

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use super::{OnClosed, RefCounted, ResourceError};

bitflags! {
    /// 缓冲用途
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX       = 0x01;
        const INDEX        = 0x02;
        const MORPH_TARGET = 0x04;
        const UNIFORM      = 0x08;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgba8Srgb,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: Option<String>,
    pub usage: BufferUsage,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// GPU 后端
///
/// `create_*` 可能在加载线程上调用；`destroy_*` 在引用计数归零的线程上调用。
pub trait GpuBackend: Send + Sync {
    fn create_buffer(&self, desc: &BufferDesc, data: &[u8]) -> Result<u64, ResourceError>;
    fn create_texture(&self, desc: &TextureDesc, data: &[u8]) -> Result<u64, ResourceError>;
    fn destroy_buffer(&self, id: u64);
    fn destroy_texture(&self, id: u64);
}

/// 已分配的 GPU 缓冲
pub struct GpuBuffer {
    id: u64,
    desc: BufferDesc,
    backend: Arc<dyn GpuBackend>,
}

impl GpuBuffer {
    pub fn new(id: u64, desc: BufferDesc, backend: Arc<dyn GpuBackend>) -> Self {
        Self { id, desc, backend }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }
}

impl OnClosed for GpuBuffer {
    fn on_closed(&self) {
        log::debug!("[Resource] 释放缓冲 {} ({:?})", self.id, self.desc.label);
        self.backend.destroy_buffer(self.id);
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer").field("id", &self.id).field("desc", &self.desc).finish()
    }
}

/// 已分配的 GPU 纹理
pub struct GpuTexture {
    id: u64,
    desc: TextureDesc,
    backend: Arc<dyn GpuBackend>,
}

impl GpuTexture {
    pub fn new(id: u64, desc: TextureDesc, backend: Arc<dyn GpuBackend>) -> Self {
        Self { id, desc, backend }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

impl OnClosed for GpuTexture {
    fn on_closed(&self) {
        log::debug!("[Resource] 释放纹理 {} ({:?})", self.id, self.desc.label);
        self.backend.destroy_texture(self.id);
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture").field("id", &self.id).field("desc", &self.desc).finish()
    }
}

pub type RefCountedBuffer = RefCounted<GpuBuffer>;
pub type RefCountedTexture = RefCounted<GpuTexture>;
