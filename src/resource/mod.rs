//! GPU 资源
//!
//! - `RefCounted`: 显式引用计数句柄，归零时恰好释放一次
//! - `Deferred` / `Promise`: 异步加载结果
//! - `GpuBackend`: 宿主图形 API 边界
//! - `AsyncResourceLoader`: 去重的异步上传
//! - `RenderPrimitive` / `RenderMaterial`: 场景引用的图元与材质

mod deferred;
mod gpu;
mod loader;
mod primitive;
mod refcount;

pub use deferred::{Deferred, Promise};
pub use gpu::{
    BufferDesc, BufferUsage, GpuBackend, GpuBuffer, GpuTexture, RefCountedBuffer, RefCountedTexture, TextureDesc,
    TextureFormat,
};
pub use loader::{AsyncResourceLoader, BufferSource, SourceKey, TextureSource};
pub use primitive::{
    AlphaMode, MaterialKind, MorphTargetGroup, MorphTargets, PrimitiveTopology, RenderMaterial, RenderPrimitive,
    RenderTexture, TextureFilter, TextureSampler, TextureWrap,
};
pub use refcount::{OnClosed, RefCounted};

use thiserror::Error;

/// 资源错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("gpu allocation failed: {0}")]
    Allocation(String),

    #[error("invalid resource data: {0}")]
    InvalidData(String),

    #[error("resource request abandoned before completion")]
    Abandoned,
}

#[cfg(test)]
pub(crate) mod testing {
    //! 单元测试用的计数后端

    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct CountingBackend {
        next_id: AtomicU64,
        created_buffers: AtomicUsize,
        destroyed_buffers: AtomicUsize,
        created_textures: AtomicUsize,
        destroyed_textures: AtomicUsize,
    }

    impl CountingBackend {
        pub fn created_buffers(&self) -> usize {
            self.created_buffers.load(Ordering::SeqCst)
        }

        pub fn destroyed_buffers(&self) -> usize {
            self.destroyed_buffers.load(Ordering::SeqCst)
        }

        pub fn destroyed_textures(&self) -> usize {
            self.destroyed_textures.load(Ordering::SeqCst)
        }
    }

    impl GpuBackend for CountingBackend {
        fn create_buffer(&self, _desc: &BufferDesc, _data: &[u8]) -> Result<u64, ResourceError> {
            self.created_buffers.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        fn create_texture(&self, _desc: &TextureDesc, _data: &[u8]) -> Result<u64, ResourceError> {
            self.created_textures.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        fn destroy_buffer(&self, _id: u64) {
            self.destroyed_buffers.fetch_add(1, Ordering::SeqCst);
        }

        fn destroy_texture(&self, _id: u64) {
            self.destroyed_textures.fetch_add(1, Ordering::SeqCst);
        }
    }
}
