//! 集成测试公共部分

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Quat, Vec3};

use avatar_engine::load::{ModelLoadInfo, NodeLoadInfo};
use avatar_engine::resource::{BufferDesc, GpuBackend, ResourceError, TextureDesc};
use avatar_engine::scene::{NodeId, SceneHandle};
use avatar_engine::transform::NodeTransform;
use avatar_engine::SceneReconstructor;

pub const MODEL: u32 = 7;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 只计数的 GPU 后端
#[derive(Default)]
pub struct CountingBackend {
    next_id: AtomicU64,
    pub created_buffers: AtomicUsize,
    pub destroyed_buffers: AtomicUsize,
    pub created_textures: AtomicUsize,
    pub destroyed_textures: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

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

pub fn id(index: u32) -> NodeId {
    NodeId::new(MODEL, index)
}

pub fn node(index: u32, translation: Vec3, children: Vec<usize>) -> NodeLoadInfo {
    NodeLoadInfo {
        id: Some(id(index)),
        name: Some(format!("node{}", index)),
        transform: NodeTransform::decomposed(translation, Quat::IDENTITY, Vec3::ONE),
        children,
        ..Default::default()
    }
}

/// 根 (0) → 关节 1 (+Y) → 关节 2 (+Y)
pub fn chain_info() -> ModelLoadInfo {
    ModelLoadInfo {
        model_id: MODEL,
        root_node: 0,
        nodes: vec![node(0, Vec3::ZERO, vec![1]), node(1, Vec3::Y, vec![2]), node(2, Vec3::Y, vec![])],
        ..Default::default()
    }
}

pub fn reconstruct(info: ModelLoadInfo) -> SceneHandle {
    pollster::block_on(SceneReconstructor::reconstruct(info)).expect("reconstruct scene")
}
