//! 异步资源加载器
//!
//! 上传在 rayon 线程池上执行，结果以 `Deferred` 返回；相同来源的请求合并为同一个句柄。
//! 每次请求都为调用方持有一份引用，调用方用完后负责 `decrease_reference_count`。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    BufferDesc, BufferUsage, Deferred, GpuBackend, GpuBuffer, GpuTexture, OnClosed, RefCounted, RefCountedBuffer,
    RefCountedTexture, ResourceError, TextureDesc, TextureFormat,
};

/// 资源来源标识（用于去重）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceKey(Arc<str>);

impl SourceKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// 缓冲数据来源
#[derive(Clone, Debug)]
pub struct BufferSource {
    pub key: SourceKey,
    pub label: Option<String>,
    pub usage: BufferUsage,
    pub data: Arc<[u8]>,
}

/// 纹理数据来源（已解码的像素）
#[derive(Clone, Debug)]
pub struct TextureSource {
    pub key: SourceKey,
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Arc<[u8]>,
}

enum SlotState<H> {
    /// 上传中，记录已登记的请求数
    Pending { requests: usize },
    Ready(H),
    Failed,
}

struct Slot<H: Clone + Send + Sync + 'static> {
    deferred: Deferred<H>,
    state: Arc<Mutex<SlotState<H>>>,
}

impl<X: OnClosed + Send + Sync + 'static> Slot<RefCounted<X>> {
    /// 上传中或资源仍在使用
    fn is_live(&self) -> bool {
        match &*self.state.lock() {
            SlotState::Pending { .. } => true,
            SlotState::Ready(handle) => !handle.is_closed(),
            SlotState::Failed => false,
        }
    }
}

type SlotMap<H> = Mutex<HashMap<SourceKey, Slot<H>>>;

/// 异步资源加载器
pub struct AsyncResourceLoader {
    backend: Arc<dyn GpuBackend>,
    buffers: SlotMap<RefCountedBuffer>,
    textures: SlotMap<RefCountedTexture>,
}

impl AsyncResourceLoader {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self { backend, buffers: Mutex::new(HashMap::new()), textures: Mutex::new(HashMap::new()) }
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// 去掉已关闭或上传失败的条目
    pub fn prune(&self) {
        self.buffers.lock().retain(|_, slot| slot.is_live());
        self.textures.lock().retain(|_, slot| slot.is_live());
    }

    /// 当前登记的来源数（缓冲, 纹理）
    pub fn source_count(&self) -> (usize, usize) {
        (self.buffers.lock().len(), self.textures.lock().len())
    }

    /// 请求上传缓冲
    pub fn load_buffer(&self, source: &BufferSource) -> Deferred<RefCountedBuffer> {
        let backend = Arc::clone(&self.backend);
        let source = source.clone();
        let key = source.key.clone();
        Self::request(&self.buffers, &key, move || {
            let desc = BufferDesc { label: source.label.clone(), usage: source.usage, size: source.data.len() };
            let id = backend.create_buffer(&desc, &source.data)?;
            Ok(GpuBuffer::new(id, desc, backend))
        })
    }

    /// 请求上传纹理
    pub fn load_texture(&self, source: &TextureSource) -> Deferred<RefCountedTexture> {
        let backend = Arc::clone(&self.backend);
        let source = source.clone();
        let key = source.key.clone();
        Self::request(&self.textures, &key, move || {
            let expected = source.width as usize * source.height as usize * 4;
            if source.data.len() < expected {
                return Err(ResourceError::InvalidData(format!(
                    "texture {} needs {} bytes, got {}",
                    source.key.as_str(),
                    expected,
                    source.data.len()
                )));
            }
            let desc = TextureDesc {
                label: source.label.clone(),
                width: source.width,
                height: source.height,
                format: source.format,
            };
            let id = backend.create_texture(&desc, &source.data)?;
            Ok(GpuTexture::new(id, desc, backend))
        })
    }

    fn request<X>(
        slots: &SlotMap<RefCounted<X>>,
        key: &SourceKey,
        upload: impl FnOnce() -> Result<X, ResourceError> + Send + 'static,
    ) -> Deferred<RefCounted<X>>
    where
        X: OnClosed + Send + Sync + 'static,
    {
        let mut slots = slots.lock();
        // 顺带清理，来源表不随历史请求无限增长
        slots.retain(|_, slot| slot.is_live());
        if let Some(slot) = slots.get(key) {
            let mut state = slot.state.lock();
            match &mut *state {
                SlotState::Pending { requests } => {
                    *requests += 1;
                    return slot.deferred.clone();
                }
                // 已关闭的资源重新上传
                SlotState::Ready(handle) if handle.try_increase_reference_count() => {
                    return slot.deferred.clone();
                }
                _ => {}
            }
        }

        let (promise, deferred) = Deferred::pending();
        let state = Arc::new(Mutex::new(SlotState::Pending { requests: 1 }));
        slots.insert(key.clone(), Slot { deferred: deferred.clone(), state: Arc::clone(&state) });
        drop(slots);

        let key = key.clone();
        rayon::spawn(move || {
            let result = upload().map(RefCounted::new);
            let mut state = state.lock();
            match result {
                Ok(handle) => {
                    if let SlotState::Pending { requests } = *state {
                        for _ in 0..requests {
                            handle.increase_reference_count();
                        }
                    }
                    *state = SlotState::Ready(handle.clone());
                    drop(state);
                    promise.resolve(Ok(handle));
                }
                Err(err) => {
                    *state = SlotState::Failed;
                    drop(state);
                    log::warn!("[Loader] 资源 {} 上传失败: {}", key.as_str(), err);
                    promise.resolve(Err(err));
                }
            }
        });

        deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::CountingBackend;

    fn buffer(key: &str) -> BufferSource {
        BufferSource { key: key.into(), label: None, usage: BufferUsage::VERTEX, data: Arc::from(vec![0u8; 16]) }
    }

    #[test]
    fn test_same_source_is_deduplicated() {
        let backend = Arc::new(CountingBackend::default());
        let loader = AsyncResourceLoader::new(backend.clone());

        let a = pollster::block_on(loader.load_buffer(&buffer("a"))).unwrap();
        let b = pollster::block_on(loader.load_buffer(&buffer("a"))).unwrap();

        assert!(a.ptr_eq(&b));
        assert_eq!(a.reference_count(), 2);
        assert_eq!(backend.created_buffers(), 1);

        a.decrease_reference_count();
        b.decrease_reference_count();
        assert_eq!(backend.destroyed_buffers(), 1);
    }

    #[test]
    fn test_closed_source_is_uploaded_again() {
        let backend = Arc::new(CountingBackend::default());
        let loader = AsyncResourceLoader::new(backend.clone());

        let first = pollster::block_on(loader.load_buffer(&buffer("a"))).unwrap();
        first.decrease_reference_count();
        assert!(first.is_closed());

        let second = pollster::block_on(loader.load_buffer(&buffer("a"))).unwrap();
        assert!(!second.ptr_eq(&first));
        assert_eq!(backend.created_buffers(), 2);
    }

    #[test]
    fn test_released_sources_are_pruned() {
        let backend = Arc::new(CountingBackend::default());
        let loader = AsyncResourceLoader::new(backend.clone());

        let kept = pollster::block_on(loader.load_buffer(&buffer("kept"))).unwrap();
        for key in ["a", "b", "c"] {
            let handle = pollster::block_on(loader.load_buffer(&buffer(key))).unwrap();
            handle.decrease_reference_count();
        }
        // 每次请求前清理，只剩仍在使用的 kept 与最后一个已关闭的 c
        assert_eq!(loader.source_count(), (2, 0));

        loader.prune();
        assert_eq!(loader.source_count(), (1, 0));

        let broken = TextureSource {
            key: "broken".into(),
            label: None,
            width: 4,
            height: 4,
            format: TextureFormat::Rgba8,
            data: Arc::from(vec![0u8; 4]),
        };
        assert!(pollster::block_on(loader.load_texture(&broken)).is_err());
        assert_eq!(loader.source_count(), (1, 1));
        loader.prune();
        assert_eq!(loader.source_count(), (1, 0));

        kept.decrease_reference_count();
        assert_eq!(backend.destroyed_buffers(), 4);
    }

    #[test]
    fn test_short_texture_data_fails() {
        let loader = AsyncResourceLoader::new(Arc::new(CountingBackend::default()));
        let source = TextureSource {
            key: "t".into(),
            label: None,
            width: 2,
            height: 2,
            format: TextureFormat::Rgba8,
            data: Arc::from(vec![255u8; 4]),
        };
        assert!(matches!(pollster::block_on(loader.load_texture(&source)), Err(ResourceError::InvalidData(_))));
    }
}
