//! 模型槽位
//!
//! 每个逻辑槽位（例如一个玩家）同时只安装一个场景。
//! 新请求提升槽位代数，较早请求的结果返回时发现代数过期，直接释放而不安装。

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::scene::SceneHandle;
use crate::{EngineError, Result};

struct SlotEntry {
    generation: u64,
    scene: Option<SceneHandle>,
}

/// 加载凭据：记录发起请求时的槽位代数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket<K> {
    key: K,
    generation: u64,
}

impl<K> LoadTicket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct ModelSlots<K> {
    slots: Mutex<HashMap<K, SlotEntry>>,
}

impl<K: Eq + Hash + Clone> Default for ModelSlots<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> ModelSlots<K> {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// 登记新请求，之前未完成的请求随之作废
    pub fn begin_load(&self, key: K) -> LoadTicket<K> {
        let mut slots = self.slots.lock();
        let entry = slots.entry(key.clone()).or_insert(SlotEntry { generation: 0, scene: None });
        entry.generation += 1;
        LoadTicket { key, generation: entry.generation }
    }

    /// 提交加载结果
    ///
    /// 凭据过期时释放结果并返回 `LoadCancelled`；否则安装新场景并释放旧场景。
    /// 槽位持有安装场景的引用，返回的句柄不额外计数。
    pub fn complete(&self, ticket: LoadTicket<K>, result: Result<SceneHandle>) -> Result<SceneHandle> {
        let mut slots = self.slots.lock();
        let current = slots.get(&ticket.key).map(|entry| entry.generation);
        if current != Some(ticket.generation) {
            drop(slots);
            if let Ok(scene) = result {
                log::info!("[Slots] 加载结果已过期 (代数 {})，释放", ticket.generation);
                scene.decrease_reference_count();
            }
            return Err(EngineError::LoadCancelled);
        }

        let scene = result?;
        let previous = slots.get_mut(&ticket.key).and_then(|entry| entry.scene.replace(scene.clone()));
        drop(slots);
        if let Some(previous) = previous {
            previous.decrease_reference_count();
        }
        Ok(scene)
    }

    /// 发起并等待一次加载
    pub async fn load<F>(&self, key: K, future: F) -> Result<SceneHandle>
    where
        F: Future<Output = Result<SceneHandle>>,
    {
        let ticket = self.begin_load(key);
        let result = future.await;
        self.complete(ticket, result)
    }

    pub fn get(&self, key: &K) -> Option<SceneHandle> {
        self.slots.lock().get(key).and_then(|entry| entry.scene.clone())
    }

    /// 移除槽位并释放已安装的场景；进行中的请求随之作废
    pub fn remove(&self, key: &K) {
        let entry = self.slots.lock().remove(key);
        if let Some(scene) = entry.and_then(|entry| entry.scene) {
            scene.decrease_reference_count();
        }
    }

    /// 释放全部槽位
    pub fn clear(&self) {
        let entries: Vec<SlotEntry> = self.slots.lock().drain().map(|(_, entry)| entry).collect();
        for scene in entries.into_iter().filter_map(|entry| entry.scene) {
            scene.decrease_reference_count();
        }
    }
}
