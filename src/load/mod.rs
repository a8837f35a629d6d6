//! 模型加载
//!
//! - `info`: 格式加载器产出的中间描述
//! - `SceneReconstructor`: 等待资源并组装 `RenderScene`
//! - `ModelSlots`: 按槽位管理加载结果，处理过期请求

mod info;
mod reconstruct;
mod slots;

pub use info::{
    ComponentLoadInfo, IkChainLoadInfo, MaterialLoadInfo, ModelLoadInfo, MorphTargetsLoadInfo, NodeLoadInfo,
    PrimitiveLoadInfo, SkinLoadInfo, TextureLoadInfo,
};
pub use reconstruct::SceneReconstructor;
pub use slots::{LoadTicket, ModelSlots};
