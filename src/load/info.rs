//! 加载中间描述
//!
//! 由格式加载器（glTF / PMX / Bedrock 等）产出，GPU 资源以 `Deferred` 句柄给出。
//! 每次 `load_*` 调用返回的 `Deferred` 代表一份引用，重建结束后统一释放；
//! 同一个 `Deferred` 克隆到多个图元时仍只算一份。

use glam::{Mat4, Vec3, Vec4};

use crate::resource::{
    AlphaMode, Deferred, MaterialKind, MorphTargetGroup, PrimitiveTopology, RefCountedBuffer, RefCountedTexture,
    TextureSampler,
};
use crate::scene::{CameraComponent, Expression, HumanoidTag, ModelId, NodeId};
use crate::skeleton::IkLimit;
use crate::transform::{NodeTransform, TransformId};

/// 模型加载描述
#[derive(Debug, Default)]
pub struct ModelLoadInfo {
    pub model_id: ModelId,
    pub root_node: usize,
    pub nodes: Vec<NodeLoadInfo>,
    pub primitives: Vec<PrimitiveLoadInfo>,
    pub skins: Vec<SkinLoadInfo>,
    pub expressions: Vec<Expression>,
    pub render_transform: Option<NodeTransform>,
}

#[derive(Debug, Default)]
pub struct NodeLoadInfo {
    pub id: Option<NodeId>,
    pub name: Option<String>,
    pub humanoid_tags: Vec<HumanoidTag>,
    pub transform: NodeTransform,
    pub children: Vec<usize>,
    pub components: Vec<ComponentLoadInfo>,
}

/// 组件描述；跨节点引用以 `NodeId` 给出，重建时解析为下标
///
/// 关节组件不在此声明，由蒙皮的关节列表生成。
#[derive(Debug, Clone)]
pub enum ComponentLoadInfo {
    Primitive {
        primitive_index: usize,
        skin_index: Option<usize>,
        morphed_primitive_index: Option<usize>,
    },
    InfluenceSource {
        target: NodeId,
        influence_rotation: f32,
        influence_translation: f32,
        append_local: bool,
    },
    Camera(CameraComponent),
    IkTarget {
        ik_index: usize,
        effector: NodeId,
        /// 链根 → 末端
        chain: Vec<IkChainLoadInfo>,
        limit_radian: f32,
        loop_count: u32,
        transform_id: TransformId,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct IkChainLoadInfo {
    pub node: NodeId,
    pub limit: Option<IkLimit>,
}

#[derive(Debug)]
pub struct PrimitiveLoadInfo {
    pub topology: PrimitiveTopology,
    pub vertex_buffer: Deferred<RefCountedBuffer>,
    pub vertex_count: u32,
    pub index_buffer: Option<Deferred<RefCountedBuffer>>,
    pub index_count: u32,
    pub material: MaterialLoadInfo,
    pub morph_targets: Option<MorphTargetsLoadInfo>,
}

#[derive(Debug)]
pub struct MaterialLoadInfo {
    pub name: Option<String>,
    pub kind: MaterialKind,
    pub base_color: Vec4,
    pub base_color_texture: Option<TextureLoadInfo>,
    pub normal_texture: Option<TextureLoadInfo>,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

impl Default for MaterialLoadInfo {
    fn default() -> Self {
        Self {
            name: None,
            kind: MaterialKind::Pbr { metallic_factor: 1.0, roughness_factor: 1.0, emissive_factor: Vec3::ZERO },
            base_color: Vec4::ONE,
            base_color_texture: None,
            normal_texture: None,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
        }
    }
}

#[derive(Debug)]
pub struct TextureLoadInfo {
    pub texture: Deferred<RefCountedTexture>,
    pub sampler: TextureSampler,
}

#[derive(Debug)]
pub struct MorphTargetsLoadInfo {
    pub buffer: Deferred<RefCountedBuffer>,
    pub position_targets: usize,
    pub color_targets: usize,
    pub tex_coord_targets: usize,
    pub groups: Vec<MorphTargetGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct SkinLoadInfo {
    pub name: Option<String>,
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Option<Vec<Mat4>>,
}
