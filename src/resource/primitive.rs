//! 渲染图元与材质
//!
//! 图元创建时为引用的每个缓冲 / 纹理增加一次计数，`release` 时成对减少。

use glam::{Vec3, Vec4};

use super::{RefCountedBuffer, RefCountedTexture};

// ============================================================================
// 纹理
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureWrap {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureSampler {
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
}

/// 材质引用的纹理
#[derive(Clone, Debug, Default)]
pub enum RenderTexture {
    /// 内置纯白纹理（缺省或加载失败时使用）
    #[default]
    White,
    Gpu { texture: RefCountedTexture, sampler: TextureSampler },
}

impl RenderTexture {
    pub fn is_white(&self) -> bool {
        matches!(self, RenderTexture::White)
    }

    fn increase(&self) {
        if let RenderTexture::Gpu { texture, .. } = self {
            texture.increase_reference_count();
        }
    }

    fn decrease(&self) {
        if let RenderTexture::Gpu { texture, .. } = self {
            texture.decrease_reference_count();
        }
    }

    fn check_in_use(&self) {
        if let RenderTexture::Gpu { texture, .. } = self {
            texture.check_in_use();
        }
    }
}

// ============================================================================
// 材质
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask(f32),
    Blend,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialKind {
    Pbr { metallic_factor: f32, roughness_factor: f32, emissive_factor: Vec3 },
    Unlit,
    /// 原版游戏风格材质
    Vanilla,
}

#[derive(Clone, Debug)]
pub struct RenderMaterial {
    pub name: Option<String>,
    pub kind: MaterialKind,
    pub base_color: Vec4,
    pub base_color_texture: RenderTexture,
    pub normal_texture: Option<RenderTexture>,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

impl Default for RenderMaterial {
    fn default() -> Self {
        Self {
            name: None,
            kind: MaterialKind::Unlit,
            base_color: Vec4::ONE,
            base_color_texture: RenderTexture::White,
            normal_texture: None,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
        }
    }
}

impl RenderMaterial {
    fn textures(&self) -> impl Iterator<Item = &RenderTexture> {
        std::iter::once(&self.base_color_texture).chain(self.normal_texture.iter())
    }
}

// ============================================================================
// 变形目标
// ============================================================================

/// 变形目标组：同时驱动位置 / 颜色 / UV 目标
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MorphTargetGroup {
    pub position: Option<usize>,
    pub color: Option<usize>,
    pub tex_coord: Option<usize>,
    pub default_weight: f32,
}

#[derive(Clone, Debug)]
pub struct MorphTargets {
    pub buffer: RefCountedBuffer,
    pub position_targets: usize,
    pub color_targets: usize,
    pub tex_coord_targets: usize,
    pub groups: Vec<MorphTargetGroup>,
}

// ============================================================================
// 图元
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    #[default]
    Triangles,
}

/// 渲染图元
#[derive(Debug)]
pub struct RenderPrimitive {
    pub topology: PrimitiveTopology,
    pub vertex_buffer: RefCountedBuffer,
    pub vertex_count: u32,
    pub index_buffer: Option<RefCountedBuffer>,
    pub index_count: u32,
    pub material: RenderMaterial,
    pub morph_targets: Option<MorphTargets>,
}

impl RenderPrimitive {
    /// 创建图元并持有所有引用的资源
    pub fn new(
        topology: PrimitiveTopology,
        vertex_buffer: RefCountedBuffer,
        vertex_count: u32,
        index_buffer: Option<RefCountedBuffer>,
        index_count: u32,
        material: RenderMaterial,
        morph_targets: Option<MorphTargets>,
    ) -> Self {
        let primitive = Self {
            topology,
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
            material,
            morph_targets,
        };
        primitive.for_each_buffer(|buffer| buffer.increase_reference_count());
        primitive.material.textures().for_each(RenderTexture::increase);
        primitive
    }

    fn for_each_buffer(&self, mut f: impl FnMut(&RefCountedBuffer)) {
        f(&self.vertex_buffer);
        if let Some(index) = &self.index_buffer {
            f(index);
        }
        if let Some(morph) = &self.morph_targets {
            f(&morph.buffer);
        }
    }

    /// 释放持有的资源引用（由场景关闭时调用一次）
    pub fn release(&self) {
        self.for_each_buffer(|buffer| buffer.decrease_reference_count());
        self.material.textures().for_each(RenderTexture::decrease);
    }

    pub fn check_in_use(&self) {
        self.for_each_buffer(|buffer| buffer.check_in_use());
        self.material.textures().for_each(RenderTexture::check_in_use);
    }

    pub fn target_group_count(&self) -> usize {
        self.morph_targets.as_ref().map_or(0, |m| m.groups.len())
    }
}
