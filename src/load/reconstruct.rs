//! 场景重建
//!
//! 等待加载描述中的全部 GPU 资源，解析跨节点引用，组装不可变的 `RenderScene`。
//! - 纹理失败：退回内置白色纹理
//! - 缓冲失败：丢弃该图元及引用它的网格组件
//! - IK / 附加变换引用无法解析：丢弃该组件
//! 以上都只记录警告；结构性错误（重复组件、层级错误等）让整个模型加载失败。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;

use super::info::{ComponentLoadInfo, MaterialLoadInfo, ModelLoadInfo, PrimitiveLoadInfo, TextureLoadInfo};
use crate::config::get_config;
use crate::resource::{
    Deferred, MorphTargets, RefCountedBuffer, RefCountedTexture, RenderMaterial, RenderPrimitive, RenderTexture,
};
use crate::scene::{
    Component, Expression, InfluenceSourceComponent, JointComponent, NodeBuilder, NodeId, PrimitiveComponent,
    RenderScene, SceneHandle, SceneParts, SkinJoint,
};
use crate::skeleton::{IkChainLink, IkTargetComponent};
use crate::skinning::Skin;
use crate::{EngineError, Result, VALIDATION};

type RequestList<T> = Vec<(Deferred<T>, T)>;

/// 加载请求持有的引用，离开作用域时释放（成功或失败都会执行）
///
/// 一个 `Deferred` 只对应一次请求，被多个图元克隆引用时也只释放一次。
#[derive(Default)]
struct RequestRefs {
    buffers: RequestList<RefCountedBuffer>,
    textures: RequestList<RefCountedTexture>,
}

impl RequestRefs {
    fn add<T: Clone + Send + Sync + 'static>(list: &mut RequestList<T>, deferred: &Deferred<T>, handle: Option<&T>) {
        let Some(handle) = handle else { return };
        if !list.iter().any(|(seen, _)| seen.ptr_eq(deferred)) {
            list.push((deferred.clone(), handle.clone()));
        }
    }

    fn collect(&mut self, load: &PrimitiveLoadInfo, resolved: &ResolvedPrimitive) {
        Self::add(&mut self.buffers, &load.vertex_buffer, resolved.vertex_buffer.as_ref());
        if let Some(deferred) = &load.index_buffer {
            Self::add(&mut self.buffers, deferred, resolved.index_buffer.as_ref().and_then(Option::as_ref));
        }
        if let Some(morph) = &load.morph_targets {
            Self::add(&mut self.buffers, &morph.buffer, resolved.morph_buffer.as_ref().and_then(Option::as_ref));
        }
        if let Some(texture) = &load.material.base_color_texture {
            Self::add(&mut self.textures, &texture.texture, resolved.base_color_texture.as_ref());
        }
        if let Some(texture) = &load.material.normal_texture {
            Self::add(&mut self.textures, &texture.texture, resolved.normal_texture.as_ref().and_then(Option::as_ref));
        }
    }

    fn check_in_use(&self) {
        self.buffers.iter().for_each(|(_, b)| b.check_in_use());
        self.textures.iter().for_each(|(_, t)| t.check_in_use());
    }
}

impl Drop for RequestRefs {
    fn drop(&mut self) {
        for (_, buffer) in self.buffers.drain(..) {
            buffer.decrease_reference_count();
        }
        for (_, texture) in self.textures.drain(..) {
            texture.decrease_reference_count();
        }
    }
}

/// 单个图元等待完成后的资源
struct ResolvedPrimitive {
    vertex_buffer: Option<RefCountedBuffer>,
    index_buffer: Option<Option<RefCountedBuffer>>,
    morph_buffer: Option<Option<RefCountedBuffer>>,
    base_color_texture: Option<RefCountedTexture>,
    normal_texture: Option<Option<RefCountedTexture>>,
}

pub struct SceneReconstructor;

impl SceneReconstructor {
    /// 重建场景；返回的句柄已为调用方持有一份引用
    pub async fn reconstruct(info: ModelLoadInfo) -> Result<SceneHandle> {
        let resolved = join_all(info.primitives.iter().map(Self::await_primitive)).await;

        let mut requests = RequestRefs::default();
        for (load, primitive) in info.primitives.iter().zip(&resolved) {
            requests.collect(load, primitive);
        }

        // 图元持有自己的引用；构建失败时成对释放
        let (primitives, primitive_map) = Self::build_primitives(&info, resolved);
        let result = Self::build_scene(&info, &primitives, &primitive_map);
        let scene = match result {
            Ok(scene) => scene,
            Err(err) => {
                primitives.iter().for_each(|p| p.release());
                log::warn!("[Reconstruct] 模型 {} 重建失败: {}", info.model_id, err);
                return Err(err);
            }
        };

        if get_config().debug_log {
            log::info!(
                "[Reconstruct] 模型 {} 重建完成: {} 节点, {} 图元, {} 蒙皮",
                info.model_id,
                scene.nodes().len(),
                scene.primitives().len(),
                scene.skins().len()
            );
        }

        let handle = SceneHandle::new(scene);
        handle.increase_reference_count();

        if VALIDATION {
            requests.check_in_use();
        }
        drop(requests);

        Ok(handle)
    }

    async fn await_primitive(info: &PrimitiveLoadInfo) -> ResolvedPrimitive {
        let buffer = |label: &'static str, result: std::result::Result<RefCountedBuffer, _>| match result {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                log::warn!("[Reconstruct] {} 缓冲加载失败，丢弃图元: {}", label, err);
                None
            }
        };

        let vertex_buffer = buffer("vertex", info.vertex_buffer.clone().await);
        let index_buffer = match &info.index_buffer {
            Some(deferred) => buffer("index", deferred.clone().await).map(Some),
            None => Some(None),
        };
        let morph_buffer = match &info.morph_targets {
            Some(morph) => buffer("morph target", morph.buffer.clone().await).map(Some),
            None => Some(None),
        };

        let base_color_texture = match &info.material.base_color_texture {
            Some(texture) => Self::await_texture(texture).await,
            None => None,
        };
        // 法线贴图失败时直接去掉
        let normal_texture = match &info.material.normal_texture {
            Some(texture) => Some(Self::await_texture(texture).await),
            None => None,
        };

        ResolvedPrimitive { vertex_buffer, index_buffer, morph_buffer, base_color_texture, normal_texture }
    }

    async fn await_texture(info: &TextureLoadInfo) -> Option<RefCountedTexture> {
        match info.texture.clone().await {
            Ok(texture) => Some(texture),
            Err(err) => {
                log::warn!("[Reconstruct] 纹理加载失败，使用白色纹理: {}", err);
                None
            }
        }
    }

    /// 返回 (图元列表, 加载描述下标 → 场景下标)
    fn build_primitives(
        info: &ModelLoadInfo,
        resolved: Vec<ResolvedPrimitive>,
    ) -> (Vec<Arc<RenderPrimitive>>, Vec<Option<usize>>) {
        let mut primitives = Vec::new();
        let mut map = Vec::with_capacity(resolved.len());

        for (load, resolved) in info.primitives.iter().zip(resolved) {
            let (Some(vertex_buffer), Some(index_buffer), Some(morph_buffer)) =
                (resolved.vertex_buffer, resolved.index_buffer, resolved.morph_buffer)
            else {
                map.push(None);
                continue;
            };

            let material = Self::build_material(&load.material, resolved.base_color_texture, resolved.normal_texture);
            let morph_targets = load.morph_targets.as_ref().zip(morph_buffer).map(|(morph, buffer)| MorphTargets {
                buffer,
                position_targets: morph.position_targets,
                color_targets: morph.color_targets,
                tex_coord_targets: morph.tex_coord_targets,
                groups: morph.groups.clone(),
            });

            map.push(Some(primitives.len()));
            primitives.push(Arc::new(RenderPrimitive::new(
                load.topology,
                vertex_buffer,
                load.vertex_count,
                index_buffer,
                load.index_count,
                material,
                morph_targets,
            )));
        }

        (primitives, map)
    }

    fn build_material(
        info: &MaterialLoadInfo,
        base_color: Option<RefCountedTexture>,
        normal: Option<Option<RefCountedTexture>>,
    ) -> RenderMaterial {
        let texture = |load: &Option<TextureLoadInfo>, texture: Option<RefCountedTexture>| match (load, texture) {
            (Some(load), Some(texture)) => RenderTexture::Gpu { texture, sampler: load.sampler },
            _ => RenderTexture::White,
        };

        RenderMaterial {
            name: info.name.clone(),
            kind: info.kind,
            base_color: info.base_color,
            base_color_texture: texture(&info.base_color_texture, base_color),
            normal_texture: normal.flatten().map(|n| texture(&info.normal_texture, Some(n))),
            alpha_mode: info.alpha_mode,
            double_sided: info.double_sided,
        }
    }

    fn build_scene(
        info: &ModelLoadInfo,
        primitives: &[Arc<RenderPrimitive>],
        primitive_map: &[Option<usize>],
    ) -> Result<RenderScene> {
        let mut id_map: HashMap<NodeId, usize> = HashMap::new();
        for (index, node) in info.nodes.iter().enumerate() {
            if let Some(id) = node.id {
                if id_map.insert(id, index).is_some() {
                    return Err(EngineError::InvalidHierarchy(format!("node id {:?} declared twice", id)));
                }
            }
        }
        let resolve = |id: NodeId| id_map.get(&id).copied();

        // 蒙皮与由其生成的关节组件
        let mut skins = Vec::with_capacity(info.skins.len());
        let mut joints: HashMap<usize, JointComponent> = HashMap::new();
        for (skin_index, skin) in info.skins.iter().enumerate() {
            let nodes = skin
                .joints
                .iter()
                .map(|id| {
                    resolve(*id).ok_or_else(|| {
                        EngineError::InvalidHierarchy(format!("skin {} references missing joint {:?}", skin_index, id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            for (joint_index, node) in nodes.iter().enumerate() {
                // 多个蒙皮共用的关节合并为一个组件
                match joints.get_mut(node) {
                    Some(joint) => joint.shared.push(SkinJoint { skin_index, joint_index }),
                    None => {
                        joints.insert(*node, JointComponent::new(skin_index, joint_index));
                    }
                }
            }
            skins.push(Skin {
                name: skin.name.clone(),
                joints: nodes,
                inverse_bind_matrices: skin.inverse_bind_matrices.clone(),
            });
        }

        // 变形图元编号在丢弃图元后重新压紧
        let surviving_morphs: BTreeSet<usize> = info
            .nodes
            .iter()
            .flat_map(|node| &node.components)
            .filter_map(|component| match component {
                ComponentLoadInfo::Primitive { primitive_index, morphed_primitive_index: Some(morph), .. } => {
                    let primitive = primitive_map.get(*primitive_index).copied().flatten()?;
                    primitives[primitive].morph_targets.as_ref().map(|_| *morph)
                }
                _ => None,
            })
            .collect();
        let morph_map: HashMap<usize, usize> =
            surviving_morphs.iter().enumerate().map(|(new, old)| (*old, new)).collect();

        let mut nodes = Vec::with_capacity(info.nodes.len());
        for (index, node_info) in info.nodes.iter().enumerate() {
            let mut components = Vec::with_capacity(node_info.components.len());
            for component in &node_info.components {
                if let Some(component) =
                    Self::resolve_component(index, component, &resolve, primitives, primitive_map, &morph_map, skins.len())
                {
                    components.push(component);
                }
            }
            if let Some(joint) = joints.remove(&index) {
                components.push(Component::Joint(joint));
            }

            let mut builder = NodeBuilder::new()
                .transform(node_info.transform)
                .children(node_info.children.iter().copied())
                .components(components);
            if let Some(id) = node_info.id {
                builder = builder.id(id);
            }
            if let Some(name) = &node_info.name {
                builder = builder.name(name.clone());
            }
            for tag in &node_info.humanoid_tags {
                builder = builder.humanoid_tag(*tag);
            }
            nodes.push(builder.build(index)?);
        }

        let expressions = info.expressions.iter().map(|e| Self::remap_expression(e, &morph_map)).collect();

        RenderScene::new(SceneParts {
            model_id: info.model_id,
            root: info.root_node,
            nodes,
            primitives: primitives.to_vec(),
            skins,
            expressions,
            render_transform: info.render_transform,
        })
    }

    fn resolve_component(
        node: usize,
        component: &ComponentLoadInfo,
        resolve: &impl Fn(NodeId) -> Option<usize>,
        primitives: &[Arc<RenderPrimitive>],
        primitive_map: &[Option<usize>],
        morph_map: &HashMap<usize, usize>,
        skin_count: usize,
    ) -> Option<Component> {
        match component {
            ComponentLoadInfo::Primitive { primitive_index, skin_index, morphed_primitive_index } => {
                let Some(index) = primitive_map.get(*primitive_index).copied().flatten() else {
                    log::warn!("[Reconstruct] 节点 {} 的图元 {} 不可用，丢弃网格组件", node, primitive_index);
                    return None;
                };
                let skin_index = skin_index.filter(|skin| {
                    let valid = *skin < skin_count;
                    if !valid {
                        log::warn!("[Reconstruct] 节点 {} 引用不存在的蒙皮 {}", node, skin);
                    }
                    valid
                });
                Some(Component::Primitive(PrimitiveComponent {
                    primitive_index: index,
                    primitive: Arc::clone(&primitives[index]),
                    skin_index,
                    morphed_primitive_index: morphed_primitive_index.and_then(|m| morph_map.get(&m).copied()),
                }))
            }
            ComponentLoadInfo::InfluenceSource { target, influence_rotation, influence_translation, append_local } => {
                let Some(target_node_index) = resolve(*target) else {
                    log::warn!("[Reconstruct] 节点 {} 的附加变换目标 {:?} 不存在，丢弃组件", node, target);
                    return None;
                };
                Some(Component::InfluenceSource(InfluenceSourceComponent {
                    target_node_index,
                    influence_rotation: *influence_rotation,
                    influence_translation: *influence_translation,
                    append_local: *append_local,
                }))
            }
            ComponentLoadInfo::Camera(camera) => Some(Component::Camera(*camera)),
            ComponentLoadInfo::IkTarget { ik_index, effector, chain, limit_radian, loop_count, transform_id } => {
                let Some(effector_node_index) = resolve(*effector) else {
                    log::warn!("[Reconstruct] IK {} 的末端节点 {:?} 不存在，丢弃组件", ik_index, effector);
                    return None;
                };
                let mut links = Vec::with_capacity(chain.len());
                for link in chain {
                    let Some(node_index) = resolve(link.node) else {
                        log::warn!("[Reconstruct] IK {} 的链节点 {:?} 不存在，丢弃组件", ik_index, link.node);
                        return None;
                    };
                    links.push(IkChainLink { node_index, limit: link.limit });
                }
                Some(Component::IkTarget(IkTargetComponent {
                    ik_index: *ik_index,
                    effector_node_index,
                    chain: links,
                    limit_radian: *limit_radian,
                    loop_count: *loop_count,
                    transform_id: *transform_id,
                }))
            }
        }
    }

    fn remap_expression(expression: &Expression, morph_map: &HashMap<usize, usize>) -> Expression {
        let mut expression = expression.clone();
        let name = expression.name.clone().unwrap_or_default();
        expression.bindings.retain_mut(|binding| match morph_map.get(&binding.morphed_primitive_index) {
            Some(index) => {
                binding.morphed_primitive_index = *index;
                true
            }
            None => {
                log::warn!(
                    "[Reconstruct] 表情 '{}' 引用的变形图元 {} 不可用",
                    name,
                    binding.morphed_primitive_index
                );
                false
            }
        });
        expression
    }
}
