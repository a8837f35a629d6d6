//! 渲染场景
//!
//! 重建完成后不可变；由引用计数持有，被多个 `ModelInstance` 共享。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Mat4;

use crate::resource::{OnClosed, RenderPrimitive};
use crate::skeleton::IkTargetComponent;
use crate::skinning::Skin;
use crate::transform::NodeTransform;
use crate::{EngineError, Result};

use super::{
    CameraComponent, Component, Expression, HumanoidTag, ModelId, Node, NodeId, PrimitiveComponent,
};

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// 场景唯一标识（进程内单调递增）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneId(u64);

/// 节点句柄
///
/// 携带所属场景的 ID，场景被替换后旧句柄解析失败而不会指向错误节点。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub scene: SceneId,
    pub index: usize,
}

/// 组件在场景中的位置（节点索引, 组件索引）
type ComponentRef = (usize, usize);

/// 构建场景所需的全部部件
#[derive(Debug, Default)]
pub struct SceneParts {
    pub model_id: ModelId,
    pub root: usize,
    pub nodes: Vec<Node>,
    pub primitives: Vec<Arc<RenderPrimitive>>,
    pub skins: Vec<Skin>,
    pub expressions: Vec<Expression>,
    pub render_transform: Option<NodeTransform>,
}

/// 渲染场景
#[derive(Debug)]
pub struct RenderScene {
    id: SceneId,
    model_id: ModelId,
    root: usize,
    nodes: Vec<Node>,
    /// 先序遍历顺序
    sorted: Vec<usize>,
    primitives: Vec<Arc<RenderPrimitive>>,
    skins: Vec<Skin>,
    expressions: Vec<Expression>,
    render_transform: Option<NodeTransform>,

    primitive_components: Vec<ComponentRef>,
    morphed_primitives: Vec<ComponentRef>,
    cameras: Vec<ComponentRef>,
    /// 按 ik_index 排列；被丢弃的 IK 留空
    ik_targets: Vec<Option<ComponentRef>>,

    node_ids: HashMap<NodeId, usize>,
    node_names: HashMap<String, usize>,
    humanoid_tags: HashMap<HumanoidTag, usize>,
}

impl RenderScene {
    /// 组装场景：建立父子关系、遍历顺序和各类索引
    pub fn new(parts: SceneParts) -> Result<Self> {
        let SceneParts { model_id, root, mut nodes, primitives, skins, expressions, render_transform } = parts;
        let count = nodes.len();
        if root >= count {
            return Err(EngineError::InvalidNodeIndex(root));
        }

        // 父子关系：每个节点至多一个父节点，根节点没有父节点
        for index in 0..count {
            for child_pos in 0..nodes[index].children().len() {
                let child = nodes[index].children()[child_pos];
                if child >= count {
                    return Err(EngineError::InvalidNodeIndex(child));
                }
                if child == root || child == index {
                    return Err(EngineError::InvalidHierarchy(format!("node {} cannot be a child of node {}", child, index)));
                }
                if let Some(parent) = nodes[child].parent {
                    return Err(EngineError::InvalidHierarchy(format!(
                        "node {} has two parents ({} and {})",
                        child, parent, index
                    )));
                }
                nodes[child].parent = Some(index);
            }
        }

        let sorted = Self::traverse(&nodes, root);
        if sorted.len() != count {
            return Err(EngineError::InvalidHierarchy(format!(
                "{} of {} nodes are not reachable from root {}",
                count - sorted.len(),
                count,
                root
            )));
        }

        let mut primitive_components = Vec::new();
        let mut morphed_primitives: Vec<Option<ComponentRef>> = Vec::new();
        let mut cameras: Vec<Option<ComponentRef>> = Vec::new();
        let mut ik_targets: Vec<Option<ComponentRef>> = Vec::new();

        for &index in &sorted {
            for (component_index, component) in nodes[index].components().iter().enumerate() {
                let location = (index, component_index);
                match component {
                    Component::Primitive(primitive) => {
                        primitive_components.push(location);
                        if let Some(skin) = primitive.skin_index {
                            if skin >= skins.len() {
                                return Err(EngineError::InvalidHierarchy(format!("node {} references missing skin {}", index, skin)));
                            }
                        }
                        if let Some(morphed) = primitive.morphed_primitive_index {
                            Self::place(&mut morphed_primitives, morphed, location, "morphed primitive")?;
                        }
                    }
                    Component::Joint(joint) => {
                        for binding in joint.bindings() {
                            let valid = skins
                                .get(binding.skin_index)
                                .map_or(false, |skin| skin.joints.get(binding.joint_index) == Some(&index));
                            if !valid {
                                return Err(EngineError::InvalidHierarchy(format!(
                                    "node {} is not joint {} of skin {}",
                                    index, binding.joint_index, binding.skin_index
                                )));
                            }
                        }
                    }
                    Component::Camera(camera) => {
                        Self::place(&mut cameras, camera.camera_index, location, "camera")?;
                    }
                    Component::IkTarget(ik) => {
                        Self::place(&mut ik_targets, ik.ik_index, location, "ik target")?;
                    }
                    Component::InfluenceSource(influence) => {
                        if influence.target_node_index >= count {
                            return Err(EngineError::InvalidNodeIndex(influence.target_node_index));
                        }
                    }
                }
            }
        }

        let morphed_primitives = Self::dense(morphed_primitives, "morphed primitive")?;
        let cameras = Self::dense(cameras, "camera")?;

        let mut node_ids = HashMap::new();
        let mut node_names = HashMap::new();
        let mut humanoid_tags = HashMap::new();
        for node in &nodes {
            if let Some(id) = node.id() {
                node_ids.insert(id, node.index());
            }
            if let Some(name) = node.name() {
                node_names.entry(name.to_owned()).or_insert(node.index());
            }
            for tag in node.humanoid_tags() {
                humanoid_tags.entry(*tag).or_insert(node.index());
            }
        }

        let id = SceneId(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "[Scene] 场景 {:?} 构建完成: {} 节点, {} 图元, {} 蒙皮, {} IK",
            id,
            count,
            primitives.len(),
            skins.len(),
            ik_targets.iter().flatten().count()
        );

        Ok(Self {
            id,
            model_id,
            root,
            nodes,
            sorted,
            primitives,
            skins,
            expressions,
            render_transform,
            primitive_components,
            morphed_primitives,
            cameras,
            ik_targets,
            node_ids,
            node_names,
            humanoid_tags,
        })
    }

    fn traverse(nodes: &[Node], root: usize) -> Vec<usize> {
        let mut order = Vec::with_capacity(nodes.len());
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            order.push(index);
            // 逆序压栈，保持子节点原有顺序
            stack.extend(nodes[index].children().iter().rev().copied());
        }
        order
    }

    fn place(slots: &mut Vec<Option<ComponentRef>>, index: usize, location: ComponentRef, kind: &'static str) -> Result<()> {
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        if slots[index].is_some() {
            return Err(EngineError::DuplicateIndex { kind, index });
        }
        slots[index] = Some(location);
        Ok(())
    }

    fn dense(slots: Vec<Option<ComponentRef>>, kind: &'static str) -> Result<Vec<ComponentRef>> {
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| EngineError::InvalidHierarchy(format!("missing {} index {}", kind, index)))
            })
            .collect()
    }

    // ========== 访问 ==========

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// 先序遍历顺序（父节点总在子节点之前）
    pub fn sorted_nodes(&self) -> &[usize] {
        &self.sorted
    }

    pub fn primitives(&self) -> &[Arc<RenderPrimitive>] {
        &self.primitives
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    pub fn render_transform(&self) -> Option<&NodeTransform> {
        self.render_transform.as_ref()
    }

    /// 根节点的父矩阵
    pub fn root_matrix(&self) -> Mat4 {
        self.render_transform.map_or(Mat4::IDENTITY, |t| t.matrix())
    }

    pub fn primitive_components(&self) -> impl Iterator<Item = (usize, &PrimitiveComponent)> {
        self.primitive_components.iter().filter_map(move |&(node, component)| {
            match &self.nodes[node].components()[component] {
                Component::Primitive(primitive) => Some((node, primitive)),
                _ => None,
            }
        })
    }

    pub fn morphed_primitive_count(&self) -> usize {
        self.morphed_primitives.len()
    }

    pub fn morphed_primitive(&self, index: usize) -> Option<&PrimitiveComponent> {
        let &(node, component) = self.morphed_primitives.get(index)?;
        match &self.nodes[node].components()[component] {
            Component::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn camera(&self, index: usize) -> Option<(usize, &CameraComponent)> {
        let &(node, component) = self.cameras.get(index)?;
        match &self.nodes[node].components()[component] {
            Component::Camera(camera) => Some((node, camera)),
            _ => None,
        }
    }

    /// IK 槽位数量（包含被丢弃的空槽）
    pub fn ik_count(&self) -> usize {
        self.ik_targets.len()
    }

    pub fn ik_target(&self, ik_index: usize) -> Option<(usize, &IkTargetComponent)> {
        let &(node, component) = self.ik_targets.get(ik_index)?.as_ref()?;
        match &self.nodes[node].components()[component] {
            Component::IkTarget(ik) => Some((node, ik)),
            _ => None,
        }
    }

    // ========== 查找 ==========

    pub fn node_by_id(&self, id: NodeId) -> Option<usize> {
        self.node_ids.get(&id).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<usize> {
        self.node_names.get(name).copied()
    }

    pub fn node_by_humanoid_tag(&self, tag: HumanoidTag) -> Option<usize> {
        self.humanoid_tags.get(&tag).copied()
    }

    pub fn node_handle(&self, index: usize) -> Option<NodeHandle> {
        (index < self.nodes.len()).then_some(NodeHandle { scene: self.id, index })
    }

    /// 解析句柄；属于其他场景的句柄返回 None
    pub fn resolve(&self, handle: NodeHandle) -> Option<&Node> {
        if handle.scene != self.id {
            return None;
        }
        self.nodes.get(handle.index)
    }
}

impl OnClosed for RenderScene {
    fn on_closed(&self) {
        log::debug!("[Scene] 场景 {:?} 释放 {} 个图元", self.id, self.primitives.len());
        for primitive in &self.primitives {
            primitive.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeBuilder;

    fn chain(len: usize) -> Vec<Node> {
        (0..len)
            .map(|i| {
                let builder = NodeBuilder::new().name(format!("n{}", i)).id(NodeId::new(7, i as u32));
                let builder = if i + 1 < len { builder.child(i + 1) } else { builder };
                builder.build(i).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_traversal_and_lookup() {
        let scene = RenderScene::new(SceneParts { model_id: 7, nodes: chain(3), ..Default::default() }).unwrap();

        assert_eq!(scene.sorted_nodes(), &[0, 1, 2]);
        assert_eq!(scene.node(2).and_then(|n| n.parent()), Some(1));
        assert_eq!(scene.node_by_id(NodeId::new(7, 1)), Some(1));
        assert_eq!(scene.node_by_name("n2"), Some(2));
        assert_eq!(scene.node_by_id(NodeId::new(8, 1)), None);
    }

    #[test]
    fn test_two_parents_rejected() {
        let nodes = vec![
            NodeBuilder::new().children([1, 2]).build(0).unwrap(),
            NodeBuilder::new().child(2).build(1).unwrap(),
            NodeBuilder::new().build(2).unwrap(),
        ];
        let result = RenderScene::new(SceneParts { nodes, ..Default::default() });
        assert!(matches!(result, Err(EngineError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let nodes = vec![NodeBuilder::new().build(0).unwrap(), NodeBuilder::new().build(1).unwrap()];
        let result = RenderScene::new(SceneParts { nodes, ..Default::default() });
        assert!(matches!(result, Err(EngineError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let first = RenderScene::new(SceneParts { nodes: chain(2), ..Default::default() }).unwrap();
        let second = RenderScene::new(SceneParts { nodes: chain(2), ..Default::default() }).unwrap();

        let handle = first.node_handle(1).unwrap();
        assert!(first.resolve(handle).is_some());
        assert!(second.resolve(handle).is_none());
        assert!(first.node_handle(5).is_none());
    }
}
