//! 场景节点

use crate::transform::NodeTransform;
use crate::{EngineError, Result};

use super::{Component, ComponentType, HumanoidTag, NodeId, UpdatePhase, UpdatePhases};

/// 场景节点
///
/// 节点存放在 `RenderScene` 的扁平数组中，父子关系以索引表示。
#[derive(Clone, Debug)]
pub struct Node {
    index: usize,
    id: Option<NodeId>,
    name: Option<String>,
    humanoid_tags: Vec<HumanoidTag>,
    absolute_transform: NodeTransform,
    pub(super) parent: Option<usize>,
    children: Vec<usize>,
    components: Vec<Component>,
    phases: UpdatePhases,
}

impl Node {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn humanoid_tags(&self) -> &[HumanoidTag] {
        &self.humanoid_tags
    }

    /// 加载时给出的本地变换（实例变换表的绝对层初值）
    pub fn absolute_transform(&self) -> &NodeTransform {
        &self.absolute_transform
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn has_component(&self, component_type: ComponentType) -> bool {
        self.components.iter().any(|c| c.component_type() == component_type)
    }

    /// 节点（含自身传播）参与的阶段
    pub fn phases(&self) -> UpdatePhases {
        self.phases
    }

    pub fn has_phase(&self, phase: UpdatePhase) -> bool {
        self.phases.contains(phase.flag())
    }

    /// 参与指定阶段的组件
    pub fn components_for(&self, phase: UpdatePhase) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(move |c| c.update_phases().contains(&phase))
    }
}

/// 节点构建器
#[derive(Clone, Debug, Default)]
pub struct NodeBuilder {
    id: Option<NodeId>,
    name: Option<String>,
    humanoid_tags: Vec<HumanoidTag>,
    transform: NodeTransform,
    children: Vec<usize>,
    components: Vec<Component>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn humanoid_tag(mut self, tag: HumanoidTag) -> Self {
        self.humanoid_tags.push(tag);
        self
    }

    pub fn transform(mut self, transform: impl Into<NodeTransform>) -> Self {
        self.transform = transform.into();
        self
    }

    pub fn child(mut self, index: usize) -> Self {
        self.children.push(index);
        self
    }

    pub fn children(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.children.extend(indices);
        self
    }

    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    /// 构建节点，检查单例组件是否重复
    pub fn build(self, index: usize) -> Result<Node> {
        let mut seen: Vec<ComponentType> = Vec::with_capacity(self.components.len());
        let mut phases = UpdatePhases::GLOBAL_TRANSFORM_PROPAGATION;

        for component in &self.components {
            let component_type = component.component_type();
            if component_type.single_instance() && seen.contains(&component_type) {
                return Err(EngineError::DuplicateComponent { node: index, component: component_type });
            }
            seen.push(component_type);
            for phase in component.update_phases() {
                phases |= phase.flag();
            }
        }

        let has_mesh = seen.contains(&ComponentType::Primitive);
        if let Some(component) = seen.iter().copied().find(|t| t.requires_mesh() && !has_mesh) {
            return Err(EngineError::MissingMesh { node: index, component });
        }

        Ok(Node {
            index,
            id: self.id,
            name: self.name,
            humanoid_tags: self.humanoid_tags,
            absolute_transform: self.transform,
            parent: None,
            children: self.children,
            components: self.components,
            phases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{CameraComponent, Camera, JointComponent};

    fn camera(index: usize) -> Component {
        Component::Camera(CameraComponent {
            camera_index: index,
            camera: Camera::Perspective { aspect_ratio: None, yfov: 1.0, znear: 0.05, zfar: None },
        })
    }

    #[test]
    fn test_duplicate_single_instance_rejected() {
        let result = NodeBuilder::new().component(camera(0)).component(camera(1)).build(3);
        match result {
            Err(EngineError::DuplicateComponent { node, component }) => {
                assert_eq!(node, 3);
                assert_eq!(component, ComponentType::Camera);
            }
            other => panic!("unexpected result: {:?}", other.map(|n| n.index())),
        }
    }

    #[test]
    fn test_meshless_node_accepts_every_component() {
        let node = NodeBuilder::new()
            .component(Component::Joint(JointComponent::new(0, 0)))
            .component(camera(0))
            .build(1)
            .unwrap();
        assert!(!node.has_component(ComponentType::Primitive));
        assert!(node.has_component(ComponentType::Camera));
    }

    #[test]
    fn test_phases_collected() {
        let node = NodeBuilder::new()
            .name("arm")
            .component(Component::Joint(JointComponent::new(0, 0)))
            .build(0)
            .unwrap();

        assert!(node.has_phase(UpdatePhase::GlobalTransformPropagation));
        assert!(node.has_phase(UpdatePhase::RenderDataUpdate));
        assert!(node.has_phase(UpdatePhase::DebugRender));
        assert!(!node.has_phase(UpdatePhase::IkUpdate));
        assert_eq!(node.components_for(UpdatePhase::DebugRender).count(), 1);
        assert_eq!(node.name(), Some("arm"));
    }
}
