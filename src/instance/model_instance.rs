//! 模型实例
//!
//! 每帧顺序：
//! 1. 动画写入变换层
//! 2. GlobalTransformPropagation：按先序遍历自上而下重算脏节点的世界矩阵
//! 3. IkUpdate：CCD 求解，逐关节刷新子树
//! 4. InfluenceTransformUpdate：附加变换写入目标节点的 Influence 层（下一帧传播）
//! 5. RenderDataUpdate：写入并发布蒙皮调色板
//! 6. CameraUpdate / DebugRender：按需调用

use std::sync::Arc;

use glam::{Mat4, Quat};

use super::render_task::{DrawItem, RenderTask};
use super::{CameraTransform, DebugLine};
use crate::animation::{AnimationContext, AnimationItem};
use crate::config::get_config;
use crate::scene::{
    Component, ComponentType, InfluenceSourceComponent, NodeHandle, RenderScene, SceneHandle, UpdatePhase,
};
use crate::skeleton::{IkPose, IkSolver, IkTargetComponent};
use crate::skinning::SkinPalette;
use crate::transform::{Bedrock, Decomposed, NodeTransform, TransformId, TransformMap};
use crate::{EngineError, Result};

pub struct ModelInstance {
    scene: SceneHandle,
    transforms: Vec<TransformMap>,
    /// 本地变换在上次传播之后被修改过
    dirty: Vec<bool>,
    world_transforms: Vec<Mat4>,
    /// 世界矩阵在上次写调色板之后发生过变化
    pose_changed: bool,
    palettes: Vec<SkinPalette>,
    /// 按变形图元下标、目标组下标排列
    morph_weights: Vec<Vec<f32>>,
    camera_transforms: Vec<Option<CameraTransform>>,
    ik_enabled: Vec<bool>,
    ik_solver: IkSolver,
    debug_lines: Vec<DebugLine>,
}

impl ModelInstance {
    /// 创建实例并持有场景的一份引用
    pub fn new(scene: SceneHandle) -> Self {
        scene.increase_reference_count();

        let (transforms, palettes, morph_weights, camera_count, ik_count) = {
            let scene = scene.get();
            let transforms: Vec<TransformMap> =
                scene.nodes().iter().map(|node| TransformMap::new(*node.absolute_transform())).collect();
            let palettes = scene.skins().iter().map(|skin| SkinPalette::new(skin.joint_count())).collect();
            let morph_weights = (0..scene.morphed_primitive_count())
                .map(|index| {
                    scene
                        .morphed_primitive(index)
                        .and_then(|p| p.primitive.morph_targets.as_ref())
                        .map(|morph| morph.groups.iter().map(|group| group.default_weight).collect())
                        .unwrap_or_default()
                })
                .collect();
            (transforms, palettes, morph_weights, scene.camera_count(), scene.ik_count())
        };

        let node_count = transforms.len();
        let mut instance = Self {
            scene,
            transforms,
            dirty: vec![true; node_count],
            world_transforms: vec![Mat4::IDENTITY; node_count],
            pose_changed: true,
            palettes,
            morph_weights,
            camera_transforms: vec![None; camera_count],
            ik_enabled: vec![true; ik_count],
            ik_solver: IkSolver::from_config(),
            debug_lines: Vec::new(),
        };
        instance.propagate_transforms();
        instance
    }

    pub fn scene(&self) -> &RenderScene {
        self.scene.get()
    }

    pub fn scene_handle(&self) -> &SceneHandle {
        &self.scene
    }

    // ========== 每帧更新 ==========

    /// 推进一帧：播放动画后更新渲染数据与相机
    pub fn update(&mut self, context: &dyn AnimationContext, animations: &mut [AnimationItem]) {
        for item in animations.iter_mut() {
            item.update(context);
            item.apply(context, self);
        }
        self.update_render_data();
        self.update_camera();
    }

    pub fn update_render_data(&mut self) {
        self.propagate_transforms();
        self.run_phase(UpdatePhase::IkUpdate);
        self.run_phase(UpdatePhase::InfluenceTransformUpdate);
        self.run_phase(UpdatePhase::RenderDataUpdate);
    }

    pub fn update_camera(&mut self) {
        self.run_phase(UpdatePhase::CameraUpdate);
    }

    /// 生成关节调试线段
    pub fn debug_render(&mut self) -> &[DebugLine] {
        self.run_phase(UpdatePhase::DebugRender);
        &self.debug_lines
    }

    fn propagate_transforms(&mut self) {
        let handle = self.scene.clone();
        let scene = handle.get();
        let root_matrix = scene.root_matrix();
        let mut changed = vec![false; self.transforms.len()];

        for &index in scene.sorted_nodes() {
            let parent = scene.nodes()[index].parent();
            let parent_changed = parent.map_or(false, |p| changed[p]);
            if !self.dirty[index] && !parent_changed {
                continue;
            }
            let parent_matrix = parent.map_or(root_matrix, |p| self.world_transforms[p]);
            self.world_transforms[index] = parent_matrix * self.transforms[index].matrix();
            self.dirty[index] = false;
            changed[index] = true;
            self.pose_changed = true;
        }
    }

    /// 立即重算节点及其子树的世界矩阵
    fn refresh_subtree(&mut self, scene: &RenderScene, node: usize) {
        let root_matrix = scene.root_matrix();
        let mut stack = vec![node];
        while let Some(index) = stack.pop() {
            let parent_matrix = scene.nodes()[index].parent().map_or(root_matrix, |p| self.world_transforms[p]);
            self.world_transforms[index] = parent_matrix * self.transforms[index].matrix();
            self.dirty[index] = false;
            stack.extend(scene.nodes()[index].children().iter().copied());
        }
        self.pose_changed = true;
    }

    fn run_phase(&mut self, phase: UpdatePhase) {
        let handle = self.scene.clone();
        let scene = handle.get();

        match phase {
            UpdatePhase::InfluenceTransformUpdate => self.clear_influence_targets(scene),
            UpdatePhase::RenderDataUpdate => {
                if !self.pose_changed {
                    return;
                }
                self.palettes.iter_mut().for_each(SkinPalette::begin_write);
            }
            UpdatePhase::DebugRender => self.debug_lines.clear(),
            _ => {}
        }

        for &index in scene.sorted_nodes() {
            let node = &scene.nodes()[index];
            if !node.has_phase(phase) {
                continue;
            }
            for component in node.components_for(phase) {
                self.update_component(phase, scene, index, component);
            }
        }

        if phase == UpdatePhase::RenderDataUpdate {
            self.palettes.iter_mut().for_each(SkinPalette::publish);
            self.pose_changed = false;
        }
    }

    fn update_component(&mut self, phase: UpdatePhase, scene: &RenderScene, node: usize, component: &Component) {
        match (phase, component) {
            (UpdatePhase::RenderDataUpdate, Component::Joint(joint)) => {
                let world = self.world_transforms[node];
                for binding in joint.bindings() {
                    let matrix = scene.skins()[binding.skin_index].joint_matrix(binding.joint_index, world);
                    self.palettes[binding.skin_index].set(binding.joint_index, matrix);
                }
            }
            // 网格数据在创建渲染任务时读取
            (UpdatePhase::RenderDataUpdate, Component::Primitive(_)) => {}
            (UpdatePhase::IkUpdate, Component::IkTarget(ik)) => self.solve_ik(scene, node, ik),
            (UpdatePhase::InfluenceTransformUpdate, Component::InfluenceSource(source)) => {
                self.apply_influence(node, source)
            }
            (UpdatePhase::CameraUpdate, Component::Camera(camera)) => {
                if let Some(slot) = self.camera_transforms.get_mut(camera.camera_index) {
                    *slot = Some(CameraTransform::from_world(camera.camera, self.world_transforms[node]));
                }
            }
            (UpdatePhase::DebugRender, Component::Joint(_)) => {
                let scene_node = &scene.nodes()[node];
                if !get_config().debug_render_joints || scene_node.has_component(ComponentType::InfluenceSource) {
                    return;
                }
                if let Some(parent) = scene_node.parent() {
                    self.debug_lines.push(DebugLine {
                        start: self.world_transforms[parent].col(3).truncate(),
                        end: self.world_transforms[node].col(3).truncate(),
                    });
                }
            }
            _ => {}
        }
    }

    fn solve_ik(&mut self, scene: &RenderScene, target_node: usize, ik: &IkTargetComponent) {
        if !self.ik_enabled.get(ik.ik_index).copied().unwrap_or(false) {
            return;
        }
        let solver = self.ik_solver;
        let mut pose = InstancePose { instance: self, scene, transform_id: ik.transform_id };
        let stats = solver.solve(ik, target_node, &mut pose);
        log::trace!("[IK] IK {} 求解: {:?}", ik.ik_index, stats);
    }

    /// 附加变换层每帧重建
    fn clear_influence_targets(&mut self, scene: &RenderScene) {
        for node in scene.nodes() {
            for component in node.components_for(UpdatePhase::InfluenceTransformUpdate) {
                if let Component::InfluenceSource(source) = component {
                    self.transforms[source.target_node_index].clear(TransformId::Influence);
                    self.dirty[source.target_node_index] = true;
                }
            }
        }
    }

    fn apply_influence(&mut self, source_node: usize, source: &InfluenceSourceComponent) {
        let (_, rotation, translation) = self.world_transforms[source_node].to_scale_rotation_translation();
        let rotation = Quat::IDENTITY.slerp(rotation, source.influence_rotation);
        let influence = Mat4::from_rotation_translation(rotation, translation * source.influence_translation);

        let target = &mut self.transforms[source.target_node_index];
        let matrix = if source.append_local {
            target.get(TransformId::Influence).map_or(Mat4::IDENTITY, NodeTransform::matrix) * influence
        } else {
            influence
        };
        target.set_matrix(TransformId::Influence, matrix);
        self.dirty[source.target_node_index] = true;
    }

    // ========== 变换 ==========

    pub fn transform_map(&self, node: usize) -> Option<&TransformMap> {
        self.transforms.get(node)
    }

    fn map_mut(&mut self, node: usize) -> Result<&mut TransformMap> {
        let map = self.transforms.get_mut(node).ok_or(EngineError::InvalidNodeIndex(node))?;
        self.dirty[node] = true;
        Ok(map)
    }

    pub fn set_transform(&mut self, node: usize, id: TransformId, transform: NodeTransform) -> Result<()> {
        self.map_mut(node)?.set(id, transform);
        Ok(())
    }

    pub fn update_decomposed(
        &mut self,
        node: usize,
        id: TransformId,
        updater: impl FnOnce(&mut Decomposed),
    ) -> Result<()> {
        self.map_mut(node)?.update_decomposed(id, updater)
    }

    pub fn update_bedrock(&mut self, node: usize, id: TransformId, updater: impl FnOnce(&mut Bedrock)) -> Result<()> {
        self.map_mut(node)?.update_bedrock(id, updater)
    }

    /// 清除所有节点的非绝对层
    pub fn clear_transform(&mut self) {
        for (map, dirty) in self.transforms.iter_mut().zip(self.dirty.iter_mut()) {
            map.clear_from(TransformId::RelativeAnimation);
            *dirty = true;
        }
    }

    pub fn node_world_transform(&self, node: usize) -> Option<Mat4> {
        self.world_transforms.get(node).copied()
    }

    /// 属于其他场景的句柄返回 None
    pub fn world_transform(&self, handle: NodeHandle) -> Option<Mat4> {
        let node = self.scene().resolve(handle)?;
        self.world_transforms.get(node.index()).copied()
    }

    // ========== IK ==========

    pub fn is_ik_enabled(&self, index: usize) -> Option<bool> {
        self.ik_enabled.get(index).copied()
    }

    /// 禁用时清除该 IK 在链节点上写入的层，关节回到动画姿态
    pub fn set_ik_enabled(&mut self, index: usize, enabled: bool) -> bool {
        let Some(slot) = self.ik_enabled.get_mut(index) else {
            log::warn!("[IK] IK 下标 {} 越界", index);
            return false;
        };
        if *slot == enabled {
            return true;
        }
        *slot = enabled;

        if !enabled {
            let handle = self.scene.clone();
            if let Some((_, ik)) = handle.get().ik_target(index) {
                for link in &ik.chain {
                    self.transforms[link.node_index].clear(ik.transform_id);
                    self.dirty[link.node_index] = true;
                }
            }
        }
        true
    }

    // ========== 变形 / 表情 ==========

    pub fn group_weight(&self, morphed_primitive_index: usize, target_group_index: usize) -> Option<f32> {
        self.morph_weights.get(morphed_primitive_index)?.get(target_group_index).copied()
    }

    pub fn set_group_weight(&mut self, morphed_primitive_index: usize, target_group_index: usize, weight: f32) -> bool {
        match self
            .morph_weights
            .get_mut(morphed_primitive_index)
            .and_then(|weights| weights.get_mut(target_group_index))
        {
            Some(slot) => {
                *slot = weight;
                true
            }
            None => false,
        }
    }

    /// 表情权重按绑定扇出到各目标组
    pub fn set_expression_weight(&mut self, index: usize, weight: f32) -> bool {
        let handle = self.scene.clone();
        let Some(expression) = handle.get().expressions().get(index) else {
            return false;
        };
        let weight = expression.effective_weight(weight);
        for binding in &expression.bindings {
            self.set_group_weight(binding.morphed_primitive_index, binding.target_group_index, weight * binding.weight);
        }
        true
    }

    // ========== 输出 ==========

    pub fn camera_transform(&self, index: usize) -> Option<CameraTransform> {
        self.camera_transforms.get(index).copied().flatten()
    }

    pub fn skin_palette(&self, skin_index: usize) -> Option<&SkinPalette> {
        self.palettes.get(skin_index)
    }

    pub fn debug_lines(&self) -> &[DebugLine] {
        &self.debug_lines
    }

    /// 生成渲染任务；调用方提交后需要 `release`
    pub fn create_render_task(&self, model_matrix: Mat4, light: u32, overlay: u32) -> RenderTask {
        let scene = self.scene();
        let draws = scene
            .primitive_components()
            .map(|(node, primitive)| DrawItem {
                primitive: Arc::clone(&primitive.primitive),
                // 蒙皮网格的关节矩阵已包含节点层级
                model_matrix: match primitive.skin_index {
                    Some(_) => model_matrix,
                    None => model_matrix * self.world_transforms[node],
                },
                skin_index: primitive.skin_index,
                morphed_primitive_index: primitive.morphed_primitive_index,
            })
            .collect();

        RenderTask::new(
            self.scene.clone(),
            model_matrix,
            light,
            overlay,
            draws,
            self.palettes.iter().map(SkinPalette::snapshot).collect(),
            self.morph_weights.iter().map(|weights| Arc::from(weights.as_slice())).collect(),
        )
    }
}

impl Drop for ModelInstance {
    fn drop(&mut self) {
        self.scene.decrease_reference_count();
    }
}

/// IK 求解器看到的实例姿态，写入指定变换层
struct InstancePose<'a> {
    instance: &'a mut ModelInstance,
    scene: &'a RenderScene,
    transform_id: TransformId,
}

impl IkPose for InstancePose<'_> {
    fn world_transform(&self, node: usize) -> Mat4 {
        self.instance.world_transforms[node]
    }

    fn base_rotation(&self, node: usize) -> Quat {
        self.instance.transforms[node].matrix_before(self.transform_id).to_scale_rotation_translation().1
    }

    fn set_ik_rotation(&mut self, node: usize, rotation: Quat) {
        self.instance.transforms[node].set_matrix(self.transform_id, Mat4::from_quat(rotation));
        self.instance.refresh_subtree(self.scene, node);
    }
}
