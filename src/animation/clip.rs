//! 动画与动画实例

use std::sync::Arc;

use super::channel::{AnimationChannel, ChannelSample, ChannelTarget, NodeProperty};
use super::context::AnimationContext;
use super::molang::MolangScope;
use super::state::AnimationState;
use crate::instance::ModelInstance;
use crate::scene::{RenderScene, SceneId};

/// 动画：命名、固定时长的一组通道，加载后不可变
#[derive(Clone, Debug)]
pub struct Animation {
    name: Option<String>,
    duration: f32,
    channels: Vec<AnimationChannel>,
}

impl Animation {
    /// 未给出时长时取所有通道最后关键帧的最大值
    pub fn new(name: Option<String>, duration: Option<f32>, channels: Vec<AnimationChannel>) -> Self {
        let duration = duration.unwrap_or_else(|| channels.iter().map(|c| c.duration()).fold(0.0, f32::max));
        Self { name, duration: duration.max(0.0), channels }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn channels(&self) -> &[AnimationChannel] {
        &self.channels
    }

    /// 将通道目标解析到场景节点下标
    pub fn bind(&self, scene: &RenderScene) -> AnimationBinding {
        let targets = self
            .channels
            .iter()
            .map(|channel| match channel.target() {
                ChannelTarget::Node { node, .. } => {
                    let index = scene.node_by_id(*node);
                    if index.is_none() {
                        log::warn!("[Animation] 通道目标节点 {:?} 不存在，忽略该通道", node);
                    }
                    index
                }
                ChannelTarget::Expression { index } => {
                    if *index < scene.expressions().len() {
                        Some(*index)
                    } else {
                        log::warn!("[Animation] 表情下标 {} 越界，忽略该通道", index);
                        None
                    }
                }
            })
            .collect();
        AnimationBinding { scene: scene.id(), targets }
    }
}

/// 通道到场景的解析结果（节点下标或表情下标）
#[derive(Clone, Debug)]
pub struct AnimationBinding {
    scene: SceneId,
    targets: Vec<Option<usize>>,
}

impl AnimationBinding {
    pub fn scene(&self) -> SceneId {
        self.scene
    }

    pub fn resolved_count(&self) -> usize {
        self.targets.iter().flatten().count()
    }
}

/// 正在播放的动画
#[derive(Clone, Debug)]
pub struct AnimationItem {
    animation: Arc<Animation>,
    binding: AnimationBinding,
    state: AnimationState,
}

impl AnimationItem {
    pub fn new(animation: Arc<Animation>, scene: &RenderScene, context: &dyn AnimationContext, looping: bool) -> Self {
        let binding = animation.bind(scene);
        let state = AnimationState::new(context, animation.duration(), looping);
        Self { animation, binding, state }
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AnimationState {
        &mut self.state
    }

    /// 推进时间
    pub fn update(&mut self, context: &dyn AnimationContext) {
        self.state.update_time(context);
    }

    /// 采样所有通道并写入实例
    pub fn apply(&self, context: &dyn AnimationContext, instance: &mut ModelInstance) {
        if self.binding.scene != instance.scene().id() {
            log::warn!("[Animation] 动画绑定的场景与实例不一致，跳过");
            return;
        }

        let scope = MolangScope { context, anim_time: self.state.time() };
        for (channel, target) in self.animation.channels.iter().zip(&self.binding.targets) {
            let Some(target) = *target else { continue };
            let sample = channel.sample(&scope);

            let result = match (channel.target(), sample) {
                (ChannelTarget::Expression { .. }, ChannelSample::Float(weight)) => {
                    instance.set_expression_weight(target, weight);
                    Ok(())
                }
                (ChannelTarget::Node { property, transform_id, .. }, sample) => match (property, sample) {
                    (NodeProperty::Translation, ChannelSample::Vec3(v)) => {
                        instance.update_decomposed(target, *transform_id, |d| d.set_translation(v))
                    }
                    (NodeProperty::Rotation, ChannelSample::Quat(q)) => {
                        instance.update_decomposed(target, *transform_id, |d| d.set_rotation(q))
                    }
                    (NodeProperty::Scale, ChannelSample::Vec3(v)) => {
                        instance.update_decomposed(target, *transform_id, |d| d.set_scale(v))
                    }
                    (NodeProperty::BedrockTranslation, ChannelSample::Vec3(v)) => {
                        instance.update_bedrock(target, *transform_id, |b| b.set_translation(v))
                    }
                    (NodeProperty::BedrockRotation, ChannelSample::Vec3(v)) => {
                        let rotation = ChannelSample::bedrock_rotation(v);
                        instance.update_bedrock(target, *transform_id, |b| b.set_rotation(rotation))
                    }
                    (NodeProperty::BedrockScale, ChannelSample::Vec3(v)) => {
                        instance.update_bedrock(target, *transform_id, |b| b.set_scale(v))
                    }
                    // 构造时已保证类型匹配
                    _ => Ok(()),
                },
                _ => Ok(()),
            };

            if let Err(err) = result {
                log::warn!("[Animation] 写入节点 {} 失败: {}", target, err);
            }
        }
    }
}
