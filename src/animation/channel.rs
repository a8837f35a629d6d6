//! 动画通道
//!
//! 一个通道驱动一个节点属性（平移 / 旋转 / 缩放，或 Bedrock 形式）或一个表情权重。
//! 所有一致性检查都在构造时完成，采样过程不再失败。

use glam::{EulerRot, Quat, Vec3};

use super::bezier_curve::BezierChannelComponent;
use super::interpolation::{Interpolation, KeyframeValue, Segment, ValueKind};
use super::keyframes::{KeyframeIndexer, KeyframeLookup, KeyframeValues};
use super::molang::{MolangScope, MolangValue};
use crate::scene::NodeId;
use crate::transform::TransformId;
use crate::{EngineError, Result};

/// 节点属性
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeProperty {
    Translation,
    Rotation,
    Scale,
    BedrockTranslation,
    /// 欧拉角（度）
    BedrockRotation,
    BedrockScale,
}

impl NodeProperty {
    fn value_kind(self) -> ValueKind {
        match self {
            NodeProperty::Rotation => ValueKind::Quat,
            _ => ValueKind::Vec3,
        }
    }
}

/// 通道目标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelTarget {
    Node { node: NodeId, property: NodeProperty, transform_id: TransformId },
    /// 表情权重
    Expression { index: usize },
}

impl ChannelTarget {
    fn value_kind(&self) -> ValueKind {
        match self {
            ChannelTarget::Node { property, .. } => property.value_kind(),
            ChannelTarget::Expression { .. } => ValueKind::Float,
        }
    }
}

/// 关键帧值
#[derive(Clone, Debug)]
pub enum ChannelValues {
    Float(KeyframeValues<f32>),
    Vec3(KeyframeValues<Vec3>),
    Quat(KeyframeValues<Quat>),
    Scripted(KeyframeValues<[MolangValue; 3]>),
}

impl ChannelValues {
    pub fn kind(&self) -> ValueKind {
        match self {
            ChannelValues::Float(_) => ValueKind::Float,
            ChannelValues::Vec3(_) => ValueKind::Vec3,
            ChannelValues::Quat(_) => ValueKind::Quat,
            ChannelValues::Scripted(_) => ValueKind::Script,
        }
    }

    fn frames_and_elements(&self) -> (usize, usize) {
        match self {
            ChannelValues::Float(v) => (v.frames(), v.elements()),
            ChannelValues::Vec3(v) => (v.frames(), v.elements()),
            ChannelValues::Quat(v) => (v.frames(), v.elements()),
            ChannelValues::Scripted(v) => (v.frames(), v.elements()),
        }
    }
}

/// 采样结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChannelSample {
    Float(f32),
    Vec3(Vec3),
    Quat(Quat),
}

impl ChannelSample {
    /// Bedrock 旋转通道的欧拉角（度）转换为四元数
    pub fn bedrock_rotation(euler_degrees: Vec3) -> Quat {
        Quat::from_euler(
            EulerRot::ZYX,
            euler_degrees.z.to_radians(),
            euler_degrees.y.to_radians(),
            euler_degrees.x.to_radians(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct AnimationChannel {
    target: ChannelTarget,
    interpolation: Interpolation,
    indexer: KeyframeIndexer,
    values: ChannelValues,
    bezier: Option<BezierChannelComponent>,
}

impl AnimationChannel {
    pub fn new(
        target: ChannelTarget,
        interpolation: Interpolation,
        times: Vec<f32>,
        values: ChannelValues,
        bezier: Option<BezierChannelComponent>,
    ) -> Result<Self> {
        let kind = values.kind();
        if !interpolation.supports(kind) {
            return Err(EngineError::UnsupportedInterpolation {
                interpolation: interpolation.name(),
                value: kind.name(),
            });
        }

        let expected = target.value_kind();
        let compatible = kind == expected || (kind == ValueKind::Script && expected == ValueKind::Vec3);
        if !compatible {
            return Err(EngineError::InvalidKeyframeData(format!(
                "{} keyframes cannot drive a {} target",
                kind.name(),
                expected.name()
            )));
        }

        let indexer = KeyframeIndexer::new(times)?;
        let (frames, elements) = values.frames_and_elements();
        if elements != interpolation.elements() {
            return Err(EngineError::InvalidKeyframeData(format!(
                "{} interpolation expects {} elements per keyframe, got {}",
                interpolation.name(),
                interpolation.elements(),
                elements
            )));
        }
        if frames != indexer.len() {
            return Err(EngineError::InvalidKeyframeData(format!(
                "{} keyframe times but {} keyframe values",
                indexer.len(),
                frames
            )));
        }

        match (interpolation.bezier_channels(), &bezier) {
            (Some(_), None) => return Err(EngineError::MissingChannelComponent),
            (Some(expected), Some(component)) => {
                if component.channels() != expected {
                    return Err(EngineError::ChannelCountMismatch { expected, actual: component.channels() });
                }
                if component.frames() != frames {
                    return Err(EngineError::InvalidKeyframeData(format!(
                        "bezier component covers {} frames, channel has {}",
                        component.frames(),
                        frames
                    )));
                }
            }
            (None, _) => {}
        }

        Ok(Self { target, interpolation, indexer, values, bezier })
    }

    pub fn target(&self) -> &ChannelTarget {
        &self.target
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// 最后一个关键帧的时间
    pub fn duration(&self) -> f32 {
        self.indexer.last_time()
    }

    pub fn sample(&self, scope: &MolangScope<'_>) -> ChannelSample {
        let lookup = self.indexer.find(scope.anim_time);
        match &self.values {
            ChannelValues::Float(values) => ChannelSample::Float(self.sample_values(lookup, values)),
            ChannelValues::Vec3(values) => ChannelSample::Vec3(self.sample_values(lookup, values)),
            ChannelValues::Quat(values) => ChannelSample::Quat(self.sample_values(lookup, values)),
            ChannelValues::Scripted(values) => {
                let evaluate = |frame: usize| -> Vec3 {
                    let [x, y, z] = &values.frame(frame)[0];
                    Vec3::new(x.evaluate(scope), y.evaluate(scope), z.evaluate(scope))
                };
                ChannelSample::Vec3(match lookup {
                    KeyframeLookup::Single(frame) => evaluate(frame),
                    KeyframeLookup::Between { start_frame, end_frame, delta, .. } => {
                        evaluate(start_frame).lerp(evaluate(end_frame), delta)
                    }
                })
            }
        }
    }

    fn sample_values<T: KeyframeValue>(&self, lookup: KeyframeLookup, values: &KeyframeValues<T>) -> T {
        match lookup {
            KeyframeLookup::Single(frame) => values.frame(frame)[self.interpolation.value_element()],
            KeyframeLookup::Between { start_frame, end_frame, delta, duration } => {
                let segment = Segment { start_frame, end_frame, delta, duration };
                self.interpolation.interpolate(&segment, values, self.bezier.as_ref())
            }
        }
    }
}
