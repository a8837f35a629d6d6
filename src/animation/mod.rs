//! 动画系统
//!
//! - `context`: 宿主提供的只读上下文快照
//! - `state`: 由游戏刻驱动的播放状态
//! - `keyframes` / `interpolation`: 关键帧查找与插值策略
//! - `bezier_curve`: VMD 风格贝塞尔缓动
//! - `molang`: 脚本关键帧
//! - `channel` / `clip`: 通道、动画与播放实例

mod bezier_curve;
mod channel;
mod clip;
pub mod context;
mod interpolation;
mod keyframes;
pub mod molang;
mod state;

pub use bezier_curve::{curve_cache, BezierChannelComponent, BezierCurve, BezierCurveCache};
pub use channel::{AnimationChannel, ChannelSample, ChannelTarget, ChannelValues, NodeProperty};
pub use clip::{Animation, AnimationBinding, AnimationItem};
pub use context::{AnimationContext, ContextProperty, ContextSnapshot, PropertyValue, SECONDS_PER_TICK};
pub use interpolation::{Interpolation, KeyframeValue, Segment, ValueKind};
pub use keyframes::{KeyframeIndexer, KeyframeLookup, KeyframeValues};
pub use molang::{MolangScope, MolangValue};
pub use state::AnimationState;
