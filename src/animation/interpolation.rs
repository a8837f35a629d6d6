//! 插值策略
//!
//! 每种策略接收 (起始帧, 结束帧, delta, 起始值, 结束值)，
//! 贝塞尔策略额外读取通道上的 `BezierChannelComponent` 做缓动。

use glam::{Quat, Vec3};

use super::bezier_curve::BezierChannelComponent;
use super::keyframes::KeyframeValues;

/// 关键帧值类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Vec3,
    Quat,
    /// 每帧三个 Molang 分量
    Script,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Float => "float",
            ValueKind::Vec3 => "vec3",
            ValueKind::Quat => "quaternion",
            ValueKind::Script => "script",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Linear,
    Step,
    /// 仅四元数
    Spherical,
    /// glTF 三次样条：每帧 [入切线, 值, 出切线]
    CubicSpline,
    /// 使用前后相邻帧
    CatmullRom,
    /// VMD 逐轴贝塞尔，3 个通道
    BezierPerAxis,
    /// VMD 合并贝塞尔，1 个通道
    BezierCombined,
    /// Molang 脚本求值后线性插值
    Scripted,
}

impl Interpolation {
    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Linear => "linear",
            Interpolation::Step => "step",
            Interpolation::Spherical => "spherical",
            Interpolation::CubicSpline => "cubic spline",
            Interpolation::CatmullRom => "catmull-rom",
            Interpolation::BezierPerAxis => "per-axis bezier",
            Interpolation::BezierCombined => "combined bezier",
            Interpolation::Scripted => "scripted",
        }
    }

    /// 每帧的元素数
    pub fn elements(self) -> usize {
        match self {
            Interpolation::CubicSpline => 3,
            _ => 1,
        }
    }

    /// 帧内代表关键帧取值的元素下标
    pub fn value_element(self) -> usize {
        match self {
            Interpolation::CubicSpline => 1,
            _ => 0,
        }
    }

    /// 需要的贝塞尔通道数
    pub fn bezier_channels(self) -> Option<usize> {
        match self {
            Interpolation::BezierPerAxis => Some(3),
            Interpolation::BezierCombined => Some(1),
            _ => None,
        }
    }

    pub fn supports(self, kind: ValueKind) -> bool {
        match self {
            Interpolation::Spherical => kind == ValueKind::Quat,
            Interpolation::BezierPerAxis => kind == ValueKind::Vec3,
            Interpolation::Scripted => kind == ValueKind::Script,
            _ => kind != ValueKind::Script,
        }
    }

    /// 在一个关键帧区间内插值
    pub fn interpolate<T: KeyframeValue>(
        self,
        segment: &Segment,
        values: &KeyframeValues<T>,
        bezier: Option<&BezierChannelComponent>,
    ) -> T {
        let start = values.frame(segment.start_frame);
        let end = values.frame(segment.end_frame);
        let delta = segment.delta;

        match self {
            Interpolation::Linear | Interpolation::Scripted => start[0].lerp(end[0], delta),
            Interpolation::Step => start[0],
            Interpolation::Spherical => start[0].slerp(end[0], delta),
            Interpolation::CubicSpline => {
                let t2 = delta * delta;
                let t3 = t2 * delta;
                let h1 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h2 = t3 - 2.0 * t2 + delta;
                let h3 = -2.0 * t3 + 3.0 * t2;
                let h4 = t3 - t2;
                // 切线按区间时长缩放
                let d = segment.duration;
                T::weighted_sum([(start[1], h1), (start[2], h2 * d), (end[1], h3), (end[0], h4 * d)])
            }
            Interpolation::CatmullRom => {
                let p0 = values.frame(segment.start_frame.saturating_sub(1))[0];
                let p3 = values.frame(segment.end_frame + 1)[0];
                let t2 = delta * delta;
                let t3 = t2 * delta;
                let c0 = -0.5 * t3 + t2 - 0.5 * delta;
                let c1 = 1.5 * t3 - 2.5 * t2 + 1.0;
                let c2 = -1.5 * t3 + 2.0 * t2 + 0.5 * delta;
                let c3 = 0.5 * t3 - 0.5 * t2;
                T::weighted_sum([(p0, c0), (start[0], c1), (end[0], c2), (p3, c3)])
            }
            Interpolation::BezierPerAxis => {
                let eased = match bezier {
                    Some(b) => [0, 1, 2].map(|axis| b.delta(segment.start_frame, axis, delta)),
                    None => [delta; 3],
                };
                start[0].lerp_per_axis(end[0], eased)
            }
            Interpolation::BezierCombined => {
                let eased = bezier.map_or(delta, |b| b.delta(segment.start_frame, 0, delta));
                start[0].lerp(end[0], eased)
            }
        }
    }
}

/// 关键帧区间
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start_frame: usize,
    pub end_frame: usize,
    pub delta: f32,
    pub duration: f32,
}

/// 可插值的关键帧值
pub trait KeyframeValue: Copy {
    const KIND: ValueKind;

    fn lerp(self, end: Self, t: f32) -> Self;

    fn slerp(self, end: Self, t: f32) -> Self {
        self.lerp(end, t)
    }

    fn lerp_per_axis(self, end: Self, t: [f32; 3]) -> Self {
        self.lerp(end, t[0])
    }

    fn weighted_sum(terms: [(Self, f32); 4]) -> Self;
}

impl KeyframeValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn lerp(self, end: Self, t: f32) -> Self {
        self + (end - self) * t
    }

    fn weighted_sum(terms: [(Self, f32); 4]) -> Self {
        terms.iter().map(|(v, w)| v * w).sum()
    }
}

impl KeyframeValue for Vec3 {
    const KIND: ValueKind = ValueKind::Vec3;

    fn lerp(self, end: Self, t: f32) -> Self {
        Vec3::lerp(self, end, t)
    }

    fn lerp_per_axis(self, end: Self, t: [f32; 3]) -> Self {
        self + (end - self) * Vec3::from_array(t)
    }

    fn weighted_sum(terms: [(Self, f32); 4]) -> Self {
        terms.iter().fold(Vec3::ZERO, |acc, (v, w)| acc + *v * *w)
    }
}

impl KeyframeValue for Quat {
    const KIND: ValueKind = ValueKind::Quat;

    /// 旋转的线性插值同样走球面插值
    fn lerp(self, end: Self, t: f32) -> Self {
        self.slerp(end, t)
    }

    fn slerp(self, end: Self, t: f32) -> Self {
        Quat::slerp(self, end, t)
    }

    fn weighted_sum(terms: [(Self, f32); 4]) -> Self {
        let sum = terms.iter().fold(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), |acc, (q, w)| acc + *q * *w);
        if sum.length_squared() <= f32::EPSILON {
            terms[1].0
        } else {
            sum.normalize()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn segment(delta: f32) -> Segment {
        Segment { start_frame: 0, end_frame: 1, delta, duration: 1.0 }
    }

    #[test]
    fn test_linear_and_step() {
        let values = KeyframeValues::new(vec![Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)], 1).unwrap();
        let v = Interpolation::Linear.interpolate(&segment(0.5), &values, None);
        assert!(v.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        let v = Interpolation::Step.interpolate(&segment(0.9), &values, None);
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn test_spherical_rotation_midpoint() {
        let values = KeyframeValues::new(vec![Quat::IDENTITY, Quat::from_rotation_z(FRAC_PI_2)], 1).unwrap();
        let q = Interpolation::Spherical.interpolate(&segment(0.5), &values, None);
        assert!(q.abs_diff_eq(Quat::from_rotation_z(FRAC_PI_2 / 2.0), 1e-5));
    }

    #[test]
    fn test_cubic_spline_hits_keyframes() {
        // [入切线, 值, 出切线]
        let values = KeyframeValues::new(vec![0.0, 1.0, 0.0, 0.0, 3.0, 0.0], 3).unwrap();
        let at_start = Interpolation::CubicSpline.interpolate(&segment(0.0), &values, None);
        let at_end = Interpolation::CubicSpline.interpolate(&segment(1.0), &values, None);
        assert!((at_start - 1.0f32).abs() < 1e-6);
        assert!((at_end - 3.0f32).abs() < 1e-6);
    }

    #[test]
    fn test_catmull_rom_on_line() {
        let values = KeyframeValues::new(vec![0.0f32, 1.0, 2.0, 3.0], 1).unwrap();
        let seg = Segment { start_frame: 1, end_frame: 2, delta: 0.5, duration: 1.0 };
        let v = Interpolation::CatmullRom.interpolate(&seg, &values, None);
        assert!((v - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_bezier_per_axis_uses_each_channel() {
        // x 轴线性，y 轴缓入
        let params = [[20, 20, 107, 107], [127, 0, 127, 0], [20, 20, 107, 107], [20, 20, 107, 107], [127, 0, 127, 0], [20, 20, 107, 107]];
        let bezier = BezierChannelComponent::from_parameters(3, &params).unwrap();
        let values = KeyframeValues::new(vec![Vec3::ZERO, Vec3::ONE], 1).unwrap();
        let v = Interpolation::BezierPerAxis.interpolate(&segment(0.5), &values, Some(&bezier));
        assert!((v.x - 0.5).abs() < 0.05);
        assert!(v.y < v.x);
    }

    #[test]
    fn test_bezier_combined_eases_every_axis() {
        // 一条缓入曲线同时作用于三个分量
        let bezier = BezierChannelComponent::from_parameters(1, &[[127, 0, 127, 0], [20, 20, 107, 107]]).unwrap();
        let values = KeyframeValues::new(vec![Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)], 1).unwrap();
        let v = Interpolation::BezierCombined.interpolate(&segment(0.5), &values, Some(&bezier));
        let eased = v.x / 2.0;
        assert!(eased < 0.5);
        assert!(v.abs_diff_eq(Vec3::new(2.0, 4.0, 6.0) * eased, 1e-5));

        // 无贝塞尔参数时退化为线性
        let v = Interpolation::BezierCombined.interpolate(&segment(0.5), &values, None);
        assert!(v.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert_eq!(Interpolation::BezierCombined.bezier_channels(), Some(1));
    }

    #[test]
    fn test_supports() {
        assert!(Interpolation::Spherical.supports(ValueKind::Quat));
        assert!(!Interpolation::Spherical.supports(ValueKind::Vec3));
        assert!(!Interpolation::BezierPerAxis.supports(ValueKind::Quat));
        assert!(Interpolation::Scripted.supports(ValueKind::Script));
        assert!(!Interpolation::Linear.supports(ValueKind::Script));
        assert_eq!(Interpolation::BezierPerAxis.bezier_channels(), Some(3));
    }
}
