//! 贝塞尔缓动曲线
//!
//! 控制点以 [0, 127] 的字节参数给出（与 VMD 关键帧插值参数一致），
//! 曲线预先采样，相同参数的曲线通过全局缓存共享。

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::config::get_config;
use crate::{EngineError, Result};

/// 三次贝塞尔曲线（端点固定为 (0,0) 与 (1,1)）
#[derive(Debug, Clone, PartialEq)]
pub struct BezierCurve {
    /// 预计算的曲线采样点（按 x 升序）
    points: Vec<Vec2>,
    interval: u32,
}

impl BezierCurve {
    const P0: Vec2 = Vec2::ZERO;
    const P1: Vec2 = Vec2::ONE;

    /// - `c0` / `c1`: 归一化到 0-1 的控制点
    /// - `interval`: 采样间隔数
    pub fn new(c0: Vec2, c1: Vec2, interval: u32) -> Self {
        let interval = interval.max(1);
        let interval_f = interval as f32;

        let mut points: Vec<Vec2> = (0..=interval)
            .map(|i| {
                let t = i as f32 / interval_f;
                let it = 1.0 - t;
                // B(t) = (1-t)³P₀ + 3(1-t)²tC₀ + 3(1-t)t²C₁ + t³P₁
                Self::P0 * it.powi(3) + c0 * 3.0 * it.powi(2) * t + c1 * 3.0 * it * t.powi(2) + Self::P1 * t.powi(3)
            })
            .collect();

        points.sort_unstable_by(|a, b| a.x.total_cmp(&b.x));

        Self { points, interval }
    }

    /// 从字节参数创建：[c0.x, c0.y, c1.x, c1.y]
    pub fn from_parameters(parameters: [u8; 4], interval: u32) -> Self {
        let c0 = Vec2::new(parameters[0] as f32 / 127.0, parameters[1] as f32 / 127.0);
        let c1 = Vec2::new(parameters[2] as f32 / 127.0, parameters[3] as f32 / 127.0);
        Self::new(c0, c1, interval)
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// 进度 x ∈ [0, 1] 映射为缓动后的进度，二分定位所在采样段后线性插值
    pub fn ease(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        let last = self.points.len() - 1;
        let upper = self.points.partition_point(|p| p.x <= x).clamp(1, last);
        let (a, b) = (self.points[upper - 1], self.points[upper]);
        let span = b.x - a.x;
        if span <= f32::EPSILON {
            a.y
        } else {
            a.y + (x - a.x) / span * (b.y - a.y)
        }
    }
}

/// 贝塞尔曲线缓存
#[derive(Debug, Default)]
pub struct BezierCurveCache(RwLock<HashMap<[u8; 4], Arc<BezierCurve>>>);

impl BezierCurveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_new(&self, parameters: [u8; 4], interval: u32) -> Arc<BezierCurve> {
        if let Some(curve) = self.0.read().get(&parameters) {
            // 缓存的采样精度足够时直接复用
            if curve.interval >= interval {
                return Arc::clone(curve);
            }
        }

        let curve = Arc::new(BezierCurve::from_parameters(parameters, interval));
        self.0.write().insert(parameters, Arc::clone(&curve));
        curve
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

static CURVE_CACHE: Lazy<BezierCurveCache> = Lazy::new(BezierCurveCache::new);

/// 全局曲线缓存
pub fn curve_cache() -> &'static BezierCurveCache {
    &CURVE_CACHE
}

// ============================================================================
// 贝塞尔通道组件
// ============================================================================

/// 挂在动画通道上的贝塞尔参数
///
/// 每个关键帧每个通道一条曲线，`channels` 为每帧的曲线数：
/// 逐轴 Vec3 插值为 3，其余为 1。
#[derive(Debug, Clone)]
pub struct BezierChannelComponent {
    channels: usize,
    curves: Vec<Arc<BezierCurve>>,
}

impl BezierChannelComponent {
    /// `parameters` 按 帧 × 通道 排列
    pub fn from_parameters(channels: usize, parameters: &[[u8; 4]]) -> Result<Self> {
        if channels == 0 || parameters.len() % channels != 0 {
            return Err(EngineError::InvalidKeyframeData(format!(
                "{} bezier parameters cannot be split into {} channels",
                parameters.len(),
                channels
            )));
        }
        let interval = get_config().bezier_interval;
        let cache = curve_cache();
        let curves = parameters.iter().map(|p| cache.get_or_new(*p, interval)).collect();
        Ok(Self { channels, curves })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.curves.len() / self.channels
    }

    /// 起始帧在指定通道上的缓动值
    pub fn delta(&self, start_frame: usize, channel: usize, delta: f32) -> f32 {
        self.curves
            .get(start_frame * self.channels + channel)
            .map_or(delta, |curve| curve.ease(delta))
    }
}
