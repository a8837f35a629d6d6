//! 运行时配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 运行时配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ========== IK ==========
    /// 末端到目标距离低于此值时提前结束迭代，默认 1e-4
    pub ik_convergence_threshold: f32,
    /// 单关节旋转角小于此值（弧度）时跳过，默认 1e-5
    pub ik_min_angle: f32,

    // ========== 动画 ==========
    /// 贝塞尔曲线预采样间隔数，默认 128
    pub bezier_interval: u32,
    /// Molang 求值失败时的替代值，默认 0.0
    pub script_error_value: f32,

    // ========== 调试 ==========
    /// DebugRender 阶段是否输出关节连线，默认 true
    pub debug_render_joints: bool,
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // ====== IK ======
            // 距离阈值使用模型空间单位
            ik_convergence_threshold: 1.0e-4,
            ik_min_angle: 1.0e-5,

            // ====== 动画 ======
            // 越大 → 曲线查找越精确，但占用更多内存
            bezier_interval: 128,
            script_error_value: 0.0,

            // ====== 调试 ======
            debug_render_joints: true,
            debug_log: false,
        }
    }
}

/// 全局配置实例
static ENGINE_CONFIG: Lazy<RwLock<EngineConfig>> = Lazy::new(|| {
    RwLock::new(EngineConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> EngineConfig {
    ENGINE_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: EngineConfig) {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *ENGINE_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = EngineConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.ik_convergence_threshold > 0.0);
        assert!(config.bezier_interval >= 1);
    }
}
