//! 表情（变形目标组合）

/// 表情对单个变形目标组的绑定
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MorphTargetBinding {
    pub morphed_primitive_index: usize,
    pub target_group_index: usize,
    pub weight: f32,
}

/// 表情
///
/// 设置表情权重时，每个绑定的目标组权重 = 表情权重 * 绑定权重。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    pub name: Option<String>,
    pub tag: Option<String>,
    /// 二值表情：权重四舍五入到 0 或 1
    pub is_binary: bool,
    pub bindings: Vec<MorphTargetBinding>,
}

impl Expression {
    pub fn effective_weight(&self, weight: f32) -> f32 {
        let weight = weight.clamp(0.0, 1.0);
        if self.is_binary {
            weight.round()
        } else {
            weight
        }
    }
}
