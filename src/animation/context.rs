//! 动画上下文
//!
//! 宿主在每帧开始时提供只读快照：游戏刻、帧内插值以及实体 / 玩家 / 世界属性。
//! 脚本插值与动画状态只通过这里读取外部世界。

use std::collections::HashMap;

use glam::DVec3;

/// 每个游戏刻的秒数
pub const SECONDS_PER_TICK: f32 = 1.0 / 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTargetType {
    Player,
    Entity,
    Block,
}

/// 上下文属性
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextProperty {
    RenderTarget,

    // 实体
    EntityPosition,
    EntityPositionDelta,
    EntityHorizontalFacing,
    EntityGroundSpeed,
    EntityVerticalSpeed,
    EntityHasRider,
    EntityIsRiding,
    EntityIsInWater,
    EntityIsInWaterOrRain,
    EntityIsInFire,
    EntityIsOnGround,

    // 生物
    LivingEntityHealth,
    LivingEntityMaxHealth,
    LivingEntityHurtTime,
    LivingEntityIsDead,
    LivingEntityEquipmentCount,

    // 玩家
    PlayerHeadXRotation,
    PlayerHeadYRotation,
    PlayerBodyXRotation,
    PlayerBodyYRotation,
    PlayerIsFirstPerson,
    PlayerPersonView,
    PlayerIsSpectator,
    PlayerIsSneaking,
    PlayerIsSprinting,
    PlayerIsSwimming,
    PlayerIsEating,
    PlayerIsUsingItem,
    PlayerIsJumping,
    PlayerIsSleeping,
    PlayerLevel,
    PlayerFoodLevel,

    // 世界
    WorldMoonPhase,
    WorldTimeOfDay,
    WorldTimeStamp,
    WorldWeather,
    WorldDimension,

    GameFps,
}

/// 属性值
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Vec3(DVec3),
    Text(String),
    RenderTarget(RenderTargetType),
}

impl PropertyValue {
    /// 数值视图（布尔值按 0 / 1）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<DVec3> {
        match self {
            PropertyValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

/// 动画上下文
pub trait AnimationContext {
    /// 游戏刻
    fn game_tick(&self) -> u64;

    /// 刻内插值 0 ~ 1
    fn delta_tick(&self) -> f32;

    fn property(&self, property: ContextProperty) -> Option<PropertyValue>;
}

/// 不可变属性快照
#[derive(Clone, Debug, Default)]
pub struct ContextSnapshot {
    pub game_tick: u64,
    pub delta_tick: f32,
    properties: HashMap<ContextProperty, PropertyValue>,
}

impl ContextSnapshot {
    pub fn new(game_tick: u64, delta_tick: f32) -> Self {
        Self { game_tick, delta_tick, properties: HashMap::new() }
    }

    pub fn with(mut self, property: ContextProperty, value: PropertyValue) -> Self {
        self.properties.insert(property, value);
        self
    }

    pub fn set(&mut self, property: ContextProperty, value: PropertyValue) {
        self.properties.insert(property, value);
    }

    /// 以秒为单位推进（测试与离线播放用）
    pub fn advance_seconds(&mut self, seconds: f32) {
        let ticks = self.delta_tick + seconds / SECONDS_PER_TICK;
        let whole = ticks.floor();
        self.game_tick = (self.game_tick as i64 + whole as i64).max(0) as u64;
        self.delta_tick = ticks - whole;
    }
}

impl AnimationContext for ContextSnapshot {
    fn game_tick(&self) -> u64 {
        self.game_tick
    }

    fn delta_tick(&self) -> f32 {
        self.delta_tick
    }

    fn property(&self, property: ContextProperty) -> Option<PropertyValue> {
        self.properties.get(&property).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_properties() {
        let snapshot = ContextSnapshot::new(40, 0.5)
            .with(ContextProperty::EntityGroundSpeed, PropertyValue::Float(0.25))
            .with(ContextProperty::PlayerIsSneaking, PropertyValue::Bool(true));

        assert_eq!(snapshot.property(ContextProperty::EntityGroundSpeed).and_then(|v| v.as_f64()), Some(0.25));
        assert_eq!(snapshot.property(ContextProperty::PlayerIsSneaking).and_then(|v| v.as_f64()), Some(1.0));
        assert!(snapshot.property(ContextProperty::WorldMoonPhase).is_none());
    }

    #[test]
    fn test_advance_seconds() {
        let mut snapshot = ContextSnapshot::new(0, 0.0);
        snapshot.advance_seconds(0.125);
        assert_eq!(snapshot.game_tick, 2);
        assert!((snapshot.delta_tick - 0.5).abs() < 1e-4);
    }
}
