//! 动画播放状态
//!
//! 时间由游戏刻推导：记录上一次"暂停标记"时的刻与时间，
//! 之后的时间 = 标记时间 + (当前刻 - 标记刻) * 秒每刻 * 速度。
//! 修改速度 / 循环 / 暂停都会先打标记，保证时间连续。

use super::context::{AnimationContext, SECONDS_PER_TICK};

#[derive(Clone, Debug)]
pub struct AnimationState {
    duration: f32,
    looping: bool,
    paused: bool,
    speed: f32,

    prev_game_tick: u64,
    prev_delta_tick: f32,
    pause_game_tick: u64,
    pause_delta_tick: f32,
    pause_time: f32,

    current_time: f32,
}

impl AnimationState {
    pub fn new(context: &dyn AnimationContext, duration: f32, looping: bool) -> Self {
        let game_tick = context.game_tick();
        let delta_tick = context.delta_tick();
        Self {
            duration: duration.max(0.0),
            looping,
            paused: false,
            speed: 1.0,
            prev_game_tick: game_tick,
            prev_delta_tick: delta_tick,
            pause_game_tick: game_tick,
            pause_delta_tick: delta_tick,
            pause_time: 0.0,
            current_time: 0.0,
        }
    }

    /// 根据上下文的游戏刻刷新当前时间
    pub fn update_time(&mut self, context: &dyn AnimationContext) {
        self.prev_game_tick = context.game_tick();
        self.prev_delta_tick = context.delta_tick();

        if self.paused {
            self.current_time = self.pause_time;
            return;
        }

        let ticks = (self.prev_game_tick as i64 - self.pause_game_tick as i64) as f32
            + (self.prev_delta_tick - self.pause_delta_tick);
        let elapsed = ticks * SECONDS_PER_TICK * self.speed;
        self.current_time = self.wrap(self.pause_time + elapsed);
    }

    fn wrap(&self, time: f32) -> f32 {
        if self.duration <= 0.0 {
            0.0
        } else if self.looping {
            time.rem_euclid(self.duration)
        } else {
            time.clamp(0.0, self.duration)
        }
    }

    fn mark_pause(&mut self) {
        self.pause_game_tick = self.prev_game_tick;
        self.pause_delta_tick = self.prev_delta_tick;
        self.pause_time = self.current_time;
    }

    pub fn time(&self) -> f32 {
        self.current_time
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// 跳转到指定时间（按循环 / 夹紧策略处理越界）
    pub fn seek(&mut self, time: f32) {
        self.current_time = self.wrap(time);
        self.mark_pause();
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        if self.looping != looping {
            self.mark_pause();
        }
        self.looping = looping;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.mark_pause();
        }
        self.paused = paused;
    }

    pub fn is_playing(&self) -> bool {
        !self.paused
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// 负速度倒放
    pub fn set_speed(&mut self, speed: f32) {
        if self.speed != speed {
            self.mark_pause();
        }
        self.speed = speed;
    }
}
