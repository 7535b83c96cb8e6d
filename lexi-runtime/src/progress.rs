//! # Progress 模块
//!
//! 分析请求进行期间的进度模拟。
//!
//! ## 行为
//!
//! - `active = false`：进度 0，消息为空，没有定时器
//! - `false → true`：启动两个周期定时器
//!   - 消息轮换（默认 800ms）：按顺序循环状态消息
//!   - 进度模拟（默认 200ms）：每次增加 `[0, max_increment)` 的随机量，封顶 95
//! - 外部提供的进度 / 消息会覆盖模拟值，并停止对应的模拟，直到再次变为非活跃
//! - `true → false`：停止两个定时器，丢弃尚未应用的增量

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::TimingConfig;
use crate::observer::{SubscriptionId, Subscribers};
use crate::timer::{Epoch, Fired, TimerPayload, Timers};

/// 周期定时器的最小间隔，零间隔会在同一时刻无限重排
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// 进度模拟的定时器负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTimer {
    /// 消息轮换
    Message,
    /// 进度增长
    Percent,
}

/// 每次 `tick` 的输入
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressInput {
    /// 操作是否仍在进行
    pub active: bool,
    /// 权威进度（覆盖模拟值）
    #[serde(default)]
    pub external_percent: Option<f64>,
    /// 权威消息（覆盖轮换）
    #[serde(default)]
    pub external_message: Option<String>,
}

impl ProgressInput {
    /// 非活跃
    pub fn inactive() -> Self {
        Self::default()
    }

    /// 活跃，无外部覆盖
    pub fn active() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    /// 附带权威进度
    pub fn with_percent(mut self, percent: f64) -> Self {
        self.external_percent = Some(percent);
        self
    }

    /// 附带权威消息
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.external_message = Some(message.into());
        self
    }
}

/// 进度快照
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    /// 百分比
    pub percent: f64,
    /// 当前状态消息
    pub message: String,
}

/// 进度模拟参数
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTiming {
    pub message_period: Duration,
    pub percent_period: Duration,
    pub percent_cap: f64,
    pub max_increment: f64,
    pub messages: Vec<String>,
}

impl Default for ProgressTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for ProgressTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            message_period: config.message_period(),
            percent_period: config.percent_period(),
            percent_cap: config.percent_cap,
            max_increment: config.max_increment,
            messages: config.status_messages.clone(),
        }
    }
}

impl ProgressTiming {
    /// 修正不可用的参数
    ///
    /// 周期至少为 1ms；非有限或负的增量视为 0；封顶值限制在 `[0, 100]`。
    pub fn normalized(mut self) -> Self {
        self.message_period = self.message_period.max(MIN_PERIOD);
        self.percent_period = self.percent_period.max(MIN_PERIOD);
        if !(self.max_increment.is_finite() && self.max_increment > 0.0) {
            self.max_increment = 0.0;
        }
        self.percent_cap = if self.percent_cap.is_finite() {
            self.percent_cap.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }
}

/// 进度模拟器
pub struct ProgressSimulator<R = StdRng> {
    timing: ProgressTiming,
    rng: R,
    epoch: Epoch,
    active: bool,
    state: ProgressState,
    message_index: usize,
    /// 外部进度已接管
    percent_overridden: bool,
    /// 外部消息已接管
    message_overridden: bool,
    subscribers: Subscribers<ProgressState>,
}

impl Default for ProgressSimulator<StdRng> {
    fn default() -> Self {
        Self::new(ProgressTiming::default())
    }
}

impl<R> std::fmt::Debug for ProgressSimulator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSimulator")
            .field("epoch", &self.epoch)
            .field("active", &self.active)
            .field("state", &self.state)
            .finish()
    }
}

impl ProgressSimulator<StdRng> {
    /// 使用系统熵初始化随机数
    pub fn new(timing: ProgressTiming) -> Self {
        Self::with_rng(timing, StdRng::from_entropy())
    }
}

impl<R: Rng> ProgressSimulator<R> {
    /// 注入随机数源（测试时使用固定种子）
    pub fn with_rng(timing: ProgressTiming, rng: R) -> Self {
        Self {
            timing: timing.normalized(),
            rng,
            epoch: Epoch::ZERO,
            active: false,
            state: ProgressState::default(),
            message_index: 0,
            percent_overridden: false,
            message_overridden: false,
            subscribers: Subscribers::new(),
        }
    }

    /// 同步输入，返回当前快照
    pub fn tick<T: TimerPayload<ProgressTimer>>(
        &mut self,
        input: ProgressInput,
        timers: &mut Timers<T>,
    ) -> ProgressState {
        if !input.active {
            if self.active {
                self.stop(timers);
                debug!(epoch = %self.epoch, "进度模拟停止");
            }
            let idle = ProgressState::default();
            if self.state != idle {
                self.state = idle;
                self.subscribers.publish(&self.state);
            }
            return self.state.clone();
        }

        if !self.active {
            self.activate(timers);
        }

        let mut changed = false;
        if let Some(percent) = input.external_percent.filter(|p| p.is_finite()) {
            self.percent_overridden = true;
            self.state.percent = percent.clamp(0.0, 100.0);
            changed = true;
        }
        if let Some(message) = input.external_message {
            self.message_overridden = true;
            self.state.message = message;
            changed = true;
        }
        if changed {
            self.subscribers.publish(&self.state);
        }
        self.state.clone()
    }

    /// 处理一个已触发的定时器
    pub fn on_timer<T: TimerPayload<ProgressTimer>>(
        &mut self,
        fired: Fired<ProgressTimer>,
        timers: &mut Timers<T>,
    ) -> Option<ProgressState> {
        if fired.epoch != self.epoch || !self.active {
            trace!(stale = %fired.epoch, current = %self.epoch, "丢弃过期的进度定时器");
            return None;
        }

        match fired.payload {
            ProgressTimer::Message => {
                if self.message_overridden {
                    return None;
                }
                self.message_index = (self.message_index + 1) % self.timing.messages.len().max(1);
                self.state.message = self
                    .timing
                    .messages
                    .get(self.message_index)
                    .cloned()
                    .unwrap_or_default();
                timers.schedule(
                    self.timing.message_period,
                    self.epoch,
                    ProgressTimer::Message.into(),
                );
            }
            ProgressTimer::Percent => {
                if self.percent_overridden {
                    return None;
                }
                let increment = if self.timing.max_increment > 0.0 {
                    self.rng.gen_range(0.0..self.timing.max_increment)
                } else {
                    0.0
                };
                let next = (self.state.percent + increment).min(self.timing.percent_cap);
                self.state.percent = next.max(self.state.percent);
                if self.state.percent < self.timing.percent_cap {
                    timers.schedule(
                        self.timing.percent_period,
                        self.epoch,
                        ProgressTimer::Percent.into(),
                    );
                }
            }
        }

        self.subscribers.publish(&self.state);
        Some(self.state.clone())
    }

    /// 独占队列时的便捷驱动
    pub fn update(
        &mut self,
        timers: &mut Timers<ProgressTimer>,
        dt: Duration,
    ) -> Vec<ProgressState> {
        let deadline = timers.now() + dt;
        let mut states = Vec::new();
        while let Some(fired) = timers.pop_until(deadline) {
            states.extend(self.on_timer(fired, timers));
        }
        timers.advance_to(deadline);
        states
    }

    /// 销毁前调用：停止定时器，不再修改状态
    pub fn cancel<T: TimerPayload<ProgressTimer>>(&mut self, timers: &mut Timers<T>) {
        self.stop(timers);
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 订阅快照
    pub fn subscribe(&mut self, callback: impl FnMut(&ProgressState) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    fn activate<T: TimerPayload<ProgressTimer>>(&mut self, timers: &mut Timers<T>) {
        self.epoch = self.epoch.next();
        self.active = true;
        self.percent_overridden = false;
        self.message_overridden = false;
        self.message_index = 0;
        self.state = ProgressState {
            percent: 0.0,
            message: self.timing.messages.first().cloned().unwrap_or_default(),
        };
        timers.schedule(
            self.timing.message_period,
            self.epoch,
            ProgressTimer::Message.into(),
        );
        timers.schedule(
            self.timing.percent_period,
            self.epoch,
            ProgressTimer::Percent.into(),
        );
        debug!(epoch = %self.epoch, "进度模拟开始");
        self.subscribers.publish(&self.state);
    }

    fn stop<T: TimerPayload<ProgressTimer>>(&mut self, timers: &mut Timers<T>) {
        self.epoch = self.epoch.next();
        self.active = false;
        self.percent_overridden = false;
        self.message_overridden = false;
        timers.cancel_where(|_, payload| {
            <T as TimerPayload<ProgressTimer>>::route(payload).is_some()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn seeded() -> ProgressSimulator<StdRng> {
        ProgressSimulator::with_rng(ProgressTiming::default(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_zero_periods_are_clamped() {
        let timing = ProgressTiming {
            message_period: Duration::ZERO,
            percent_period: Duration::ZERO,
            max_increment: f64::NAN,
            ..ProgressTiming::default()
        };
        let mut timers = Timers::new();
        let mut progress = ProgressSimulator::with_rng(timing, StdRng::seed_from_u64(7));
        progress.tick(ProgressInput::active(), &mut timers);

        // 每个周期定时器 1ms 一次，推进 10ms 后必然返回
        let states = progress.update(&mut timers, ms(10));
        assert_eq!(states.len(), 20);
        assert_eq!(progress.state().percent, 0.0);
        assert_eq!(timers.now(), ms(10));
    }

    #[test]
    fn test_inactive_is_idle() {
        let mut timers: Timers<ProgressTimer> = Timers::new();
        let mut progress = seeded();
        let state = progress.tick(ProgressInput::inactive(), &mut timers);
        assert_eq!(state, ProgressState::default());
        assert!(timers.is_idle());
    }

    #[test]
    fn test_simulated_percent_is_capped_and_monotonic() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        let state = progress.tick(ProgressInput::active(), &mut timers);
        assert_eq!(state.percent, 0.0);
        assert_eq!(state.message, "Reading document...");

        let mut last = 0.0;
        for _ in 0..2_000 {
            for state in progress.update(&mut timers, ms(50)) {
                assert!(state.percent >= last);
                assert!(state.percent <= 95.0);
                last = state.percent;
            }
        }
        assert!(last > 0.0);
    }

    #[test]
    fn test_messages_rotate_and_wrap() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        progress.tick(ProgressInput::active(), &mut timers);

        progress.update(&mut timers, ms(800));
        assert_eq!(progress.state().message, "Extracting legal entities...");

        // 7 条消息，再过 6 个周期回到第一条
        progress.update(&mut timers, ms(800 * 6));
        assert_eq!(progress.state().message, "Reading document...");
    }

    #[test]
    fn test_external_percent_overrides() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        progress.tick(ProgressInput::active(), &mut timers);
        progress.update(&mut timers, ms(2_000));

        let state = progress.tick(ProgressInput::active().with_percent(42.0), &mut timers);
        assert_eq!(state.percent, 42.0);

        // 之后不再模拟增长，但消息继续轮换
        let message_before = progress.state().message.clone();
        progress.update(&mut timers, ms(5_000));
        assert_eq!(progress.state().percent, 42.0);
        assert_ne!(progress.state().message, message_before);

        let state = progress.tick(ProgressInput::active(), &mut timers);
        assert_eq!(state.percent, 42.0);
    }

    #[test]
    fn test_external_message_overrides_rotation() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        progress.tick(
            ProgressInput::active().with_message("Uploading..."),
            &mut timers,
        );
        progress.update(&mut timers, ms(10_000));
        assert_eq!(progress.state().message, "Uploading...");
        assert!(progress.state().percent > 0.0);
    }

    #[test]
    fn test_deactivate_resets_and_stops_timers() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        progress.tick(ProgressInput::active().with_percent(70.0), &mut timers);

        let state = progress.tick(ProgressInput::inactive(), &mut timers);
        assert_eq!(state, ProgressState::default());
        assert!(timers.is_idle());
        assert!(progress.update(&mut timers, ms(10_000)).is_empty());

        // 重新激活时覆盖状态被清除，模拟重新开始
        let state = progress.tick(ProgressInput::active(), &mut timers);
        assert_eq!(state.percent, 0.0);
        progress.update(&mut timers, ms(1_000));
        assert!(progress.state().percent > 0.0);
    }

    #[test]
    fn test_stale_increment_discarded() {
        let mut timers = Timers::new();
        let mut progress = seeded();
        progress.tick(ProgressInput::active(), &mut timers);
        let old_epoch = progress.epoch();
        progress.tick(ProgressInput::inactive(), &mut timers);
        progress.tick(ProgressInput::active(), &mut timers);

        let stale = Fired {
            id: timers.schedule(ms(0), old_epoch, ProgressTimer::Percent),
            due: ms(0),
            epoch: old_epoch,
            payload: ProgressTimer::Percent,
        };
        assert!(progress.on_timer(stale, &mut timers).is_none());
        assert_eq!(progress.state().percent, 0.0);
    }
}
