//! # Typing 模块
//!
//! 打字效果：按固定间隔逐字符显示一段文本，显示完毕时触发一次完成回调。
//!
//! 长度按字符（Unicode 标量值）计算，`visible_text()` 总是落在字符边界上。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::observer::{SubscriptionId, Subscribers};
use crate::timer::{Epoch, Fired, TimerPayload, Timers};

/// 最小字符间隔
const MIN_SPEED: Duration = Duration::from_millis(1);

/// 打字效果的定时器负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingTimer;

/// 打字状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypingState {
    /// 已显示的字符数
    pub shown: usize,
    /// 总字符数
    pub total: usize,
    /// 是否已显示完毕
    pub complete: bool,
}

/// 打字事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingEvent {
    /// 多显示了一个字符
    Advanced { shown: usize },
    /// 全部显示完毕（每次 start 至多一次）
    Completed,
}

/// 打字效果
pub struct TypingEffect {
    epoch: Epoch,
    text: String,
    speed: Duration,
    state: TypingState,
    /// 是否有一次 start 仍然有效（未被 cancel）
    running: bool,
    subscribers: Subscribers<TypingState>,
    on_complete: Vec<Box<dyn FnMut()>>,
}

impl Default for TypingEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypingEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingEffect")
            .field("epoch", &self.epoch)
            .field("speed", &self.speed)
            .field("state", &self.state)
            .finish()
    }
}

impl TypingEffect {
    pub fn new() -> Self {
        Self {
            epoch: Epoch::ZERO,
            text: String::new(),
            speed: MIN_SPEED,
            state: TypingState::default(),
            running: false,
            subscribers: Subscribers::new(),
            on_complete: Vec::new(),
        }
    }

    /// 开始显示 `text`
    ///
    /// 文本与间隔都未变化时不做任何事；否则从 0 重新开始，旧定时器失效。
    /// 空文本视为无内容：不启动定时器，也不触发完成回调。
    pub fn start<T: TimerPayload<TypingTimer>>(
        &mut self,
        text: impl Into<String>,
        speed: Duration,
        timers: &mut Timers<T>,
    ) -> Epoch {
        let text = text.into();
        let speed = speed.max(MIN_SPEED);
        if self.running && self.text == text && self.speed == speed {
            trace!(epoch = %self.epoch, "重复 start 同一文本，忽略");
            return self.epoch;
        }

        self.epoch = self.epoch.next();
        self.running = true;
        self.state = TypingState {
            shown: 0,
            total: text.chars().count(),
            complete: false,
        };
        self.text = text;
        self.speed = speed;

        if self.state.total > 0 {
            timers.schedule(self.speed, self.epoch, TypingTimer.into());
        }
        debug!(
            epoch = %self.epoch,
            chars = self.state.total,
            speed_ms = self.speed.as_millis() as u64,
            "开始打字效果"
        );
        self.subscribers.publish(&self.state);
        self.epoch
    }

    /// 处理一个已触发的定时器
    pub fn on_timer<T: TimerPayload<TypingTimer>>(
        &mut self,
        fired: Fired<TypingTimer>,
        timers: &mut Timers<T>,
    ) -> Vec<TypingEvent> {
        if fired.epoch != self.epoch || !self.running {
            trace!(stale = %fired.epoch, current = %self.epoch, "丢弃过期的打字定时器");
            return Vec::new();
        }
        if self.state.complete || self.state.shown >= self.state.total {
            return Vec::new();
        }

        self.state.shown += 1;
        let mut events = vec![TypingEvent::Advanced {
            shown: self.state.shown,
        }];

        if self.state.shown == self.state.total {
            self.state.complete = true;
            self.subscribers.publish(&self.state);
            for callback in &mut self.on_complete {
                callback();
            }
            events.push(TypingEvent::Completed);
        } else {
            timers.schedule(self.speed, self.epoch, TypingTimer.into());
            self.subscribers.publish(&self.state);
        }
        events
    }

    /// 独占队列时的便捷驱动
    pub fn update(&mut self, timers: &mut Timers<TypingTimer>, dt: Duration) -> Vec<TypingEvent> {
        let deadline = timers.now() + dt;
        let mut events = Vec::new();
        while let Some(fired) = timers.pop_until(deadline) {
            events.extend(self.on_timer(fired, timers));
        }
        timers.advance_to(deadline);
        events
    }

    /// 停止：之后不再修改状态，也不会触发完成回调
    pub fn cancel<T: TimerPayload<TypingTimer>>(&mut self, timers: &mut Timers<T>) {
        self.epoch = self.epoch.next();
        self.running = false;
        timers.cancel_where(|_, payload| {
            <T as TimerPayload<TypingTimer>>::route(payload).is_some()
        });
    }

    /// 当前已显示的前缀
    pub fn visible_text(&self) -> &str {
        match self.text.char_indices().nth(self.state.shown) {
            Some((offset, _)) => &self.text[..offset],
            None => &self.text,
        }
    }

    pub fn state(&self) -> TypingState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    /// 订阅快照
    pub fn subscribe(&mut self, callback: impl FnMut(&TypingState) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    /// 注册完成回调
    pub fn on_complete(&mut self, callback: impl FnMut() + 'static) {
        self.on_complete.push(Box::new(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn counter(effect: &mut TypingEffect) -> Rc<RefCell<usize>> {
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        effect.on_complete(move || *c.borrow_mut() += 1);
        count
    }

    #[test]
    fn test_types_ai_at_30ms() {
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let completions = counter(&mut typing);

        typing.start("AI", ms(30), &mut timers);
        assert_eq!(typing.visible_text(), "");

        typing.update(&mut timers, ms(30));
        assert_eq!(typing.visible_text(), "A");
        assert_eq!(*completions.borrow(), 0);

        let events = typing.update(&mut timers, ms(30));
        assert_eq!(typing.visible_text(), "AI");
        assert_eq!(
            events,
            vec![TypingEvent::Advanced { shown: 2 }, TypingEvent::Completed]
        );
        assert_eq!(*completions.borrow(), 1);

        typing.update(&mut timers, ms(1_000));
        assert_eq!(*completions.borrow(), 1);
        assert!(timers.is_idle());
    }

    #[test]
    fn test_shown_passes_every_integer() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let sink = seen.clone();
        typing.subscribe(move |state| sink.borrow_mut().push(state.shown));

        typing.start("土地記録", ms(10), &mut timers);
        typing.update(&mut timers, ms(1_000));

        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3, 4]);
        assert_eq!(typing.visible_text(), "土地記録");
        assert!(typing.is_complete());
    }

    #[test]
    fn test_restart_with_new_text() {
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let completions = counter(&mut typing);

        typing.start("first", ms(10), &mut timers);
        typing.update(&mut timers, ms(25));
        assert_eq!(typing.visible_text(), "fi");

        typing.start("xy", ms(10), &mut timers);
        assert_eq!(typing.state().shown, 0);
        // 旧定时器在 30ms 到期，但已过期
        typing.update(&mut timers, ms(5));
        assert_eq!(typing.visible_text(), "");
        typing.update(&mut timers, ms(5));
        assert_eq!(typing.visible_text(), "x");

        typing.update(&mut timers, ms(1_000));
        assert_eq!(typing.visible_text(), "xy");
        assert_eq!(*completions.borrow(), 1);
    }

    #[test]
    fn test_restart_same_text_is_noop() {
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let epoch = typing.start("abc", ms(10), &mut timers);
        typing.update(&mut timers, ms(10));

        assert_eq!(typing.start("abc", ms(10), &mut timers), epoch);
        assert_eq!(typing.state().shown, 1);

        // 仅修改间隔也会重新开始
        assert!(typing.start("abc", ms(20), &mut timers) > epoch);
        assert_eq!(typing.state().shown, 0);
    }

    #[test]
    fn test_cancel_stops_without_completion() {
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let completions = counter(&mut typing);

        typing.start("abc", ms(10), &mut timers);
        typing.update(&mut timers, ms(10));
        typing.cancel(&mut timers);

        assert!(timers.is_idle());
        assert!(typing.update(&mut timers, ms(1_000)).is_empty());
        assert_eq!(typing.visible_text(), "a");
        assert_eq!(*completions.borrow(), 0);
    }

    #[test]
    fn test_empty_text_never_completes() {
        let mut timers = Timers::new();
        let mut typing = TypingEffect::new();
        let completions = counter(&mut typing);

        typing.start("", ms(10), &mut timers);
        typing.update(&mut timers, ms(1_000));
        assert!(timers.is_idle());
        assert!(!typing.is_complete());
        assert_eq!(*completions.borrow(), 0);
    }
}
