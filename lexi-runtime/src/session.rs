//! # Session 模块
//!
//! 把三个调度组件挂到同一个定时器队列上，由宿主按时间推进。
//!
//! ```text
//!   宿主 ──advance(dt)──▶ Timers<TimerTarget> ──pop_until──▶ dispatch
//!                                                             │
//!                    ┌───────────────┬────────────────────────┤
//!                    ▼               ▼                        ▼
//!             RevealScheduler   TypingEffect          ProgressSimulator
//!                    │               │                        │
//!                    └───────────────┴──── Vec<SessionEvent> ◀┘
//! ```
//!
//! 所有回调都在调用 `advance` 的线程上同步执行，没有锁。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, trace, warn};

use crate::config::TimingConfig;
use crate::observer::SubscriptionId;
use crate::progress::{
    ProgressInput, ProgressSimulator, ProgressState, ProgressTimer, ProgressTiming,
};
use crate::result::AnalysisResult;
use crate::reveal::{RevealEvent, RevealScheduler, RevealTimer, RevealTiming, VisibilityState};
use crate::stream::ProgressEvent;
use crate::timer::{Epoch, Fired, TimerPayload, Timers};
use crate::typing::{TypingEffect, TypingEvent, TypingState, TypingTimer};

/// 共享队列中的定时器负载
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTarget {
    Reveal(RevealTimer),
    Typing(TypingTimer),
    Progress(ProgressTimer),
}

impl From<RevealTimer> for TimerTarget {
    fn from(timer: RevealTimer) -> Self {
        TimerTarget::Reveal(timer)
    }
}

impl From<TypingTimer> for TimerTarget {
    fn from(timer: TypingTimer) -> Self {
        TimerTarget::Typing(timer)
    }
}

impl From<ProgressTimer> for TimerTarget {
    fn from(timer: ProgressTimer) -> Self {
        TimerTarget::Progress(timer)
    }
}

impl TimerPayload<RevealTimer> for TimerTarget {
    fn route(&self) -> Option<&RevealTimer> {
        match self {
            TimerTarget::Reveal(timer) => Some(timer),
            _ => None,
        }
    }
}

impl TimerPayload<TypingTimer> for TimerTarget {
    fn route(&self) -> Option<&TypingTimer> {
        match self {
            TimerTarget::Typing(timer) => Some(timer),
            _ => None,
        }
    }
}

impl TimerPayload<ProgressTimer> for TimerTarget {
    fn route(&self) -> Option<&ProgressTimer> {
        match self {
            TimerTarget::Progress(timer) => Some(timer),
            _ => None,
        }
    }
}

/// 会话推进过程中产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 揭示进展
    Reveal(RevealEvent),
    /// 打字效果前进到 `shown` 个字符
    Typed { shown: usize },
    /// 打字效果完成
    TypingComplete,
    /// 进度快照变化
    Progress(ProgressState),
    /// 后端报告分析失败
    AnalysisFailed { message: String },
}

/// 定时器统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// 已弹出的定时器总数
    pub fired: u64,
    /// 其中因 epoch 过期而被丢弃的数量
    pub stale: u64,
}

/// 一次文档分析的展示会话
pub struct AnalysisSession<R = StdRng> {
    timers: Timers<TimerTarget>,
    reveal: RevealScheduler,
    typing: TypingEffect,
    progress: ProgressSimulator<R>,
    stats: SessionStats,
    closed: bool,
}

impl<R> std::fmt::Debug for AnalysisSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("timers", &self.timers)
            .field("reveal", &self.reveal)
            .field("typing", &self.typing)
            .field("stats", &self.stats)
            .field("closed", &self.closed)
            .finish()
    }
}

impl AnalysisSession<StdRng> {
    pub fn new(timing: &TimingConfig) -> Self {
        Self::from_parts(
            RevealScheduler::new(RevealTiming::from(timing)),
            ProgressSimulator::new(ProgressTiming::from(timing)),
        )
    }
}

impl<R: Rng> AnalysisSession<R> {
    /// 使用指定的随机源（测试中传入固定种子）
    pub fn with_rng(timing: &TimingConfig, rng: R) -> Self {
        Self::from_parts(
            RevealScheduler::new(RevealTiming::from(timing)),
            ProgressSimulator::with_rng(ProgressTiming::from(timing), rng),
        )
    }

    fn from_parts(reveal: RevealScheduler, progress: ProgressSimulator<R>) -> Self {
        Self {
            timers: Timers::new(),
            reveal,
            typing: TypingEffect::new(),
            progress,
            stats: SessionStats::default(),
            closed: false,
        }
    }

    /// 开始揭示结果（同一结果重复调用无效果）
    pub fn show_result(&mut self, result: Arc<AnalysisResult>) -> Epoch {
        if self.closed {
            warn!("会话已关闭，忽略 show_result");
            return self.reveal.epoch();
        }
        self.reveal.start(result, &mut self.timers)
    }

    /// 结果变为空
    pub fn clear_result(&mut self) {
        if self.closed {
            return;
        }
        self.reveal.clear(&mut self.timers);
    }

    /// 开始打字效果
    pub fn type_text(&mut self, text: impl Into<String>, speed: Duration) -> Epoch {
        if self.closed {
            warn!("会话已关闭，忽略 type_text");
            return self.typing.epoch();
        }
        self.typing.start(text, speed, &mut self.timers)
    }

    /// 同步进度输入
    pub fn set_progress(&mut self, input: ProgressInput) -> ProgressState {
        if self.closed {
            return self.progress.state().clone();
        }
        self.progress.tick(input, &mut self.timers)
    }

    /// 应用后端进度流中的一个事件
    ///
    /// 中间步骤覆盖进度与消息；完成时停止进度并开始揭示结果；失败时停止进度。
    pub fn apply_stream_event(&mut self, event: ProgressEvent) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let state = self.set_progress(event.as_input());
        events.push(SessionEvent::Progress(state));

        match event {
            ProgressEvent::Step { step, .. } => {
                debug!(step = %step, "分析进度");
            }
            ProgressEvent::Complete(result) => {
                debug!(sections = result.present_entity_sections().len(), "分析完成");
                self.show_result(Arc::new(result));
            }
            ProgressEvent::Failed { message } => {
                warn!(message = %message, "分析失败");
                events.push(SessionEvent::AnalysisFailed { message });
            }
        }
        events
    }

    /// 推进虚拟时钟 `dt`，按 `(due, rank, 插入顺序)` 处理期间到期的全部定时器
    pub fn advance(&mut self, dt: Duration) -> Vec<SessionEvent> {
        let deadline = self.timers.now() + dt;
        let mut events = Vec::new();
        while let Some(fired) = self.timers.pop_until(deadline) {
            self.stats.fired += 1;
            self.dispatch(fired, &mut events);
        }
        self.timers.advance_to(deadline);
        events
    }

    /// 推进到下一个定时器的触发时刻；没有待触发定时器时返回 `None`
    pub fn advance_to_next(&mut self) -> Option<Vec<SessionEvent>> {
        let due = self.timers.next_due()?;
        let dt = due.saturating_sub(self.timers.now());
        Some(self.advance(dt))
    }

    fn dispatch(&mut self, fired: Fired<TimerTarget>, events: &mut Vec<SessionEvent>) {
        let Fired {
            id,
            due,
            epoch,
            payload,
        } = fired;
        let current = match &payload {
            TimerTarget::Reveal(_) => self.reveal.epoch(),
            TimerTarget::Typing(_) => self.typing.epoch(),
            TimerTarget::Progress(_) => self.progress.epoch(),
        };
        if epoch != current {
            self.stats.stale += 1;
            trace!(?payload, stale = %epoch, current = %current, "丢弃过期定时器");
            return;
        }

        match payload {
            TimerTarget::Reveal(timer) => {
                let fired = Fired {
                    id,
                    due,
                    epoch,
                    payload: timer,
                };
                events.extend(
                    self.reveal
                        .on_timer(fired, &mut self.timers)
                        .map(SessionEvent::Reveal),
                );
            }
            TimerTarget::Typing(timer) => {
                let fired = Fired {
                    id,
                    due,
                    epoch,
                    payload: timer,
                };
                for event in self.typing.on_timer(fired, &mut self.timers) {
                    events.push(match event {
                        TypingEvent::Advanced { shown } => SessionEvent::Typed { shown },
                        TypingEvent::Completed => SessionEvent::TypingComplete,
                    });
                }
            }
            TimerTarget::Progress(timer) => {
                let fired = Fired {
                    id,
                    due,
                    epoch,
                    payload: timer,
                };
                events.extend(
                    self.progress
                        .on_timer(fired, &mut self.timers)
                        .map(SessionEvent::Progress),
                );
            }
        }
    }

    /// 停止全部组件，移除所有定时器；之后会话不再修改任何状态
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.reveal.cancel(&mut self.timers);
        self.typing.cancel(&mut self.timers);
        self.progress.cancel(&mut self.timers);
        self.closed = true;
        debug!(
            fired = self.stats.fired,
            stale = self.stats.stale,
            "会话已关闭"
        );
    }

    /// 当前虚拟时间
    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// 下一个定时器的触发时刻
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.next_due()
    }

    /// 是否没有待触发的定时器
    pub fn is_idle(&self) -> bool {
        self.timers.is_idle()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn visibility(&self) -> &VisibilityState {
        self.reveal.state()
    }

    pub fn typing_state(&self) -> TypingState {
        self.typing.state()
    }

    pub fn visible_text(&self) -> &str {
        self.typing.visible_text()
    }

    pub fn progress_state(&self) -> &ProgressState {
        self.progress.state()
    }

    pub fn reveal(&self) -> &RevealScheduler {
        &self.reveal
    }

    pub fn typing(&self) -> &TypingEffect {
        &self.typing
    }

    pub fn progress(&self) -> &ProgressSimulator<R> {
        &self.progress
    }

    pub fn subscribe_visibility(
        &mut self,
        callback: impl FnMut(&VisibilityState) + 'static,
    ) -> SubscriptionId {
        self.reveal.subscribe(callback)
    }

    pub fn subscribe_typing(
        &mut self,
        callback: impl FnMut(&TypingState) + 'static,
    ) -> SubscriptionId {
        self.typing.subscribe(callback)
    }

    pub fn subscribe_progress(
        &mut self,
        callback: impl FnMut(&ProgressState) + 'static,
    ) -> SubscriptionId {
        self.progress.subscribe(callback)
    }

    pub fn on_typing_complete(&mut self, callback: impl FnMut() + 'static) {
        self.typing.on_complete(callback);
    }
}
