//! # Driver 模块
//!
//! 推进 [`AnalysisSession`] 的时钟。
//!
//! - [`VirtualDriver`]：按固定步长（或直接跳到下一个定时器）推进虚拟时间，不等待
//! - [`run_realtime`]：在 tokio 单线程运行时上按真实时间等待下一个定时器

use std::time::Duration;

use lexi_runtime::{AnalysisSession, EventStreamDecoder, ProgressEvent, SessionEvent};
use rand::Rng;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// 带时间戳的会话事件
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    /// 事件所在步的虚拟时间
    pub at: Duration,
    pub event: SessionEvent,
}

/// 虚拟时间驱动
#[derive(Debug, Clone, Copy)]
pub struct VirtualDriver {
    /// 步长；为零时直接跳到下一个定时器的触发时刻
    pub tick: Duration,
    /// 最长回放时长（进度模拟活跃时队列永远不会清空）
    pub limit: Duration,
}

impl VirtualDriver {
    pub fn new(tick: Duration, limit: Duration) -> Self {
        Self { tick, limit }
    }

    /// 推进到队列清空或达到时长上限
    pub fn run<R: Rng>(&self, session: &mut AnalysisSession<R>) -> Vec<TimedEvent> {
        let mut timeline = Vec::new();
        while !session.is_idle() && session.now() < self.limit {
            let events = if self.tick.is_zero() {
                match session.next_due() {
                    Some(due) if due <= self.limit => {
                        session.advance(due.saturating_sub(session.now()))
                    }
                    _ => break,
                }
            } else {
                session.advance(self.tick)
            };
            let at = session.now();
            timeline.extend(events.into_iter().map(|event| TimedEvent { at, event }));
        }
        if !session.is_idle() {
            debug!(now_ms = session.now().as_millis() as u64, "达到回放时长上限");
        }
        timeline
    }

    /// 回放进度事件流：每个事件之后推进 `step`
    pub fn run_stream<R: Rng>(
        &self,
        session: &mut AnalysisSession<R>,
        body: &str,
        step: Duration,
    ) -> Vec<TimedEvent> {
        let mut decoder = EventStreamDecoder::new();
        let mut events: Vec<ProgressEvent> = Vec::new();
        for decoded in decoder.feed(body).into_iter().chain(decoder.finish()) {
            match decoded {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "跳过无法解析的进度事件"),
            }
        }

        let mut timeline = Vec::new();
        for event in events {
            let terminal = event.is_terminal();
            let at = session.now();
            timeline.extend(
                session
                    .apply_stream_event(event)
                    .into_iter()
                    .map(|event| TimedEvent { at, event }),
            );
            if terminal {
                break;
            }
            let deadline = session.now() + step;
            while session.now() < deadline {
                let dt = self.step_within(session, deadline);
                let events = session.advance(dt);
                let at = session.now();
                timeline.extend(events.into_iter().map(|event| TimedEvent { at, event }));
            }
        }

        timeline.extend(self.run(session));
        timeline
    }

    fn step_within<R: Rng>(&self, session: &AnalysisSession<R>, deadline: Duration) -> Duration {
        let remaining = deadline.saturating_sub(session.now());
        if self.tick.is_zero() {
            session
                .next_due()
                .map(|due| due.saturating_sub(session.now()).min(remaining))
                .unwrap_or(remaining)
        } else {
            self.tick.min(remaining)
        }
    }
}

/// 按真实时间驱动会话，直到队列清空或达到时长上限
///
/// 每个事件产生时立即交给 `on_event`。会话不是 `Send`，
/// 因此必须在单线程运行时（`block_on` / `current_thread`）上执行。
pub async fn run_realtime<R: Rng>(
    session: &mut AnalysisSession<R>,
    limit: Duration,
    mut on_event: impl FnMut(&TimedEvent),
) -> usize {
    let origin = Instant::now() - session.now();
    let mut emitted = 0;

    while let Some(due) = session.next_due() {
        if due > limit {
            debug!(due_ms = due.as_millis() as u64, "达到回放时长上限");
            break;
        }
        sleep_until(origin + due).await;

        let dt = due.saturating_sub(session.now());
        for event in session.advance(dt) {
            let timed = TimedEvent {
                at: session.now(),
                event,
            };
            on_event(&timed);
            emitted += 1;
        }
    }
    emitted
}
