//! # Reveal 模块
//!
//! 分析结果的渐进式揭示调度器。
//!
//! ## 时间轴
//!
//! ```text
//! t=0      summary ─┬─ item#0 (0ms)
//!                   ├─ item#1 (150ms)
//!                   └─ ...
//! t=0      entity[0] ─┬─ item#0 (+0ms)
//!                     └─ item#1 (+100ms)
//! t=200ms  entity[1] ── ...
//! t=400ms  entity[2] ── ...
//! ```
//!
//! 实体分区的下标只计入非空分区（按固定顺序），空分区不占位。
//!
//! ## 不变量
//!
//! - 同一结果的生命周期内，`visible_sections` / `visible_items` 只增不减
//! - 每个 `(SectionKey, ItemId)` 至多被调度一次
//! - 新结果通过 epoch 使所有旧定时器失效，旧定时器触发时不修改任何状态
//! - 同一时刻到期的事件按 (分区固定顺序, 条目下标) 触发，分区本身排在其条目之前，
//!   与定时器的插入先后无关

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::TimingConfig;
use crate::observer::{SubscriptionId, Subscribers};
use crate::result::AnalysisResult;
use crate::section::{ItemId, SectionKey};
use crate::timer::{Epoch, Fired, TimerPayload, Timers};

/// 揭示调度器的定时器负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealTimer {
    /// 揭示整个分区
    Section(SectionKey),
    /// 揭示分区内的单个条目
    Item(SectionKey, ItemId),
}

/// 可见性快照
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisibilityState {
    /// 已可见的分区
    pub visible_sections: BTreeSet<SectionKey>,
    /// 已可见的条目
    pub visible_items: BTreeSet<(SectionKey, ItemId)>,
}

impl VisibilityState {
    pub fn is_section_visible(&self, key: SectionKey) -> bool {
        self.visible_sections.contains(&key)
    }

    pub fn is_item_visible(&self, key: SectionKey, item: &ItemId) -> bool {
        self.visible_items.contains(&(key, item.clone()))
    }

    /// 某分区已可见的条目数
    pub fn visible_item_count(&self, key: SectionKey) -> usize {
        self.visible_items.iter().filter(|(k, _)| *k == key).count()
    }

    /// `other` 是否包含本快照的全部内容（单调性检查）
    pub fn is_subset_of(&self, other: &VisibilityState) -> bool {
        self.visible_sections.is_subset(&other.visible_sections)
            && self.visible_items.is_subset(&other.visible_items)
    }
}

/// 揭示事件
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RevealEvent {
    SectionShown(SectionKey),
    ItemShown(SectionKey, ItemId),
}

/// 揭示节奏
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealTiming {
    pub section_stagger: Duration,
    pub item_stagger: Duration,
    pub summary_item_stagger: Duration,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for RevealTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            section_stagger: config.section_stagger(),
            item_stagger: config.item_stagger(),
            summary_item_stagger: config.summary_item_stagger(),
        }
    }
}

/// 揭示调度器
pub struct RevealScheduler {
    timing: RevealTiming,
    epoch: Epoch,
    result: Option<Arc<AnalysisResult>>,
    state: VisibilityState,
    /// 已调度（或已揭示）的分区，防止重复调度
    scheduled_sections: HashSet<SectionKey>,
    /// 已调度（或已揭示）的条目，防止重复调度
    scheduled_items: HashSet<(SectionKey, ItemId)>,
    /// 当前 epoch 尚未触发的定时器数
    outstanding: usize,
    subscribers: Subscribers<VisibilityState>,
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(RevealTiming::default())
    }
}

impl std::fmt::Debug for RevealScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealScheduler")
            .field("epoch", &self.epoch)
            .field("sections", &self.state.visible_sections.len())
            .field("items", &self.state.visible_items.len())
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl RevealScheduler {
    pub fn new(timing: RevealTiming) -> Self {
        Self {
            timing,
            epoch: Epoch::ZERO,
            result: None,
            state: VisibilityState::default(),
            scheduled_sections: HashSet::new(),
            scheduled_items: HashSet::new(),
            outstanding: 0,
            subscribers: Subscribers::new(),
        }
    }

    /// 开始揭示一个结果
    ///
    /// 与当前结果相同（同一 `Arc` 或内容相等）时不做任何事，返回当前 epoch：
    /// 不会重复调度，也不会跳过尚未触发的事件。
    /// 不同的结果会递增 epoch，之前的定时器全部失效。
    pub fn start<T: TimerPayload<RevealTimer>>(
        &mut self,
        result: Arc<AnalysisResult>,
        timers: &mut Timers<T>,
    ) -> Epoch {
        if let Some(current) = &self.result {
            if Arc::ptr_eq(current, &result) || **current == *result {
                trace!(epoch = %self.epoch, "重复 start 同一结果，忽略");
                return self.epoch;
            }
        }

        self.epoch = self.epoch.next();
        self.reset();
        self.result = Some(result.clone());

        if result.summary_present() {
            self.schedule_section(SectionKey::Summary, Duration::ZERO, timers);
        }
        for (index, key) in result.present_entity_sections().into_iter().enumerate() {
            let delay = self.timing.section_stagger * index as u32;
            self.schedule_section(key, delay, timers);
        }

        debug!(
            epoch = %self.epoch,
            scheduled = self.outstanding,
            "开始揭示分析结果"
        );
        self.subscribers.publish(&self.state);
        self.epoch
    }

    /// 处理一个已触发的定时器
    ///
    /// 过期 epoch 的定时器直接丢弃，返回 `None`。
    pub fn on_timer<T: TimerPayload<RevealTimer>>(
        &mut self,
        fired: Fired<RevealTimer>,
        timers: &mut Timers<T>,
    ) -> Option<RevealEvent> {
        if fired.epoch != self.epoch {
            trace!(stale = %fired.epoch, current = %self.epoch, "丢弃过期的揭示定时器");
            return None;
        }
        self.outstanding = self.outstanding.saturating_sub(1);

        let event = match fired.payload {
            RevealTimer::Section(key) => {
                if !self.state.visible_sections.insert(key) {
                    return None;
                }
                self.schedule_items(key, timers);
                RevealEvent::SectionShown(key)
            }
            RevealTimer::Item(key, item) => {
                if !self.state.visible_items.insert((key, item.clone())) {
                    return None;
                }
                RevealEvent::ItemShown(key, item)
            }
        };

        self.subscribers.publish(&self.state);
        Some(event)
    }

    /// 独占队列时的便捷驱动：推进 `dt` 并处理期间到期的全部定时器
    pub fn update(&mut self, timers: &mut Timers<RevealTimer>, dt: Duration) -> Vec<RevealEvent> {
        let deadline = timers.now() + dt;
        let mut events = Vec::new();
        while let Some(fired) = timers.pop_until(deadline) {
            events.extend(self.on_timer(fired, timers));
        }
        timers.advance_to(deadline);
        events
    }

    /// 清空（结果变为空）：使定时器失效并移除，状态归零
    pub fn clear<T: TimerPayload<RevealTimer>>(&mut self, timers: &mut Timers<T>) {
        self.cancel(timers);
        self.reset();
        self.subscribers.publish(&self.state);
    }

    /// 销毁前调用：停止所有定时器，之后不再修改状态
    pub fn cancel<T: TimerPayload<RevealTimer>>(&mut self, timers: &mut Timers<T>) {
        self.epoch = self.epoch.next();
        self.result = None;
        self.outstanding = 0;
        let removed = timers.cancel_where(|_, payload| {
            <T as TimerPayload<RevealTimer>>::route(payload).is_some()
        });
        debug!(removed, "揭示调度已取消");
    }

    /// 当前快照
    pub fn state(&self) -> &VisibilityState {
        &self.state
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// 当前结果
    pub fn result(&self) -> Option<&Arc<AnalysisResult>> {
        self.result.as_ref()
    }

    /// 当前 epoch 是否已没有待揭示的内容
    pub fn is_settled(&self) -> bool {
        self.outstanding == 0
    }

    /// 订阅快照
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&VisibilityState) + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn reset(&mut self) {
        self.state = VisibilityState::default();
        self.scheduled_sections.clear();
        self.scheduled_items.clear();
        self.outstanding = 0;
    }

    fn schedule_section<T: TimerPayload<RevealTimer>>(
        &mut self,
        key: SectionKey,
        delay: Duration,
        timers: &mut Timers<T>,
    ) {
        if self.state.is_section_visible(key) || !self.scheduled_sections.insert(key) {
            return;
        }
        timers.schedule_ranked(
            delay,
            self.epoch,
            tie_rank(key, None),
            RevealTimer::Section(key).into(),
        );
        self.outstanding += 1;
    }

    fn schedule_items<T: TimerPayload<RevealTimer>>(
        &mut self,
        key: SectionKey,
        timers: &mut Timers<T>,
    ) {
        let Some(result) = self.result.clone() else {
            return;
        };
        let stagger = if key == SectionKey::Summary {
            self.timing.summary_item_stagger
        } else {
            self.timing.item_stagger
        };

        for (index, item) in result.item_ids(key).into_iter().enumerate() {
            let slot = (key, item);
            if self.state.visible_items.contains(&slot)
                || !self.scheduled_items.insert(slot.clone())
            {
                continue;
            }
            let (key, item) = slot;
            timers.schedule_ranked(
                stagger * index as u32,
                self.epoch,
                tie_rank(key, Some(index)),
                RevealTimer::Item(key, item).into(),
            );
            self.outstanding += 1;
        }
    }
}

/// 同刻排序键：高 32 位为分区顺序，低 32 位中分区为 0，条目为下标 + 1
fn tie_rank(key: SectionKey, item_index: Option<usize>) -> u64 {
    let slot = item_index.map_or(0, |index| index as u64 + 1);
    ((key.rank() as u64) << 32) | slot.min(u32::MAX as u64)
}
