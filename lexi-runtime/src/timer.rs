//! # Timer 模块
//!
//! 单线程虚拟时钟与定时器队列，是三个调度组件共享的唯一"时钟服务"。
//!
//! ## 设计说明
//!
//! - 时间由宿主推进（`advance_to` / `pop_until`），队列本身不读取系统时钟
//! - 每个定时器携带创建时的 [`Epoch`]，由所属组件在触发时校验
//! - 触发顺序为 `(due, rank, 插入序号)`：同一时刻的定时器先按调用方给出的
//!   `rank` 排序，`rank` 相同时按插入顺序触发。`schedule` 的 `rank` 为 0

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

/// 调度世代
///
/// 每次 `start()` 类调用都会生成一个新的 epoch，
/// 旧 epoch 的定时器在触发时被视为过期并丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(u64);

impl Epoch {
    /// 初始世代（尚未开始任何调度）
    pub const ZERO: Epoch = Epoch(0);

    /// 下一个世代
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

/// 定时器 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 已触发的定时器
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<T> {
    /// 定时器 ID
    pub id: TimerId,
    /// 计划触发时刻（虚拟时钟）
    pub due: Duration,
    /// 创建时的世代
    pub epoch: Epoch,
    /// 负载
    pub payload: T,
}

impl<T> Fired<T> {
    /// 转换负载类型（共享队列按组件分发时使用）
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fired<U> {
        Fired {
            id: self.id,
            due: self.due,
            epoch: self.epoch,
            payload: f(self.payload),
        }
    }
}

/// 可归属到某个组件的定时器负载
///
/// 组件对任意满足 `TimerPayload<自身负载>` 的队列调度，
/// 因此既可以独占一个 `Timers<P>`，也可以与其他组件共享同一个队列。
pub trait TimerPayload<P>: From<P> {
    /// 若该负载属于组件 `P`，返回其引用
    fn route(&self) -> Option<&P>;
}

impl<P> TimerPayload<P> for P {
    fn route(&self) -> Option<&P> {
        Some(self)
    }
}

struct Entry<T> {
    due: Duration,
    rank: u64,
    seq: u64,
    epoch: Epoch,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.rank == other.rank && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.rank.cmp(&other.rank))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// 定时器队列
pub struct Timers<T> {
    /// 当前虚拟时间
    now: Duration,
    /// 最小堆（按 due, rank, seq 排序）
    queue: BinaryHeap<Reverse<Entry<T>>>,
    /// 下一个插入序号（同时作为 TimerId）
    next_seq: u64,
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Timers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timers")
            .field("now", &self.now)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl<T> Timers<T> {
    /// 创建空队列，时钟从 0 开始
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// 当前虚拟时间
    pub fn now(&self) -> Duration {
        self.now
    }

    /// 在 `delay` 之后触发一次
    pub fn schedule(&mut self, delay: Duration, epoch: Epoch, payload: T) -> TimerId {
        self.schedule_ranked(delay, epoch, 0, payload)
    }

    /// 在 `delay` 之后触发一次，同一时刻的定时器按 `rank` 从小到大触发
    ///
    /// 稍后插入但 `rank` 更小的定时器会排在已排队的同刻定时器之前。
    pub fn schedule_ranked(
        &mut self,
        delay: Duration,
        epoch: Epoch,
        rank: u64,
        payload: T,
    ) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry {
            due: self.now + delay,
            rank,
            seq,
            epoch,
            payload,
        }));
        TimerId(seq)
    }

    /// 取消单个定时器
    ///
    /// 返回是否找到并移除。
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|Reverse(entry)| entry.seq != id.0);
        self.queue.len() != before
    }

    /// 批量取消满足条件的定时器，返回移除数量
    pub fn cancel_where(&mut self, mut pred: impl FnMut(Epoch, &T) -> bool) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|Reverse(entry)| !pred(entry.epoch, &entry.payload));
        before - self.queue.len()
    }

    /// 下一个定时器的触发时刻
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(entry)| entry.due)
    }

    /// 弹出下一个 `due <= deadline` 的定时器，并把时钟推进到它的触发时刻
    ///
    /// 触发回调中以零延迟新建的定时器会在同一轮中被弹出，
    /// 相对延迟始终以触发时刻为基准，而不是以 `deadline` 为基准。
    pub fn pop_until(&mut self, deadline: Duration) -> Option<Fired<T>> {
        let due = self.next_due()?;
        if due > deadline {
            return None;
        }
        let Reverse(entry) = self.queue.pop()?;
        if entry.due > self.now {
            self.now = entry.due;
        }
        Some(Fired {
            id: TimerId(entry.seq),
            due: entry.due,
            epoch: entry.epoch,
            payload: entry.payload,
        })
    }

    /// 弹出当前时刻已到期的定时器
    pub fn pop_due(&mut self) -> Option<Fired<T>> {
        self.pop_until(self.now)
    }

    /// 把时钟推进到 `deadline`（不会倒退）
    pub fn advance_to(&mut self, deadline: Duration) {
        if deadline > self.now {
            self.now = deadline;
        }
    }

    /// 把时钟推进 `dt`
    pub fn advance(&mut self, dt: Duration) {
        self.advance_to(self.now + dt);
    }

    /// 待触发的定时器数量
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 是否没有待触发的定时器
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}
