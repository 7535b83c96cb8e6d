//! # Lexi Runtime
//!
//! 文档分析结果渐进式展示的核心库。
//!
//! ## 架构概述
//!
//! `lexi-runtime` 是纯逻辑核心，不读取系统时钟，也不做任何 IO。
//! 宿主层（Host）推进虚拟时间，Runtime 返回发生了什么：
//!
//! ```text
//! Host                                   Runtime
//!   │                                       │
//!   │── show_result / type_text / ... ────►│ 调度定时器（带 Epoch）
//!   │                                       │
//!   │── advance(dt) ──────────────────────►│ 触发到期定时器
//!   │◄─── Vec<SessionEvent> ───────────────│
//!   │                                       │
//!   │◄─── 快照回调（subscribe）─────────────│
//! ```
//!
//! ## 核心类型
//!
//! - [`AnalysisResult`]：分析结果（摘要 + 各实体分区）
//! - [`RevealScheduler`]：分区 / 条目的分时揭示
//! - [`TypingEffect`]：逐字符打字效果
//! - [`ProgressSimulator`]：分析进行中的进度模拟
//! - [`AnalysisSession`]：把三者挂到同一个定时器队列上
//!
//! ## 使用示例
//!
//! ```ignore
//! use lexi_runtime::{AnalysisResult, AnalysisSession, TimingConfig};
//!
//! let config = TimingConfig::default();
//! let mut session = AnalysisSession::new(&config);
//! session.show_result(Arc::new(AnalysisResult::from_json_str(body)?));
//!
//! while let Some(due) = session.next_due() {
//!     sleep(due - session.now());
//!     for event in session.advance(due - session.now()) {
//!         view.apply(event);
//!     }
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`timer`]：虚拟时钟、定时器队列与 Epoch
//! - [`observer`]：快照订阅
//! - [`section`] / [`result`]：数据模型与载荷解析
//! - [`reveal`] / [`typing`] / [`progress`]：三个调度组件
//! - [`stream`]：后端进度事件流解码
//! - [`session`]：共享事件循环
//! - [`config`]：节奏配置
//! - [`error`]：错误类型定义

pub mod config;
pub mod error;
pub mod observer;
pub mod progress;
pub mod result;
pub mod reveal;
pub mod section;
pub mod session;
pub mod stream;
pub mod timer;
pub mod typing;

// 重导出核心类型
pub use config::{DEFAULT_STATUS_MESSAGES, TimingConfig};
pub use error::{ConfigError, LexiError, LexiResult, PayloadError};
pub use observer::{SubscriptionId, Subscribers};
pub use progress::{ProgressInput, ProgressSimulator, ProgressState, ProgressTimer, ProgressTiming};
pub use result::{AnalysisEnvelope, AnalysisResult, DocumentMeta};
pub use reveal::{RevealEvent, RevealScheduler, RevealTimer, RevealTiming, VisibilityState};
pub use section::{ItemId, MapValue, SectionKey, SectionShape, SectionValue};
pub use session::{AnalysisSession, SessionEvent, SessionStats, TimerTarget};
pub use stream::{EventStreamDecoder, ProgressEvent, parse_event_line};
pub use timer::{Epoch, Fired, TimerId, TimerPayload, Timers};
pub use typing::{TypingEffect, TypingEvent, TypingState, TypingTimer};
