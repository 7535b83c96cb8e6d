//! # Lexi Host
//!
//! `lexi-runtime` 的终端宿主：加载配置、驱动会话时钟、渲染事件。

pub mod config;
pub mod driver;
pub mod view;

pub use config::{AppConfig, ConfigError, ReplayConfig};
pub use driver::{TimedEvent, VirtualDriver, run_realtime};
