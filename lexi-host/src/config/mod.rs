//! # Config 模块
//!
//! 宿主配置管理，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (config.json)
//! 3. 默认值（最低）

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use lexi_runtime::TimingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, info, warn};

/// 应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 揭示 / 打字 / 进度的节奏
    #[serde(default)]
    pub timing: TimingConfig,

    /// 日志级别（trace / debug / info / warn / error）
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 回放配置
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// 回放配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// 虚拟驱动的步长（毫秒），0 表示直接跳到下一个定时器
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// 是否按真实时间回放
    #[serde(default)]
    pub realtime: bool,

    /// 进度流回放时相邻事件的间隔（毫秒）
    #[serde(default = "default_stream_step_ms")]
    pub stream_step_ms: u64,

    /// 单次回放的最长虚拟时长（毫秒）
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            realtime: false,
            stream_step_ms: default_stream_step_ms(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_ms() -> u64 {
    16
}

fn default_stream_step_ms() -> u64 {
    1_000
}

fn default_max_duration_ms() -> u64 {
    60_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            log_level: default_log_level(),
            replay: ReplayConfig::default(),
        }
    }
}

impl ReplayConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn stream_step(&self) -> Duration {
        Duration::from_millis(self.stream_step_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl AppConfig {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

        fs::write(path, json).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// 解析后的日志级别
    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.log_level.trim()).map_err(|_| {
            ConfigError::ValidationFailed(format!("未知的日志级别: {}", self.log_level))
        })
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.log_level()?;

        if self.replay.max_duration_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "replay.max_duration_ms 必须大于 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 序列化失败
    #[error("配置序列化失败: {0}")]
    SerializationFailed(String),
    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    IoError(String),
    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
    /// 节奏配置无效
    #[error(transparent)]
    Timing(#[from] lexi_runtime::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.timing.section_stagger_ms, 200);
        assert_eq!(config.replay.tick_ms, 16);
        assert_eq!(config.log_level().unwrap(), Level::INFO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"timing": {"typing_speed_ms": 10}, "replay": {"realtime": true}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timing.typing_speed_ms, 10);
        assert_eq!(config.timing.item_stagger_ms, 100);
        assert!(config.replay.realtime);
        assert_eq!(config.replay.stream_step_ms, 1_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));

        config.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.timing.status_messages.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Timing(_))));
    }
}
