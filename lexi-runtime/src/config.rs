//! # Config 模块
//!
//! 时序参数。所有字段都有默认值，配置文件中缺省的字段取默认值。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 默认状态消息（按顺序循环）
pub const DEFAULT_STATUS_MESSAGES: [&str; 7] = [
    "Reading document...",
    "Extracting legal entities...",
    "Analyzing ownership details...",
    "Identifying survey numbers...",
    "Checking for encumbrances...",
    "Assessing potential risks...",
    "Generating simplified summary...",
];

/// 时序配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// 相邻 section 的揭示间隔（毫秒）
    #[serde(default = "default_section_stagger_ms")]
    pub section_stagger_ms: u64,

    /// section 内相邻条目的揭示间隔（毫秒）
    #[serde(default = "default_item_stagger_ms")]
    pub item_stagger_ms: u64,

    /// summary 条目的揭示间隔（毫秒）
    #[serde(default = "default_summary_item_stagger_ms")]
    pub summary_item_stagger_ms: u64,

    /// 打字效果每个字符的间隔（毫秒）
    #[serde(default = "default_typing_speed_ms")]
    pub typing_speed_ms: u64,

    /// 状态消息轮换周期（毫秒）
    #[serde(default = "default_message_period_ms")]
    pub message_period_ms: u64,

    /// 进度模拟周期（毫秒）
    #[serde(default = "default_percent_period_ms")]
    pub percent_period_ms: u64,

    /// 模拟进度上限（百分比）
    ///
    /// 最后一段留给后端的权威完成信号。
    #[serde(default = "default_percent_cap")]
    pub percent_cap: f64,

    /// 每次模拟的最大增量（取值区间 `[0, max_increment)`）
    #[serde(default = "default_max_increment")]
    pub max_increment: f64,

    /// 状态消息列表
    #[serde(default = "default_status_messages")]
    pub status_messages: Vec<String>,
}

fn default_section_stagger_ms() -> u64 {
    200
}

fn default_item_stagger_ms() -> u64 {
    100
}

fn default_summary_item_stagger_ms() -> u64 {
    150
}

fn default_typing_speed_ms() -> u64 {
    30
}

fn default_message_period_ms() -> u64 {
    800
}

fn default_percent_period_ms() -> u64 {
    200
}

fn default_percent_cap() -> f64 {
    95.0
}

fn default_max_increment() -> f64 {
    3.0
}

fn default_status_messages() -> Vec<String> {
    DEFAULT_STATUS_MESSAGES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            section_stagger_ms: default_section_stagger_ms(),
            item_stagger_ms: default_item_stagger_ms(),
            summary_item_stagger_ms: default_summary_item_stagger_ms(),
            typing_speed_ms: default_typing_speed_ms(),
            message_period_ms: default_message_period_ms(),
            percent_period_ms: default_percent_period_ms(),
            percent_cap: default_percent_cap(),
            max_increment: default_max_increment(),
            status_messages: default_status_messages(),
        }
    }
}

impl TimingConfig {
    pub fn section_stagger(&self) -> Duration {
        Duration::from_millis(self.section_stagger_ms)
    }

    pub fn item_stagger(&self) -> Duration {
        Duration::from_millis(self.item_stagger_ms)
    }

    pub fn summary_item_stagger(&self) -> Duration {
        Duration::from_millis(self.summary_item_stagger_ms)
    }

    pub fn typing_speed(&self) -> Duration {
        Duration::from_millis(self.typing_speed_ms)
    }

    pub fn message_period(&self) -> Duration {
        Duration::from_millis(self.message_period_ms)
    }

    pub fn percent_period(&self) -> Duration {
        Duration::from_millis(self.percent_period_ms)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.typing_speed_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "typing_speed_ms",
                message: "必须大于 0".to_string(),
            });
        }

        if self.message_period_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "message_period_ms",
                message: "必须大于 0".to_string(),
            });
        }

        if self.percent_period_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "percent_period_ms",
                message: "必须大于 0".to_string(),
            });
        }

        if !(self.percent_cap > 0.0 && self.percent_cap < 100.0) {
            return Err(ConfigError::OutOfRange {
                field: "percent_cap",
                message: format!("必须在 (0, 100) 之间，实际为 {}", self.percent_cap),
            });
        }

        if !(self.max_increment > 0.0 && self.max_increment.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "max_increment",
                message: format!("必须为正数，实际为 {}", self.max_increment),
            });
        }

        if self.status_messages.is_empty() {
            return Err(ConfigError::NoStatusMessages);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TimingConfig::default();
        assert_eq!(config.section_stagger(), Duration::from_millis(200));
        assert_eq!(config.item_stagger(), Duration::from_millis(100));
        assert_eq!(config.summary_item_stagger(), Duration::from_millis(150));
        assert_eq!(config.status_messages.len(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TimingConfig = serde_json::from_str(r#"{"item_stagger_ms": 50}"#).unwrap();
        assert_eq!(config.item_stagger_ms, 50);
        assert_eq!(config.section_stagger_ms, 200);
        assert_eq!(config.percent_cap, 95.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TimingConfig::default();

        config.percent_cap = 100.0;
        assert!(config.validate().is_err());
        config.percent_cap = 95.0;

        config.status_messages.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoStatusMessages));
        config.status_messages.push("Working...".to_string());

        config.percent_period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "percent_period_ms",
                ..
            })
        ));
    }
}
