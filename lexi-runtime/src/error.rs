//! # Error 模块
//!
//! 定义 lexi-runtime 边界处使用的错误类型。
//!
//! 核心调度逻辑本身不产生错误：格式异常的 section 降级为文本，
//! 过期 epoch 的定时器被静默丢弃，空输入视为"无内容"。
//! 只有在解码外部载荷（分析结果、进度流）和校验配置时才会返回错误。

use thiserror::Error;

/// 载荷解码错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// JSON 语法错误
    #[error("无效的 JSON：{message}")]
    InvalidJson { message: String },

    /// 根节点不是对象
    #[error("分析结果必须是 JSON 对象，实际为 {found}")]
    NotAnObject { found: &'static str },

    /// 字段类型不符
    #[error("字段 '{field}' 类型错误：期望 {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    /// 进度流事件格式错误
    #[error("无效的进度事件：{message}")]
    InvalidEvent { message: String },
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: e.to_string(),
        }
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 数值超出允许范围
    #[error("配置项 '{field}' 无效：{message}")]
    OutOfRange { field: &'static str, message: String },

    /// 状态消息列表为空
    #[error("status_messages 不能为空")]
    NoStatusMessages,
}

/// lexi-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexiError {
    /// 载荷错误
    #[error("载荷错误: {0}")]
    Payload(#[from] PayloadError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// Result 类型别名
pub type LexiResult<T> = Result<T, LexiError>;
