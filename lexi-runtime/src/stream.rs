//! # Stream 模块
//!
//! 解码分析后端的进度事件流（server-sent events，`data: {json}` 逐行）。
//!
//! ```text
//! data: {"step": "reading", "message": "Reading document...", "progress": 10}
//! data: {"step": "complete", "result": {...}}
//! data: {"step": "error", "message": "..."}
//! ```

use serde_json::Value;

use crate::error::PayloadError;
use crate::progress::ProgressInput;
use crate::result::AnalysisResult;

/// 进度流中的单个事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// 中间步骤
    Step {
        step: String,
        message: String,
        progress: f64,
    },
    /// 分析完成
    Complete(AnalysisResult),
    /// 分析失败
    Failed { message: String },
}

impl ProgressEvent {
    /// 转换为进度模拟器的权威输入
    pub fn as_input(&self) -> ProgressInput {
        match self {
            ProgressEvent::Step {
                message, progress, ..
            } => ProgressInput::active()
                .with_percent(*progress)
                .with_message(message.clone()),
            ProgressEvent::Complete(_) | ProgressEvent::Failed { .. } => ProgressInput::inactive(),
        }
    }

    /// 是否为终止事件
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Step { .. })
    }
}

/// 解析一行事件
///
/// 空行、注释行（`:` 开头）和非 `data:` 字段返回 `Ok(None)`。
pub fn parse_event_line(line: &str) -> Result<Option<ProgressEvent>, PayloadError> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(data)?;
    let object = value.as_object().ok_or_else(|| PayloadError::InvalidEvent {
        message: "事件必须是 JSON 对象".to_string(),
    })?;
    let step = object
        .get("step")
        .and_then(Value::as_str)
        .ok_or_else(|| PayloadError::InvalidEvent {
            message: "缺少 step 字段".to_string(),
        })?;
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let event = match step {
        "complete" => {
            let result = object.get("result").ok_or_else(|| PayloadError::InvalidEvent {
                message: "complete 事件缺少 result 字段".to_string(),
            })?;
            ProgressEvent::Complete(AnalysisResult::from_json_value(result)?)
        }
        "error" => ProgressEvent::Failed { message },
        other => ProgressEvent::Step {
            step: other.to_string(),
            message,
            progress: object
                .get("progress")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
        },
    };
    Ok(Some(event))
}

/// 增量解码器
///
/// 网络分块可能在任意位置切断，只有遇到换行的完整行才会被解析。
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: String,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入一个分块，返回其中完整行解析出的事件
    pub fn feed(&mut self, chunk: &str) -> Vec<Result<ProgressEvent, PayloadError>> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_event_line(line.trim_end_matches('\n')).transpose() {
                events.push(event);
            }
        }
        events
    }

    /// 流结束，解析缓冲区中剩余的最后一行
    pub fn finish(mut self) -> Option<Result<ProgressEvent, PayloadError>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_event_line(&rest).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionKey;

    #[test]
    fn test_parse_step() {
        let event = parse_event_line(
            r#"data: {"step": "reading", "message": "Reading document...", "progress": 10}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Step {
                step: "reading".to_string(),
                message: "Reading document...".to_string(),
                progress: 10.0,
            }
        );
        assert!(!event.is_terminal());
        let input = event.as_input();
        assert!(input.active);
        assert_eq!(input.external_percent, Some(10.0));
    }

    #[test]
    fn test_parse_complete_and_error() {
        let line = r#"data: {"step": "complete", "result": {"simplified_summary": ["ok"], "legal_entities": {"risks": ["r"]}}}"#;
        match parse_event_line(line).unwrap().unwrap() {
            ProgressEvent::Complete(result) => {
                assert!(result.is_present(SectionKey::Risks));
            }
            other => panic!("unexpected {other:?}"),
        }

        let event = parse_event_line(r#"data: {"step": "error", "message": "timeout"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Failed {
                message: "timeout".to_string()
            }
        );
        assert!(!event.as_input().active);
    }

    #[test]
    fn test_ignores_non_data_lines() {
        assert_eq!(parse_event_line(""), Ok(None));
        assert_eq!(parse_event_line(": keep-alive"), Ok(None));
        assert_eq!(parse_event_line("event: progress"), Ok(None));
    }

    #[test]
    fn test_rejects_malformed_events() {
        assert!(parse_event_line("data: [1]").is_err());
        assert!(parse_event_line(r#"data: {"message": "no step"}"#).is_err());
        assert!(parse_event_line(r#"data: {"step": "complete"}"#).is_err());
        assert!(parse_event_line("data: {oops").is_err());
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed("data: {\"step\": \"reading\", ").is_empty());
        let events = decoder.feed("\"progress\": 10}\n\ndata: {\"step\": \"ext");
        assert_eq!(events.len(), 1);

        let events = decoder.feed("racting\", \"progress\": 25}\r\n");
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(ProgressEvent::Step { step, progress, .. }) => {
                assert_eq!(step, "extracting");
                assert_eq!(*progress, 25.0);
            }
            other => panic!("unexpected {other:?}"),
        }

        decoder.feed("data: {\"step\": \"error\"}");
        assert!(matches!(
            decoder.finish(),
            Some(Ok(ProgressEvent::Failed { .. }))
        ));
    }
}
