//! # View 模块
//!
//! 把会话事件与快照渲染成终端文本。

use lexi_runtime::{
    AnalysisResult, ItemId, MapValue, ProgressState, RevealEvent, SectionKey, SectionValue,
    SessionEvent, VisibilityState,
};

use crate::driver::TimedEvent;

/// 进度条宽度（字符）
const BAR_WIDTH: usize = 20;

/// 单行事件描述
pub fn describe_event(result: Option<&AnalysisResult>, timed: &TimedEvent) -> String {
    let at = timed.at.as_millis();
    let body = match &timed.event {
        SessionEvent::Reveal(RevealEvent::SectionShown(key)) => {
            format!("▸ {}", section_title(*key))
        }
        SessionEvent::Reveal(RevealEvent::ItemShown(key, item)) => {
            let text = result
                .and_then(|r| item_text(r, *key, item))
                .unwrap_or_else(|| item.to_string());
            format!("  · {text}")
        }
        SessionEvent::Typed { shown } => format!("typed {shown}"),
        SessionEvent::TypingComplete => "typing complete".to_string(),
        SessionEvent::Progress(state) => render_progress(state),
        SessionEvent::AnalysisFailed { message } => format!("✗ 分析失败: {message}"),
    };
    format!("[{at:>6}ms] {body}")
}

/// 进度条
pub fn render_progress(state: &ProgressState) -> String {
    let filled = ((state.percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!(
        "[{}{}] {:>3.0}% {}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        state.percent,
        state.message
    )
}

/// 当前可见内容的完整渲染
pub fn render_visible(result: &AnalysisResult, visibility: &VisibilityState) -> String {
    let mut lines = Vec::new();
    for key in SectionKey::ALL {
        if !visibility.is_section_visible(key) {
            continue;
        }
        lines.push(section_title(key).to_string());
        for item in result.item_ids(key) {
            if visibility.is_item_visible(key, &item)
                && let Some(text) = item_text(result, key, &item)
            {
                lines.push(format!("  · {text}"));
            }
        }
    }
    lines.join("\n")
}

pub fn section_title(key: SectionKey) -> &'static str {
    match key {
        SectionKey::Summary => "Summary",
        SectionKey::SurveyNumbers => "Survey Numbers",
        SectionKey::Ownership => "Ownership",
        SectionKey::LandExtents => "Land Extents",
        SectionKey::Encumbrances => "Encumbrances",
        SectionKey::Risks => "Risks",
        SectionKey::MissingData => "Missing Data",
        SectionKey::NotableClauses => "Notable Clauses",
    }
}

fn item_text(result: &AnalysisResult, key: SectionKey, item: &ItemId) -> Option<String> {
    if key == SectionKey::Summary {
        return match item {
            ItemId::Index(i) => result.summary.get(*i).cloned(),
            ItemId::Key(_) => None,
        };
    }
    match (result.section(key)?, item) {
        (SectionValue::List(items), ItemId::Index(i)) => items.get(*i).cloned(),
        (SectionValue::Text(text), ItemId::Index(0)) => Some(text.clone()),
        (SectionValue::Map(entries), ItemId::Key(name)) => {
            entries.iter().find(|(k, _)| k == name).map(|(k, v)| match v {
                MapValue::Text(text) => format!("{k}: {text}"),
                MapValue::List(items) => format!("{k}: {}", items.join(", ")),
            })
        }
        _ => None,
    }
}
