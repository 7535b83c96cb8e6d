//! # Result 模块
//!
//! 分析结果数据模型，以及外部载荷的边界转换。
//!
//! 后端返回的结构（`simplified_summary` + `legal_entities`）和扁平结构
//! （`summary` + `entities`）都在这里一次性转换为 [`AnalysisResult`]，
//! 之后的调度逻辑只面对强类型的 [`SectionValue`]。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PayloadError;
use crate::section::{
    ItemId, MapValue, SectionKey, SectionValue, coerce_list, json_kind, raw_text,
};

/// 一次分析的结果（接收后不可变）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 通俗摘要要点
    pub summary: Vec<String>,
    /// 实体分区（不含 summary）
    pub entities: BTreeMap<SectionKey, SectionValue>,
}

/// 文档元数据（后端响应中可选携带）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub document_id: Option<String>,
    pub processed_at: Option<String>,
}

/// 结果与元数据
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisEnvelope {
    pub meta: DocumentMeta,
    pub result: AnalysisResult,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置摘要（构建器）
    pub fn with_summary<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.summary = items.into_iter().map(Into::into).collect();
        self
    }

    /// 设置实体分区（构建器）
    ///
    /// `SectionKey::Summary` 会写入 `summary` 字段：列表原样保留，文本作为单条要点。
    pub fn with_section(mut self, key: SectionKey, value: SectionValue) -> Self {
        if key == SectionKey::Summary {
            self.summary = match value {
                SectionValue::List(items) => items,
                SectionValue::Text(text) => vec![text],
                SectionValue::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| match v {
                        MapValue::Text(text) => format!("{k}: {text}"),
                        MapValue::List(items) => format!("{k}: {}", items.join(", ")),
                    })
                    .collect(),
            };
        } else {
            self.entities.insert(key, value);
        }
        self
    }

    /// 获取实体分区
    pub fn section(&self, key: SectionKey) -> Option<&SectionValue> {
        self.entities.get(&key)
    }

    /// 分区是否存在且非空
    pub fn is_present(&self, key: SectionKey) -> bool {
        !self.item_ids(key).is_empty()
    }

    /// 分区内的条目，顺序即错开顺序
    pub fn item_ids(&self, key: SectionKey) -> Vec<ItemId> {
        match key {
            SectionKey::Summary => (0..self.summary.len()).map(ItemId::Index).collect(),
            _ => self
                .entities
                .get(&key)
                .map(SectionValue::item_ids)
                .unwrap_or_default(),
        }
    }

    /// 摘要是否非空
    pub fn summary_present(&self) -> bool {
        self.is_present(SectionKey::Summary)
    }

    /// 非空的实体分区，按固定顺序
    pub fn present_entity_sections(&self) -> Vec<SectionKey> {
        SectionKey::ENTITIES
            .into_iter()
            .filter(|key| self.is_present(*key))
            .collect()
    }

    /// 是否没有任何可展示的内容
    pub fn is_empty(&self) -> bool {
        SectionKey::ALL.iter().all(|key| !self.is_present(*key))
    }

    /// 从 JSON 值转换
    pub fn from_json_value(value: &Value) -> Result<Self, PayloadError> {
        AnalysisEnvelope::from_json_value(value).map(|envelope| envelope.result)
    }

    /// 从 JSON 文本转换
    pub fn from_json_str(text: &str) -> Result<Self, PayloadError> {
        AnalysisEnvelope::from_json_str(text).map(|envelope| envelope.result)
    }

    /// 从模型原始输出转换
    ///
    /// 模型有时会把 JSON 包在 Markdown 代码块里，这里先剥掉首尾的 ```` ``` ```` 围栏。
    pub fn from_model_text(text: &str) -> Result<Self, PayloadError> {
        Self::from_json_str(strip_code_fence(text))
    }
}

impl AnalysisEnvelope {
    /// 从 JSON 值转换
    pub fn from_json_value(value: &Value) -> Result<Self, PayloadError> {
        let root = value.as_object().ok_or(PayloadError::NotAnObject {
            found: json_kind(value),
        })?;

        let result = if root.contains_key("legal_entities")
            || root.contains_key("simplified_summary")
        {
            AnalysisResult {
                summary: coerce_summary(root.get("simplified_summary")),
                entities: coerce_entities(root.get("legal_entities"), "legal_entities")?,
            }
        } else if root.contains_key("entities") {
            AnalysisResult {
                summary: coerce_summary(root.get("summary")),
                entities: coerce_entities(root.get("entities"), "entities")?,
            }
        } else {
            // 扁平结构：分区直接位于根节点
            AnalysisResult {
                summary: coerce_summary(root.get("summary")),
                entities: entities_from_map(root),
            }
        };

        let meta = DocumentMeta {
            document_id: root
                .get("document_id")
                .or_else(|| root.get("_id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            processed_at: root
                .get("processed_at")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        Ok(Self { meta, result })
    }

    /// 从 JSON 文本转换
    pub fn from_json_str(text: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json_value(&value)
    }
}

fn coerce_summary(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => coerce_list(items),
        Some(other) => {
            debug!(found = json_kind(other), "summary 形状不符，降级为单条文本");
            let text = raw_text(other);
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    }
}

fn coerce_entities(
    value: Option<&Value>,
    field: &str,
) -> Result<BTreeMap<SectionKey, SectionValue>, PayloadError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(entities_from_map(map)),
        Some(_) => Err(PayloadError::InvalidField {
            field: field.to_string(),
            expected: "object",
        }),
    }
}

fn entities_from_map(map: &Map<String, Value>) -> BTreeMap<SectionKey, SectionValue> {
    let mut entities = BTreeMap::new();
    for (name, value) in map {
        match SectionKey::from_wire(name) {
            Some(SectionKey::Summary) => {}
            Some(key) => {
                if let Some(section) = SectionValue::from_json(key, value) {
                    entities.insert(key, section);
                }
            }
            None => {
                // 扁平结构中的元数据字段也会走到这里
                debug!(key = %name, "忽略未知 section");
            }
        }
    }
    entities
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend_payload() -> Value {
        json!({
            "document_id": "65f0c2",
            "simplified_summary": ["Land is 2.5 acres", "Owned jointly"],
            "legal_entities": {
                "survey_numbers": ["112/3"],
                "ownership_details": {"owner_name": "K. Ramaiah"},
                "land_extents": {},
                "encumbrances": [],
                "risks": ["Mortgage not discharged"],
                "missing_data": [],
                "notable_clauses": [],
                "boundary_sketch": ["ignored"]
            },
            "processed_at": "2024-03-12T10:00:00+00:00"
        })
    }

    #[test]
    fn test_backend_shape() {
        let envelope = AnalysisEnvelope::from_json_value(&backend_payload()).unwrap();
        let result = envelope.result;

        assert_eq!(result.summary.len(), 2);
        assert_eq!(
            result.present_entity_sections(),
            vec![
                SectionKey::SurveyNumbers,
                SectionKey::Ownership,
                SectionKey::Risks
            ]
        );
        assert!(!result.is_present(SectionKey::LandExtents));
        assert_eq!(envelope.meta.document_id.as_deref(), Some("65f0c2"));
        assert_eq!(
            envelope.meta.processed_at.as_deref(),
            Some("2024-03-12T10:00:00+00:00")
        );
    }

    #[test]
    fn test_flat_shape() {
        let value = json!({
            "summary": ["a", "b"],
            "survey_numbers": [],
            "ownership": {"x": "1"}
        });
        let result = AnalysisResult::from_json_value(&value).unwrap();
        assert!(result.is_present(SectionKey::Summary));
        assert!(result.is_present(SectionKey::Ownership));
        assert!(!result.is_present(SectionKey::SurveyNumbers));
    }

    #[test]
    fn test_entities_shape() {
        let value = json!({
            "summary": "One line summary",
            "entities": {"risks": ["r1", "r2"]}
        });
        let result = AnalysisResult::from_json_value(&value).unwrap();
        assert_eq!(result.summary, vec!["One line summary".to_string()]);
        assert_eq!(result.item_ids(SectionKey::Risks).len(), 2);
    }

    #[test]
    fn test_rejects_non_object() {
        let err = AnalysisResult::from_json_value(&json!([1, 2])).unwrap_err();
        assert_eq!(err, PayloadError::NotAnObject { found: "array" });

        let err = AnalysisResult::from_json_value(&json!({"legal_entities": "oops"})).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidField { .. }));

        let err = AnalysisResult::from_json_str("not json").unwrap_err();
        assert!(matches!(err, PayloadError::InvalidJson { .. }));
    }

    #[test]
    fn test_model_text_with_fence() {
        let text = "```json\n{\"simplified_summary\": [\"ok\"], \"legal_entities\": {}}\n```";
        let result = AnalysisResult::from_model_text(text).unwrap();
        assert_eq!(result.summary, vec!["ok".to_string()]);
        assert!(result.entities.is_empty());

        let bare = "```{\"summary\": []}```";
        assert!(AnalysisResult::from_model_text(bare).unwrap().is_empty());
    }

    #[test]
    fn test_builder() {
        let result = AnalysisResult::new()
            .with_summary(["x"])
            .with_section(SectionKey::Risks, SectionValue::Text("flood zone".into()));
        assert_eq!(result.item_ids(SectionKey::Risks), vec![ItemId::Index(0)]);
        assert_eq!(result.item_ids(SectionKey::Summary), vec![ItemId::Index(0)]);
        assert!(!result.is_empty());
    }
}
