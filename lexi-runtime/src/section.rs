//! # Section 模块
//!
//! 分析结果中的分区（section）定义，以及从 JSON 载荷到 [`SectionValue`] 的一次性转换。
//!
//! ## 形状约定
//!
//! | Section | 期望形状 |
//! |---------|----------|
//! | `summary` | 列表 |
//! | `survey_numbers` / `encumbrances` / `risks` / `missing_data` / `notable_clauses` | 列表 |
//! | `ownership` / `land_extents` | 映射 |
//!
//! 形状不符的值降级为文本，从不报错。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// 分区键
///
/// 声明顺序即固定的展示顺序（决定错开时间），与载荷中的插入顺序无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Summary,
    SurveyNumbers,
    Ownership,
    LandExtents,
    Encumbrances,
    Risks,
    MissingData,
    NotableClauses,
}

/// 期望的值形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionShape {
    List,
    Map,
}

impl SectionKey {
    /// 全部分区，按固定顺序
    pub const ALL: [SectionKey; 8] = [
        SectionKey::Summary,
        SectionKey::SurveyNumbers,
        SectionKey::Ownership,
        SectionKey::LandExtents,
        SectionKey::Encumbrances,
        SectionKey::Risks,
        SectionKey::MissingData,
        SectionKey::NotableClauses,
    ];

    /// 实体分区（除 summary 外），按固定顺序
    pub const ENTITIES: [SectionKey; 7] = [
        SectionKey::SurveyNumbers,
        SectionKey::Ownership,
        SectionKey::LandExtents,
        SectionKey::Encumbrances,
        SectionKey::Risks,
        SectionKey::MissingData,
        SectionKey::NotableClauses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Summary => "summary",
            SectionKey::SurveyNumbers => "survey_numbers",
            SectionKey::Ownership => "ownership",
            SectionKey::LandExtents => "land_extents",
            SectionKey::Encumbrances => "encumbrances",
            SectionKey::Risks => "risks",
            SectionKey::MissingData => "missing_data",
            SectionKey::NotableClauses => "notable_clauses",
        }
    }

    /// 从载荷中的键名解析
    ///
    /// 同时接受后端 `legal_entities` 使用的长名称
    /// （`ownership_details`、`simplified_summary`）。
    pub fn from_wire(name: &str) -> Option<Self> {
        let key = match name {
            "summary" | "simplified_summary" => SectionKey::Summary,
            "survey_numbers" => SectionKey::SurveyNumbers,
            "ownership" | "ownership_details" => SectionKey::Ownership,
            "land_extents" => SectionKey::LandExtents,
            "encumbrances" => SectionKey::Encumbrances,
            "risks" => SectionKey::Risks,
            "missing_data" => SectionKey::MissingData,
            "notable_clauses" => SectionKey::NotableClauses,
            _ => return None,
        };
        Some(key)
    }

    /// 期望形状
    pub fn expected_shape(&self) -> SectionShape {
        match self {
            SectionKey::Ownership | SectionKey::LandExtents => SectionShape::Map,
            _ => SectionShape::List,
        }
    }

    /// 在固定顺序中的下标
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for SectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 映射分区中的单个值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapValue {
    Text(String),
    List(Vec<String>),
}

/// 分区值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SectionValue {
    /// 有序字符串列表
    List(Vec<String>),
    /// 有序映射（保持载荷顺序）
    Map(Vec<(String, MapValue)>),
    /// 纯文本（也是形状异常时的降级形式）
    Text(String),
}

/// 分区内条目标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// 列表下标（文本分区只有一个条目 `Index(0)`）
    Index(usize),
    /// 映射键
    Key(String),
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Index(i) => write!(f, "#{i}"),
            ItemId::Key(k) => write!(f, "{k}"),
        }
    }
}

impl SectionValue {
    /// 是否为空（空分区永远不会被展示）
    pub fn is_empty(&self) -> bool {
        match self {
            SectionValue::List(items) => items.is_empty(),
            SectionValue::Map(entries) => entries.is_empty(),
            SectionValue::Text(text) => text.trim().is_empty(),
        }
    }

    /// 实际形状；降级文本返回 `None`
    pub fn shape(&self) -> Option<SectionShape> {
        match self {
            SectionValue::List(_) => Some(SectionShape::List),
            SectionValue::Map(_) => Some(SectionShape::Map),
            SectionValue::Text(_) => None,
        }
    }

    /// 条目列表，顺序即条目错开顺序
    pub fn item_ids(&self) -> Vec<ItemId> {
        if self.is_empty() {
            return Vec::new();
        }
        match self {
            SectionValue::List(items) => (0..items.len()).map(ItemId::Index).collect(),
            SectionValue::Map(entries) => entries
                .iter()
                .map(|(key, _)| ItemId::Key(key.clone()))
                .collect(),
            SectionValue::Text(_) => vec![ItemId::Index(0)],
        }
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.item_ids().len()
    }

    /// 从 JSON 值转换
    ///
    /// 返回 `None` 表示该分区缺失（`null`）。
    /// 与 `key` 的期望形状不符时降级为文本。
    pub fn from_json(key: SectionKey, value: &Value) -> Option<Self> {
        let coerced = match (key.expected_shape(), value) {
            (_, Value::Null) => return None,
            (SectionShape::List, Value::Array(items)) => SectionValue::List(coerce_list(items)),
            (SectionShape::Map, Value::Object(map)) => SectionValue::Map(
                map.iter()
                    .filter_map(|(k, v)| coerce_map_value(v).map(|v| (k.clone(), v)))
                    .collect(),
            ),
            (_, other) => {
                debug!(
                    section = %key,
                    found = json_kind(other),
                    "section 形状不符，降级为文本"
                );
                SectionValue::Text(raw_text(other))
            }
        };
        Some(coerced)
    }
}

/// 列表元素：字符串原样保留，`null` 与空串丢弃，其余转为紧凑 JSON 文本
pub(crate) fn coerce_list(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Null => None,
            other => Some(raw_text(other)),
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn coerce_map_value(value: &Value) -> Option<MapValue> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(MapValue::List(coerce_list(items))),
        other => Some(MapValue::Text(raw_text(other))),
    }
}

/// 字符串取原值，其余取紧凑 JSON 表示
pub(crate) fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_order() {
        let mut keys = SectionKey::ALL.to_vec();
        keys.reverse();
        keys.sort();
        assert_eq!(keys, SectionKey::ALL.to_vec());
        assert_eq!(SectionKey::Summary.rank(), 0);
        assert_eq!(SectionKey::NotableClauses.rank(), 7);
        assert!(!SectionKey::ENTITIES.contains(&SectionKey::Summary));
    }

    #[test]
    fn test_from_wire_accepts_backend_names() {
        assert_eq!(
            SectionKey::from_wire("ownership_details"),
            Some(SectionKey::Ownership)
        );
        assert_eq!(SectionKey::from_wire("risks"), Some(SectionKey::Risks));
        assert_eq!(SectionKey::from_wire("title_chain"), None);
    }

    #[test]
    fn test_list_coercion() {
        let value = json!(["Sy. No. 12/A", null, "", 42, {"a": 1}]);
        let section = SectionValue::from_json(SectionKey::SurveyNumbers, &value).unwrap();
        assert_eq!(
            section,
            SectionValue::List(vec![
                "Sy. No. 12/A".to_string(),
                "42".to_string(),
                r#"{"a":1}"#.to_string(),
            ])
        );
        assert_eq!(section.len(), 3);
    }

    #[test]
    fn test_map_coercion_keeps_payload_order() {
        let value = json!({
            "owner_name": "K. Ramaiah",
            "co_owners": ["S. Lakshmi"],
            "ownership_type": null,
            "share": 0.5
        });
        let section = SectionValue::from_json(SectionKey::Ownership, &value).unwrap();
        assert_eq!(
            section.item_ids(),
            vec![
                ItemId::Key("owner_name".to_string()),
                ItemId::Key("co_owners".to_string()),
                ItemId::Key("share".to_string()),
            ]
        );
        match section {
            SectionValue::Map(entries) => {
                assert_eq!(entries[1].1, MapValue::List(vec!["S. Lakshmi".to_string()]));
                assert_eq!(entries[2].1, MapValue::Text("0.5".to_string()));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_degrades_to_text() {
        let value = json!("No encumbrances found");
        let section = SectionValue::from_json(SectionKey::Encumbrances, &value).unwrap();
        assert_eq!(section, SectionValue::Text("No encumbrances found".to_string()));
        assert_eq!(section.item_ids(), vec![ItemId::Index(0)]);

        let value = json!(["a", "b"]);
        let section = SectionValue::from_json(SectionKey::LandExtents, &value).unwrap();
        assert_eq!(section, SectionValue::Text(r#"["a","b"]"#.to_string()));
    }

    #[test]
    fn test_null_is_absent_and_empty_is_empty() {
        assert!(SectionValue::from_json(SectionKey::Risks, &Value::Null).is_none());
        assert!(SectionValue::List(vec![]).is_empty());
        assert!(SectionValue::Map(vec![]).is_empty());
        assert!(SectionValue::Text("  ".to_string()).is_empty());
        assert!(SectionValue::Text("  ".to_string()).item_ids().is_empty());
    }
}
