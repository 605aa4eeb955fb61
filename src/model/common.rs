use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Id = String;

/// Value type of a schema column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    List,
    Dict,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        ColumnType::Text,
        ColumnType::Number,
        ColumnType::Boolean,
        ColumnType::List,
        ColumnType::Dict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::List => "list",
            ColumnType::Dict => "dict",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ColumnType::Text),
            "number" => Ok(ColumnType::Number),
            "boolean" => Ok(ColumnType::Boolean),
            "list" => Ok(ColumnType::List),
            "dict" => Ok(ColumnType::Dict),
            _ => Err(format!("Unknown column type: {}", s)),
        }
    }
}

/// The four typed column groups a block level can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnGroup {
    Contexts,
    Inputs,
    GroundTruth,
    Others,
}

impl ColumnGroup {
    /// Traversal order used for trees and tables
    pub const ALL: [ColumnGroup; 4] = [
        ColumnGroup::Contexts,
        ColumnGroup::Inputs,
        ColumnGroup::GroundTruth,
        ColumnGroup::Others,
    ];

    /// Key used on the wire
    pub fn key(&self) -> &'static str {
        match self {
            ColumnGroup::Contexts => "contexts",
            ColumnGroup::Inputs => "inputs",
            ColumnGroup::GroundTruth => "groundTruth",
            ColumnGroup::Others => "others",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|group| group.key() == key)
    }
}

impl std::fmt::Display for ColumnGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// String form of a cell used as a block key or path segment
pub fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Format a backend timestamp (milliseconds since epoch) in local time
pub fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_parsing() {
        assert_eq!("number".parse::<ColumnType>(), Ok(ColumnType::Number));
        assert_eq!("dict".parse::<ColumnType>(), Ok(ColumnType::Dict));
        assert!("float".parse::<ColumnType>().is_err());
        assert_eq!(ColumnType::Boolean.to_string(), "boolean");
    }

    #[test]
    fn test_value_to_key() {
        assert_eq!(value_to_key(&json!("img1")), Some("img1".to_string()));
        assert_eq!(value_to_key(&json!(3)), Some("3".to_string()));
        assert_eq!(value_to_key(&json!(true)), Some("true".to_string()));
        assert_eq!(value_to_key(&Value::Null), None);
        assert_eq!(value_to_key(&json!([1])), None);
    }

    #[test]
    fn test_group_keys() {
        assert_eq!(ColumnGroup::GroundTruth.key(), "groundTruth");
        assert_eq!(ColumnGroup::from_key("others"), Some(ColumnGroup::Others));
        assert_eq!(ColumnGroup::from_key("results"), None);
    }

    #[test]
    fn test_format_timestamp_unknown() {
        assert_eq!(format_timestamp(None), "unknown");
        assert_ne!(format_timestamp(Some(1_700_000_000_000)), "unknown");
    }
}
