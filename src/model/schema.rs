use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ColumnGroup, ColumnType};

/// Column type together with the default legal for that type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnKind {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Vec<Value>>,
    },
    Dict {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Map<String, Value>>,
    },
}

impl ColumnKind {
    /// Kind without a default value
    pub fn of(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Text => ColumnKind::Text { default: None },
            ColumnType::Number => ColumnKind::Number { default: None },
            ColumnType::Boolean => ColumnKind::Boolean { default: None },
            ColumnType::List => ColumnKind::List { default: None },
            ColumnType::Dict => ColumnKind::Dict { default: None },
        }
    }

    /// Kind carrying `default`, which must already match the type
    pub fn with_default(column_type: ColumnType, default: &Value) -> Option<Self> {
        let kind = match column_type {
            ColumnType::Text => ColumnKind::Text {
                default: Some(default.as_str()?.to_string()),
            },
            ColumnType::Number => ColumnKind::Number {
                default: Some(default.as_f64()?),
            },
            ColumnType::Boolean => ColumnKind::Boolean {
                default: Some(default.as_bool()?),
            },
            ColumnType::List => ColumnKind::List {
                default: Some(default.as_array()?.clone()),
            },
            ColumnType::Dict => ColumnKind::Dict {
                default: Some(default.as_object()?.clone()),
            },
        };
        Some(kind)
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnKind::Text { .. } => ColumnType::Text,
            ColumnKind::Number { .. } => ColumnType::Number,
            ColumnKind::Boolean { .. } => ColumnType::Boolean,
            ColumnKind::List { .. } => ColumnType::List,
            ColumnKind::Dict { .. } => ColumnType::Dict,
        }
    }

    pub fn default_value(&self) -> Option<Value> {
        match self {
            ColumnKind::Text { default } => default.clone().map(Value::String),
            ColumnKind::Number { default } => default
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ColumnKind::Boolean { default } => default.map(Value::Bool),
            ColumnKind::List { default } => default.clone().map(Value::Array),
            ColumnKind::Dict { default } => default.clone().map(Value::Object),
        }
    }
}

/// A named, typed column of a block level or of the expected results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
    /// Display grouping, cosmetic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::of(column_type),
            group: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn column_type(&self) -> ColumnType {
        self.kind.column_type()
    }

    pub fn default_value(&self) -> Option<Value> {
        self.kind.default_value()
    }
}

/// Expected model output columns share the column descriptor shape
pub type ExpectedResult = ColumnSpec;

/// One level of the sample hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLevel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ColumnSpec>,
    #[serde(
        rename = "groundTruth",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ground_truth: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub others: Vec<ColumnSpec>,
}

impl BlockLevel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contexts: Vec::new(),
            inputs: Vec::new(),
            ground_truth: Vec::new(),
            others: Vec::new(),
        }
    }

    pub fn with_columns(mut self, group: ColumnGroup, columns: Vec<ColumnSpec>) -> Self {
        *self.group_mut(group) = columns;
        self
    }

    pub fn group(&self, group: ColumnGroup) -> &[ColumnSpec] {
        match group {
            ColumnGroup::Contexts => &self.contexts,
            ColumnGroup::Inputs => &self.inputs,
            ColumnGroup::GroundTruth => &self.ground_truth,
            ColumnGroup::Others => &self.others,
        }
    }

    pub fn group_mut(&mut self, group: ColumnGroup) -> &mut Vec<ColumnSpec> {
        match group {
            ColumnGroup::Contexts => &mut self.contexts,
            ColumnGroup::Inputs => &mut self.inputs,
            ColumnGroup::GroundTruth => &mut self.ground_truth,
            ColumnGroup::Others => &mut self.others,
        }
    }

    /// Declared groups in traversal order, skipping empty ones
    pub fn declared_groups(&self) -> impl Iterator<Item = (ColumnGroup, &[ColumnSpec])> + '_ {
        ColumnGroup::ALL
            .into_iter()
            .map(move |group| (group, self.group(group)))
            .filter(|(_, columns)| !columns.is_empty())
    }

    /// Number of table columns this level contributes, its own name included
    pub fn width(&self) -> usize {
        1 + self.declared_groups().map(|(_, c)| c.len()).sum::<usize>()
    }
}

/// Table header implied by a block structure: each level name followed by its
/// contexts, inputs, groundTruth and others columns
pub fn schema_columns(levels: &[BlockLevel]) -> Vec<String> {
    let mut columns = Vec::new();
    for level in levels {
        columns.push(level.name.clone());
        for (_, specs) in level.declared_groups() {
            columns.extend(specs.iter().map(|spec| spec.name.clone()));
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_spec_wire_shape() {
        let spec = ColumnSpec::number("My context 2").with_group("My group 1");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            json!({"name": "My context 2", "type": "number", "group": "My group 1"})
        );

        let parsed: ColumnSpec =
            serde_json::from_value(json!({"name": "r", "type": "text", "default": "n/a"})).unwrap();
        assert_eq!(parsed.column_type(), ColumnType::Text);
        assert_eq!(parsed.default_value(), Some(json!("n/a")));
        assert_eq!(parsed.group, None);
    }

    #[test]
    fn test_number_default_accepts_integers() {
        let parsed: ColumnSpec =
            serde_json::from_value(json!({"name": "score", "type": "number", "default": 0}))
                .unwrap();
        assert_eq!(parsed.kind, ColumnKind::Number { default: Some(0.0) });
    }

    #[test]
    fn test_with_default_rejects_mismatch() {
        assert!(ColumnKind::with_default(ColumnType::Number, &json!("zero")).is_none());
        assert_eq!(
            ColumnKind::with_default(ColumnType::Boolean, &json!(false)),
            Some(ColumnKind::Boolean { default: Some(false) })
        );
    }

    #[test]
    fn test_block_level_serialization_skips_empty_groups() {
        let level = BlockLevel::new("Image ID")
            .with_columns(ColumnGroup::GroundTruth, vec![ColumnSpec::number("g1")]);
        let json = serde_json::to_value(&level).unwrap();
        assert_eq!(
            json,
            json!({"name": "Image ID", "groundTruth": [{"name": "g1", "type": "number"}]})
        );
    }

    #[test]
    fn test_schema_columns_order() {
        let levels = vec![
            BlockLevel::new("region")
                .with_columns(ColumnGroup::Others, vec![ColumnSpec::text("climate")])
                .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("country")]),
            BlockLevel::new("sample")
                .with_columns(ColumnGroup::Inputs, vec![ColumnSpec::number("alcohol")]),
        ];
        assert_eq!(
            schema_columns(&levels),
            vec!["region", "country", "climate", "sample", "alcohol"]
        );
        assert_eq!(levels[0].width(), 3);
    }
}
