use indexmap::IndexMap;

use crate::error::{DebiaiError, Result};
use crate::model::{BlockLevel, ColumnGroup};

/// Why a column is required, used to word the missing-column error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Block,
    Group(ColumnGroup),
    Result,
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredColumn {
    pub name: String,
    pub role: ColumnRole,
}

impl RequiredColumn {
    pub fn new(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    fn missing_error(&self) -> DebiaiError {
        let message = match self.role {
            ColumnRole::Block => format!("'{}' is missing from the given samples", self.name),
            ColumnRole::Group(group) => format!(
                "'{}' {} is missing from the given samples",
                self.name, group
            ),
            ColumnRole::Result => format!(
                "The expected result '{}' is missing from the given results",
                self.name
            ),
            ColumnRole::Identity => {
                format!("The id column '{}' is missing from the given data", self.name)
            }
        };
        DebiaiError::validation(message)
    }
}

/// Columns a sample batch must provide: each level name, then its
/// contexts, inputs, groundTruth and others columns
pub fn sample_columns(levels: &[BlockLevel]) -> Vec<RequiredColumn> {
    let mut required = Vec::new();
    for level in levels {
        required.push(RequiredColumn::new(level.name.clone(), ColumnRole::Block));
        for (group, columns) in level.declared_groups() {
            required.extend(
                columns
                    .iter()
                    .map(|column| RequiredColumn::new(column.name.clone(), ColumnRole::Group(group))),
            );
        }
    }
    required
}

/// Position of every required column inside a header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: IndexMap<String, usize>,
}

impl ColumnIndex {
    /// Resolve `required` against `header`, failing on the first absent name.
    /// Header labels that are not required are ignored; when a label repeats
    /// the first occurrence wins.
    pub fn resolve<S: AsRef<str>>(header: &[S], required: &[RequiredColumn]) -> Result<Self> {
        let mut positions = IndexMap::with_capacity(required.len());
        for column in required {
            if positions.contains_key(&column.name) {
                continue;
            }
            let position = header
                .iter()
                .position(|label| label.as_ref() == column.name)
                .ok_or_else(|| column.missing_error())?;
            positions.insert(column.name.clone(), position);
        }
        Ok(Self { positions })
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Position of a column that was part of the resolved set
    pub fn position(&self, name: &str) -> Result<usize> {
        self.get(name).ok_or_else(|| {
            DebiaiError::validation(format!("'{}' is missing from the given samples", name))
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.positions.iter().map(|(name, pos)| (name.as_str(), *pos))
    }
}

/// Map every column the block structure requires to its position in `header`
pub fn build_index_map<S: AsRef<str>>(levels: &[BlockLevel], header: &[S]) -> Result<ColumnIndex> {
    ColumnIndex::resolve(header, &sample_columns(levels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSpec;

    fn levels() -> Vec<BlockLevel> {
        vec![
            BlockLevel::new("region")
                .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("country")]),
            BlockLevel::new("sample")
                .with_columns(ColumnGroup::Inputs, vec![ColumnSpec::number("alcohol")])
                .with_columns(ColumnGroup::GroundTruth, vec![ColumnSpec::number("quality")]),
        ]
    }

    #[test]
    fn test_positions_follow_header_not_schema() {
        let header = ["quality", "unused", "sample", "alcohol", "country", "region"];
        let index = build_index_map(&levels(), &header).unwrap();
        assert_eq!(index.get("region"), Some(5));
        assert_eq!(index.get("country"), Some(4));
        assert_eq!(index.get("sample"), Some(2));
        assert_eq!(index.get("alcohol"), Some(3));
        assert_eq!(index.get("quality"), Some(0));
        assert_eq!(index.get("unused"), None);
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_missing_column_is_named() {
        let header = ["region", "country", "sample", "quality"];
        let err = build_index_map(&levels(), &header).unwrap_err();
        assert!(matches!(err, DebiaiError::Validation(_)));
        let message = err.to_string();
        assert!(message.contains("'alcohol'"));
        assert!(message.contains("inputs"));
        assert!(message.contains("missing"));
        assert!(!message.contains("quality"));
    }

    #[test]
    fn test_missing_block_column() {
        let header = vec!["country".to_string(), "sample".to_string()];
        let err = build_index_map(&levels(), &header).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: 'region' is missing from the given samples"
        );
    }

    #[test]
    fn test_duplicate_header_label_first_wins() {
        let levels = vec![BlockLevel::new("id")];
        let index = build_index_map(&levels, &["id", "id"]).unwrap();
        assert_eq!(index.position("id").unwrap(), 0);
        assert!(index.position("other").is_err());
    }
}
