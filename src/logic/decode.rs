use serde_json::Value;

use crate::error::{DebiaiError, Result};
use crate::model::{schema_columns, BlockLevel, SampleTree, Table};

/// Flatten a block tree into one row per sample.
///
/// Each row holds every ancestor's name and values followed by the sample's
/// own, in schema order, so an ancestor with several children is repeated on
/// each of their rows. A branch that stops before the sample level is padded
/// with nulls.
pub fn decode_tree(levels: &[BlockLevel], tree: &[SampleTree]) -> Result<Vec<Vec<Value>>> {
    if levels.is_empty() {
        return Err(DebiaiError::schema(
            "At least a block is required in the block structure",
        ));
    }

    let width = levels.iter().map(BlockLevel::width).sum();
    let mut flattener = Flattener {
        levels,
        width,
        prefix: Vec::with_capacity(width),
        path: Vec::with_capacity(levels.len()),
        rows: Vec::new(),
    };
    for node in tree {
        flattener.visit(0, node)?;
    }
    Ok(flattener.rows)
}

/// Decode a block tree into a table whose header follows the block structure
pub fn decode_to_table(levels: &[BlockLevel], tree: &[SampleTree]) -> Result<Table> {
    let rows = decode_tree(levels, tree)?;
    Table::new(schema_columns(levels), rows)
}

struct Flattener<'a> {
    levels: &'a [BlockLevel],
    width: usize,
    prefix: Vec<Value>,
    path: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Flattener<'_> {
    fn visit(&mut self, depth: usize, node: &SampleTree) -> Result<()> {
        let levels = self.levels;
        let level = &levels[depth];
        let mark = self.prefix.len();
        self.path.push(node.name.clone());
        self.prefix.push(Value::String(node.name.clone()));

        for (group, columns) in level.declared_groups() {
            let values = node.values(group).ok_or_else(|| {
                DebiaiError::validation(format!(
                    "in : {}, the {} values are missing",
                    self.path.join(" / "),
                    group
                ))
            })?;
            if values.len() != columns.len() {
                return Err(DebiaiError::validation(format!(
                    "in : {}, {} {} values were given but {} were expected",
                    self.path.join(" / "),
                    values.len(),
                    group,
                    columns.len()
                )));
            }
            self.prefix.extend(values.iter().cloned());
        }

        let at_sample_level = depth + 1 == levels.len();
        if at_sample_level || node.is_leaf() {
            if at_sample_level && !node.is_leaf() {
                log::debug!(
                    "Ignoring children below the sample '{}'",
                    self.path.join(" / ")
                );
            }
            let mut row = self.prefix.clone();
            row.resize(self.width, Value::Null);
            self.rows.push(row);
        } else {
            for child in node.children() {
                self.visit(depth + 1, child)?;
            }
        }

        self.prefix.truncate(mark);
        self.path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{build_index_map, encode_rows};
    use crate::model::{ColumnGroup, ColumnSpec};
    use serde_json::json;

    fn wine_levels() -> Vec<BlockLevel> {
        vec![
            BlockLevel::new("region")
                .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("country")]),
            BlockLevel::new("winemaker"),
            BlockLevel::new("sample")
                .with_columns(ColumnGroup::Inputs, vec![ColumnSpec::number("alcohol")])
                .with_columns(ColumnGroup::GroundTruth, vec![ColumnSpec::number("quality")]),
        ]
    }

    #[test]
    fn test_image_example_round_trip() {
        let levels = vec![BlockLevel::new("Image ID")
            .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("c1")])
            .with_columns(ColumnGroup::GroundTruth, vec![ColumnSpec::number("g1")])];
        let header = ["Image ID", "c1", "g1"];
        let rows = vec![
            vec![json!("img1"), json!("A"), json!(8)],
            vec![json!("img2"), json!("B"), json!(7)],
        ];
        let index = build_index_map(&levels, &header).unwrap();
        let tree = encode_rows(&levels, &rows, &index, 0).unwrap();

        let table = decode_to_table(&levels, &tree).unwrap();
        assert_eq!(table.columns, vec!["Image ID", "c1", "g1"]);
        assert_eq!(
            table.rows,
            vec![
                vec![json!("img1"), json!("A"), json!(8.0)],
                vec![json!("img2"), json!("B"), json!(7.0)],
            ]
        );
    }

    #[test]
    fn test_ancestors_repeat_per_child() {
        let tree: Vec<SampleTree> = serde_json::from_value(json!([
            {
                "name": "Bordeaux",
                "contexts": ["FR"],
                "childrenInfoList": [
                    {"name": "A", "childrenInfoList": [
                        {"name": "s1", "inputs": [12.5], "groundTruth": [5]},
                        {"name": "s2", "inputs": [11.0], "groundTruth": [6]}
                    ]},
                    {"name": "B", "childrenInfoList": [
                        {"name": "s3", "inputs": [13.0], "groundTruth": [7]}
                    ]}
                ]
            }
        ]))
        .unwrap();

        let rows = decode_tree(&wine_levels(), &tree).unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.len(), 6);
            assert_eq!(row[0], json!("Bordeaux"));
            assert_eq!(row[1], json!("FR"));
        }
        assert_eq!(rows[1], vec![
            json!("Bordeaux"),
            json!("FR"),
            json!("A"),
            json!("s2"),
            json!(11.0),
            json!(6)
        ]);
        assert_eq!(rows[2][2], json!("B"));
    }

    #[test]
    fn test_round_trip_regroups_interleaved_rows() {
        let levels = wine_levels();
        let header = ["region", "country", "winemaker", "sample", "alcohol", "quality"];
        let rows = vec![
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s1"), json!(12.5), json!(5.0)],
            vec![json!("Rioja"), json!("ES"), json!("B"), json!("s2"), json!(13.0), json!(6.0)],
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s3"), json!(11.0), json!(7.0)],
        ];
        let index = build_index_map(&levels, &header).unwrap();
        let tree = encode_rows(&levels, &rows, &index, 0).unwrap();
        let decoded = decode_tree(&levels, &tree).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], rows[0]);
        assert_eq!(decoded[1], rows[2]);
        assert_eq!(decoded[2], rows[1]);
    }

    #[test]
    fn test_branch_without_children_is_padded() {
        let tree: Vec<SampleTree> = serde_json::from_value(json!([
            {"name": "Empty", "contexts": ["IT"], "childrenInfoList": []}
        ]))
        .unwrap();
        let rows = decode_tree(&wine_levels(), &tree).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                json!("Empty"),
                json!("IT"),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null
            ]]
        );
    }

    #[test]
    fn test_short_value_group_names_path() {
        let tree: Vec<SampleTree> = serde_json::from_value(json!([
            {"name": "Bordeaux", "contexts": ["FR"], "childrenInfoList": [
                {"name": "A", "childrenInfoList": [
                    {"name": "s1", "inputs": [], "groundTruth": [5]}
                ]}
            ]}
        ]))
        .unwrap();
        let err = decode_tree(&wine_levels(), &tree).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Bordeaux / A / s1"));
        assert!(message.contains("inputs"));
    }

    #[test]
    fn test_missing_value_group_rejected() {
        let tree: Vec<SampleTree> =
            serde_json::from_value(json!([{"name": "Bordeaux", "childrenInfoList": []}])).unwrap();
        let err = decode_tree(&wine_levels(), &tree).unwrap_err();
        assert!(matches!(err, DebiaiError::Validation(_)));
        assert!(err.to_string().contains("contexts"));
    }
}
