use indexmap::map::Entry;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{DebiaiError, Result};
use crate::logic::index_map::ColumnIndex;
use crate::model::{value_to_key, BlockLevel, ColumnSpec, ColumnType, SampleTree};

/// A block being grouped, children keyed by block name in first-seen order
struct PendingBlock {
    block: SampleTree,
    children: IndexMap<String, PendingBlock>,
}

impl PendingBlock {
    fn new(block: SampleTree) -> Self {
        Self {
            block,
            children: IndexMap::new(),
        }
    }

    fn into_tree(self, depth: usize, sample_depth: usize) -> SampleTree {
        let mut block = self.block;
        if depth < sample_depth {
            block.children_info_list = Some(
                self.children
                    .into_values()
                    .map(|child| child.into_tree(depth + 1, sample_depth))
                    .collect(),
            );
        }
        block
    }
}

/// Group tabular rows into the nested block tree.
///
/// At every level rows sharing the same block name under the same parent end
/// up in one node, whether or not they are adjacent; ancestor values come from
/// the first row seen. Rows repeating a full sample path are merged into one
/// leaf holding the values of the last such row. `first_row` is the batch
/// position of `rows[0]`, used to number rows in errors.
pub fn encode_rows<R: AsRef<[Value]>>(
    levels: &[BlockLevel],
    rows: &[R],
    index: &ColumnIndex,
    first_row: usize,
) -> Result<Vec<SampleTree>> {
    let Some(sample_depth) = levels.len().checked_sub(1) else {
        return Err(DebiaiError::schema(
            "At least a block is required in the block structure",
        ));
    };

    let mut roots: IndexMap<String, PendingBlock> = IndexMap::new();

    for (offset, row) in rows.iter().enumerate() {
        let row_number = first_row + offset;
        let row = row.as_ref();
        let mut siblings = &mut roots;

        for (depth, level) in levels.iter().enumerate() {
            let key = block_key(level, row, index, row_number)?;
            let pending = match siblings.entry(key) {
                Entry::Occupied(entry) => {
                    let pending = entry.into_mut();
                    if depth == sample_depth {
                        log::debug!(
                            "Row {} repeats sample '{}', keeping the last values",
                            row_number,
                            pending.block.name
                        );
                        pending.block = build_block(level, row, index, row_number)?;
                    }
                    pending
                }
                Entry::Vacant(entry) => {
                    let block = build_block(level, row, index, row_number)?;
                    entry.insert(PendingBlock::new(block))
                }
            };
            siblings = &mut pending.children;
        }
    }

    Ok(roots
        .into_values()
        .map(|root| root.into_tree(0, sample_depth))
        .collect())
}

fn cell<'r>(row: &'r [Value], index: &ColumnIndex, name: &str, row_number: usize) -> Result<&'r Value> {
    let position = index.position(name)?;
    row.get(position).ok_or_else(|| {
        DebiaiError::validation(format!(
            "Row {} has {} values, '{}' is expected at position {}",
            row_number,
            row.len(),
            name,
            position
        ))
    })
}

fn block_key(level: &BlockLevel, row: &[Value], index: &ColumnIndex, row_number: usize) -> Result<String> {
    let value = cell(row, index, &level.name, row_number)?;
    value_to_key(value).ok_or_else(|| {
        DebiaiError::validation(format!(
            "The block '{}' needs a text or number value, got {} at row {}",
            level.name, value, row_number
        ))
    })
}

fn build_block(level: &BlockLevel, row: &[Value], index: &ColumnIndex, row_number: usize) -> Result<SampleTree> {
    let mut block = SampleTree::new(block_key(level, row, index, row_number)?);
    for (group, columns) in level.declared_groups() {
        let values = columns
            .iter()
            .map(|column| {
                let value = cell(row, index, &column.name, row_number)?;
                coerce_cell(column, value, row_number)
            })
            .collect::<Result<Vec<_>>>()?;
        block.set_values(group, values);
    }
    Ok(block)
}

/// Convert a cell to the representation its column type calls for.
///
/// Numbers become floats (numeric strings are parsed, booleans map to 1/0),
/// booleans accept `true`/`false` and 0/1, text passes through verbatim, lists
/// and dicts must already be arrays and objects. A null cell takes the column
/// default when one is declared.
pub fn coerce_cell(column: &ColumnSpec, value: &Value, row_number: usize) -> Result<Value> {
    if value.is_null() {
        return Ok(column.default_value().unwrap_or(Value::Null));
    }

    let mismatch = || {
        DebiaiError::validation(format!(
            "The column '{}' expects a {} value, got {} at row {}",
            column.name,
            column.column_type(),
            value,
            row_number
        ))
    };

    match column.column_type() {
        ColumnType::Text => Ok(value.clone()),
        ColumnType::Number => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            number
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch)
        }
        ColumnType::Boolean => {
            let flag = match value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => match n.as_f64() {
                    Some(x) if x == 0.0 => Some(false),
                    Some(x) if x == 1.0 => Some(true),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Some(true),
                    "false" | "0" => Some(false),
                    _ => None,
                },
                _ => None,
            };
            flag.map(Value::Bool).ok_or_else(mismatch)
        }
        ColumnType::List if value.is_array() => Ok(value.clone()),
        ColumnType::Dict if value.is_object() => Ok(value.clone()),
        ColumnType::List | ColumnType::Dict => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::index_map::build_index_map;
    use crate::model::{ColumnGroup, ColumnKind};
    use serde_json::json;

    fn image_levels() -> Vec<BlockLevel> {
        vec![BlockLevel::new("Image ID")
            .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("c1")])
            .with_columns(ColumnGroup::GroundTruth, vec![ColumnSpec::number("g1")])]
    }

    fn wine_levels() -> Vec<BlockLevel> {
        vec![
            BlockLevel::new("region")
                .with_columns(ColumnGroup::Contexts, vec![ColumnSpec::text("country")]),
            BlockLevel::new("winemaker"),
            BlockLevel::new("sample")
                .with_columns(ColumnGroup::Inputs, vec![ColumnSpec::number("alcohol")]),
        ]
    }

    #[test]
    fn test_single_level_example() {
        let levels = image_levels();
        let index = build_index_map(&levels, &["Image ID", "c1", "g1"]).unwrap();
        let rows = vec![
            vec![json!("img1"), json!("A"), json!(8)],
            vec![json!("img2"), json!("B"), json!(7)],
        ];

        let tree = encode_rows(&levels, &rows, &index, 0).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!([
                {"name": "img1", "contexts": ["A"], "groundTruth": [8.0]},
                {"name": "img2", "contexts": ["B"], "groundTruth": [7.0]}
            ])
        );
        assert!(tree[0].children_info_list.is_none());
    }

    #[test]
    fn test_grouping_ignores_adjacency() {
        let levels = wine_levels();
        let index =
            build_index_map(&levels, &["region", "country", "winemaker", "sample", "alcohol"])
                .unwrap();
        let rows = vec![
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s1"), json!(12.5)],
            vec![json!("Rioja"), json!("ES"), json!("B"), json!("s2"), json!(13)],
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s3"), json!("11")],
            vec![json!("Bordeaux"), json!("FR"), json!("C"), json!("s4"), json!(12)],
        ];

        let tree = encode_rows(&levels, &rows, &index, 0).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "Bordeaux");
        assert_eq!(tree[0].contexts, Some(vec![json!("FR")]));

        let winemakers = tree[0].children();
        assert_eq!(winemakers.len(), 2);
        assert_eq!(winemakers[0].name, "A");
        assert!(winemakers[0].contexts.is_none());

        let samples = winemakers[0].children();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].name, "s3");
        assert_eq!(samples[1].inputs, Some(vec![json!(11.0)]));
        assert!(samples[1].children_info_list.is_none());

        assert_eq!(tree[1].children()[0].children()[0].name, "s2");
    }

    #[test]
    fn test_duplicate_sample_path_keeps_last() {
        let levels = wine_levels();
        let index =
            build_index_map(&levels, &["region", "country", "winemaker", "sample", "alcohol"])
                .unwrap();
        let rows = vec![
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s1"), json!(10)],
            vec![json!("Rioja"), json!("ES"), json!("B"), json!("s2"), json!(13)],
            vec![json!("Bordeaux"), json!("FR"), json!("A"), json!("s1"), json!(14)],
        ];

        let tree = encode_rows(&levels, &rows, &index, 0).unwrap();
        let samples = tree[0].children()[0].children();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].inputs, Some(vec![json!(14.0)]));
    }

    #[test]
    fn test_numeric_block_names_are_stringified() {
        let levels = vec![BlockLevel::new("id")];
        let index = build_index_map(&levels, &["id"]).unwrap();
        let tree = encode_rows(&levels, &[vec![json!(42)]], &index, 0).unwrap();
        assert_eq!(tree[0].name, "42");
    }

    #[test]
    fn test_null_block_name_rejected() {
        let levels = vec![BlockLevel::new("id")];
        let index = build_index_map(&levels, &["id"]).unwrap();
        let err = encode_rows(&levels, &[vec![Value::Null]], &index, 0).unwrap_err();
        assert!(matches!(err, DebiaiError::Validation(_)));
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_short_row_rejected() {
        let levels = image_levels();
        let index = build_index_map(&levels, &["Image ID", "c1", "g1"]).unwrap();
        let err = encode_rows(&levels, &[vec![json!("img1"), json!("A")]], &index, 0).unwrap_err();
        assert!(err.to_string().contains("'g1'"));
    }

    #[test]
    fn test_errors_number_rows_from_the_batch_start() {
        let levels = image_levels();
        let index = build_index_map(&levels, &["Image ID", "c1", "g1"]).unwrap();
        let rows = vec![
            vec![json!("img6"), json!("A"), json!(1)],
            vec![json!("img7"), json!("B"), json!("many")],
        ];
        let err = encode_rows(&levels, &rows, &index, 5).unwrap_err();
        assert!(err.to_string().contains("at row 6"));
    }

    #[test]
    fn test_coercion_rules() {
        let number = ColumnSpec::number("n");
        assert_eq!(coerce_cell(&number, &json!("2.5"), 0).unwrap(), json!(2.5));
        assert_eq!(coerce_cell(&number, &json!(true), 0).unwrap(), json!(1.0));
        assert!(coerce_cell(&number, &json!("abc"), 0).is_err());

        let flag = ColumnSpec::boolean("b");
        assert_eq!(coerce_cell(&flag, &json!("False"), 0).unwrap(), json!(false));
        assert_eq!(coerce_cell(&flag, &json!(1), 0).unwrap(), json!(true));
        assert!(coerce_cell(&flag, &json!(2), 0).is_err());

        let text = ColumnSpec::text("t");
        assert_eq!(coerce_cell(&text, &json!(3), 0).unwrap(), json!(3));

        let list = ColumnSpec::new("l", ColumnType::List);
        assert!(coerce_cell(&list, &json!("a,b"), 0).is_err());
        assert_eq!(coerce_cell(&list, &json!(["a"]), 0).unwrap(), json!(["a"]));

        let with_default =
            ColumnSpec::number("d").with_kind(ColumnKind::Number { default: Some(0.5) });
        assert_eq!(coerce_cell(&with_default, &Value::Null, 0).unwrap(), json!(0.5));
        assert_eq!(coerce_cell(&number, &Value::Null, 0).unwrap(), Value::Null);
    }

    #[test]
    fn test_empty_rows_give_empty_tree() {
        let levels = image_levels();
        let index = build_index_map(&levels, &["Image ID", "c1", "g1"]).unwrap();
        let rows: Vec<Vec<Value>> = Vec::new();
        assert!(encode_rows(&levels, &rows, &index, 0).unwrap().is_empty());
    }
}
