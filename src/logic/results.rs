use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{DebiaiError, Result};
use crate::logic::index_map::{ColumnIndex, ColumnRole, RequiredColumn};
use crate::model::{value_to_key, BlockLevel, ExpectedResult, HashedResults, ResultNode, ResultTree};

/// Check a caller-supplied result order against the expected results, or
/// default to the expected results order.
///
/// Every expected result has to be named and every name has to be an expected
/// result.
pub fn resolve_result_order(
    expected: &[ExpectedResult],
    order: Option<&[String]>,
) -> Result<Vec<String>> {
    let Some(order) = order else {
        return Ok(expected.iter().map(|result| result.name.clone()).collect());
    };

    for result in expected {
        if !order.contains(&result.name) {
            return Err(DebiaiError::validation(format!(
                "The expected result '{}' is missing from the expected_results_order Array",
                result.name
            )));
        }
    }
    for name in order {
        if !expected.iter().any(|result| &result.name == name) {
            return Err(DebiaiError::validation(format!(
                "The given expected result '{}' is not an expected result",
                name
            )));
        }
    }
    Ok(order.to_vec())
}

/// Verify that every branch of a result tree reaches the sample level and that
/// every sample carries exactly `expected_width` values. `sample_level` is the
/// depth of the sample level, 0 for a single-level structure.
pub fn check_result_tree(tree: &ResultTree, sample_level: usize, expected_width: usize) -> Result<()> {
    for (name, node) in tree {
        check_result_node(node, 0, sample_level, expected_width, name)?;
    }
    Ok(())
}

fn check_result_node(
    node: &ResultNode,
    depth: usize,
    sample_level: usize,
    expected_width: usize,
    path: &str,
) -> Result<()> {
    match node {
        ResultNode::Values(values) if depth == sample_level => {
            if values.len() != expected_width {
                return Err(DebiaiError::validation(format!(
                    "in : {}, {} values were given but {} were expected",
                    path,
                    values.len(),
                    expected_width
                )));
            }
            Ok(())
        }
        ResultNode::Values(_) => Err(DebiaiError::validation(format!(
            "in : {}, results were given before reaching the sample level",
            path
        ))),
        ResultNode::Blocks(_) if depth == sample_level => Err(DebiaiError::validation(format!(
            "in : {}, a list of {} values was expected",
            path, expected_width
        ))),
        ResultNode::Blocks(children) => {
            for (name, child) in children {
                let child_path = format!("{} / {}", path, name);
                check_result_node(child, depth + 1, sample_level, expected_width, &child_path)?;
            }
            Ok(())
        }
    }
}

/// Names of the columns identifying a sample: each level name, the last one
/// replaced by `id_column` when given
pub fn identity_columns(levels: &[BlockLevel], id_column: Option<&str>) -> Vec<RequiredColumn> {
    let last = levels.len().saturating_sub(1);
    levels
        .iter()
        .enumerate()
        .map(|(depth, level)| match id_column {
            Some(id) if depth == last => RequiredColumn::new(id, ColumnRole::Identity),
            _ => RequiredColumn::new(level.name.clone(), ColumnRole::Block),
        })
        .collect()
}

/// Columns a result batch must provide: the identity columns then one column
/// per expected result in `order`
pub fn result_columns(
    levels: &[BlockLevel],
    order: &[String],
    id_column: Option<&str>,
) -> Vec<RequiredColumn> {
    let mut required = identity_columns(levels, id_column);
    required.extend(
        order
            .iter()
            .map(|name| RequiredColumn::new(name.clone(), ColumnRole::Result)),
    );
    required
}

/// Group result rows into a result tree keyed by block names, each sample
/// holding its values in `order`. A sample repeated in the batch keeps the
/// values of its last row. `first_row` is the batch position of `rows[0]`.
pub fn results_to_tree<R: AsRef<[Value]>>(
    levels: &[BlockLevel],
    rows: &[R],
    index: &ColumnIndex,
    order: &[String],
    id_column: Option<&str>,
    first_row: usize,
) -> Result<ResultTree> {
    let identity = identity_columns(levels, id_column);
    let Some((sample, ancestors)) = identity.split_last() else {
        return Err(DebiaiError::schema(
            "At least a block is required in the block structure",
        ));
    };

    let mut tree = ResultTree::new();
    for (offset, row) in rows.iter().enumerate() {
        let row_number = first_row + offset;
        let row = row.as_ref();
        let mut blocks = &mut tree;
        for column in ancestors {
            let key = identity_key(row, index, &column.name, row_number)?;
            let node = blocks
                .entry(key)
                .or_insert_with(|| ResultNode::Blocks(IndexMap::new()));
            blocks = match node {
                ResultNode::Blocks(children) => children,
                ResultNode::Values(_) => {
                    return Err(DebiaiError::validation(format!(
                        "Row {} reaches a sample before the sample level",
                        row_number
                    )))
                }
            };
        }

        let key = identity_key(row, index, &sample.name, row_number)?;
        let values = order
            .iter()
            .map(|name| row_value(row, index, name, row_number).cloned())
            .collect::<Result<Vec<_>>>()?;
        blocks.insert(key, ResultNode::Values(values));
    }
    Ok(tree)
}

fn row_value<'r>(row: &'r [Value], index: &ColumnIndex, name: &str, row_number: usize) -> Result<&'r Value> {
    let position = index.position(name)?;
    row.get(position).ok_or_else(|| {
        DebiaiError::validation(format!(
            "Row {} has no value for '{}'",
            row_number, name
        ))
    })
}

fn identity_key(row: &[Value], index: &ColumnIndex, name: &str, row_number: usize) -> Result<String> {
    let value = row_value(row, index, name, row_number)?;
    value_to_key(value).ok_or_else(|| {
        DebiaiError::validation(format!(
            "The block '{}' needs a text or number value, got {} at row {}",
            name, value, row_number
        ))
    })
}

/// Every hashed result row must carry one value per expected result
pub fn check_hashed_widths(entries: &HashedResults, expected_width: usize) -> Result<()> {
    for (hash, values) in entries {
        if values.len() != expected_width {
            return Err(DebiaiError::validation(format!(
                "in : {}, {} values were given but {} were expected",
                hash,
                values.len(),
                expected_width
            )));
        }
    }
    Ok(())
}

/// Rearrange a row given in `order` into the order of `expected`
pub fn reorder_row(row: &[Value], order: &[String], expected: &[ExpectedResult]) -> Vec<Value> {
    expected
        .iter()
        .map(|result| {
            order
                .iter()
                .position(|name| name == &result.name)
                .and_then(|pos| row.get(pos))
                .cloned()
                .or_else(|| result.default_value())
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Append the default of a newly added expected result to stored rows
pub fn patch_rows_on_add<'a>(rows: impl IntoIterator<Item = &'a mut Vec<Value>>, default: &Value) {
    for row in rows {
        row.push(default.clone());
    }
}

/// Drop the value of a removed expected result from stored rows
pub fn patch_rows_on_remove<'a>(rows: impl IntoIterator<Item = &'a mut Vec<Value>>, position: usize) {
    for row in rows {
        if position < row.len() {
            row.remove(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSpec;
    use serde_json::json;

    fn expected() -> Vec<ExpectedResult> {
        vec![
            ColumnSpec::number("score"),
            ColumnSpec::text("label"),
            ColumnSpec::boolean("ok"),
        ]
    }

    fn levels() -> Vec<BlockLevel> {
        vec![BlockLevel::new("region"), BlockLevel::new("sample")]
    }

    #[test]
    fn test_default_order_follows_expected_results() {
        let order = resolve_result_order(&expected(), None).unwrap();
        assert_eq!(order, vec!["score", "label", "ok"]);
    }

    #[test]
    fn test_order_must_be_a_permutation() {
        let missing = vec!["score".to_string(), "label".to_string()];
        let err = resolve_result_order(&expected(), Some(missing.as_slice())).unwrap_err();
        assert!(err.to_string().contains("'ok' is missing"));

        let extra = vec![
            "score".to_string(),
            "label".to_string(),
            "ok".to_string(),
            "other".to_string(),
        ];
        let err = resolve_result_order(&expected(), Some(extra.as_slice())).unwrap_err();
        assert!(err.to_string().contains("'other' is not an expected result"));

        let shuffled = vec!["ok".to_string(), "score".to_string(), "label".to_string()];
        assert_eq!(
            resolve_result_order(&expected(), Some(shuffled.as_slice())).unwrap(),
            shuffled
        );
    }

    #[test]
    fn test_check_result_tree_reports_path() {
        let tree: ResultTree = serde_json::from_value(json!({
            "Bordeaux": {"s1": [1, "a", true], "s2": [1, "a"]}
        }))
        .unwrap();
        let err = check_result_tree(&tree, 1, 3).unwrap_err();
        assert!(matches!(err, DebiaiError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: in : Bordeaux / s2, 2 values were given but 3 were expected"
        );

        let shallow: ResultTree = serde_json::from_value(json!({"s1": [1, "a", true]})).unwrap();
        assert!(check_result_tree(&shallow, 1, 3).is_err());
        assert!(check_result_tree(&shallow, 0, 3).is_ok());
    }

    #[test]
    fn test_results_to_tree_groups_by_block() {
        let header = ["sample", "region", "label", "score", "ok"];
        let order = resolve_result_order(&expected(), None).unwrap();
        let index = ColumnIndex::resolve(&header, &result_columns(&levels(), &order, None)).unwrap();
        let rows = vec![
            vec![json!("s1"), json!("Bordeaux"), json!("a"), json!(0.5), json!(true)],
            vec![json!("s2"), json!("Rioja"), json!("b"), json!(0.7), json!(false)],
            vec![json!("s3"), json!("Bordeaux"), json!("c"), json!(0.9), json!(true)],
        ];

        let tree = results_to_tree(&levels(), &rows, &index, &order, None, 0).unwrap();
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "Bordeaux": {"s1": [0.5, "a", true], "s3": [0.9, "c", true]},
                "Rioja": {"s2": [0.7, "b", false]}
            })
        );
        check_result_tree(&tree, 1, 3).unwrap();
    }

    #[test]
    fn test_id_column_replaces_sample_level() {
        let order = vec!["score".to_string(), "label".to_string(), "ok".to_string()];
        let header = ["region", "image", "score", "label", "ok"];
        let required = result_columns(&levels(), &order, Some("image"));
        let index = ColumnIndex::resolve(&header, &required).unwrap();
        let rows = vec![vec![json!("Rioja"), json!(7), json!(1), json!("x"), json!(false)]];

        let tree = results_to_tree(&levels(), &rows, &index, &order, Some("image"), 0).unwrap();
        assert!(matches!(&tree["Rioja"], ResultNode::Blocks(samples) if samples.contains_key("7")));

        let err = ColumnIndex::resolve(&["region", "score", "label", "ok"], &required).unwrap_err();
        assert!(err.to_string().contains("id column 'image'"));
    }

    #[test]
    fn test_missing_result_column_is_named() {
        let order = resolve_result_order(&expected(), None).unwrap();
        let err = ColumnIndex::resolve(
            &["region", "sample", "score", "ok"],
            &result_columns(&levels(), &order, None),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'label'"));
    }

    #[test]
    fn test_reorder_and_patch_rows() {
        let order = vec!["ok".to_string(), "score".to_string(), "label".to_string()];
        let row = reorder_row(&[json!(true), json!(1.5), json!("a")], &order, &expected());
        assert_eq!(row, vec![json!(1.5), json!("a"), json!(true)]);

        let mut rows = vec![row.clone(), row];
        patch_rows_on_add(rows.iter_mut(), &json!(0));
        assert_eq!(rows[0].len(), 4);
        assert_eq!(rows[1][3], json!(0));

        patch_rows_on_remove(rows.iter_mut(), 1);
        assert_eq!(rows[0], vec![json!(1.5), json!(true), json!(0)]);
    }

    #[test]
    fn test_hashed_widths() {
        let mut entries = HashedResults::new();
        entries.insert("abc".to_string(), vec![json!(1), json!("a"), json!(true)]);
        assert!(check_hashed_widths(&entries, 3).is_ok());
        entries.insert("def".to_string(), vec![json!(1)]);
        let err = check_hashed_widths(&entries, 3).unwrap_err();
        assert!(err.to_string().contains("def"));
    }
}
