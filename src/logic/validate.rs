use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DebiaiError, Result};
use crate::model::{BlockLevel, ColumnGroup, ColumnKind, ColumnSpec, ColumnType, ExpectedResult};

/// Non-fatal finding raised while validating a block structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaWarning {
    pub block: String,
    pub key: String,
    pub message: String,
}

fn type_list() -> String {
    let names: Vec<String> = ColumnType::ALL
        .iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect();
    format!("[{}]", names.join(", "))
}

/// Parse and validate a caller-supplied block structure.
///
/// The structure must be a non-empty list of objects, each with a string
/// `name`; each declared column needs a `name` and a known `type`. Keys other
/// than `name` and the four column groups only produce warnings.
pub fn parse_block_structure(value: &Value) -> Result<(Vec<BlockLevel>, Vec<SchemaWarning>)> {
    let blocks = value
        .as_array()
        .ok_or_else(|| DebiaiError::schema("The block structure must be a list"))?;

    if blocks.is_empty() {
        return Err(DebiaiError::schema(
            "At least a block is required in the block structure",
        ));
    }

    let mut levels = Vec::with_capacity(blocks.len());
    let mut warnings = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        let block = block.as_object().ok_or_else(|| {
            DebiaiError::schema(format!("The block n°{} must be an object", i + 1))
        })?;

        let name = match block.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(DebiaiError::schema(format!(
                    "The 'name' of the block n°{} must be a string",
                    i + 1
                )))
            }
            None => {
                return Err(DebiaiError::schema(format!(
                    "The 'name' is required in the block n°{}",
                    i + 1
                )))
            }
        };

        for key in block.keys() {
            if key != "name" && ColumnGroup::from_key(key).is_none() {
                let message = format!(
                    "Unknown block type '{}'. Use those block types : ['contexts', 'inputs', 'groundTruth', 'others']",
                    key
                );
                log::warn!("Block '{}': {}", name, message);
                warnings.push(SchemaWarning {
                    block: name.clone(),
                    key: key.clone(),
                    message,
                });
            }
        }

        let mut level = BlockLevel::new(name.clone());
        for group in ColumnGroup::ALL {
            let Some(columns) = block.get(group.key()) else {
                continue;
            };
            let columns = columns.as_array().ok_or_else(|| {
                DebiaiError::schema(format!(
                    "The '{}' of the block '{}' must be a list",
                    group, name
                ))
            })?;
            let location = format!("the '{}' in the block '{}'", group, name);
            *level.group_mut(group) = columns
                .iter()
                .map(|column| parse_column(column, &location))
                .collect::<Result<Vec<_>>>()?;
        }
        levels.push(level);
    }

    validate_block_levels(&levels)?;
    Ok((levels, warnings))
}

/// Structural checks on an already typed block structure
pub fn validate_block_levels(levels: &[BlockLevel]) -> Result<()> {
    if levels.is_empty() {
        return Err(DebiaiError::schema(
            "At least a block is required in the block structure",
        ));
    }

    let mut level_names = HashSet::new();
    for (i, level) in levels.iter().enumerate() {
        if level.name.is_empty() {
            return Err(DebiaiError::schema(format!(
                "The 'name' is required in the block n°{}",
                i + 1
            )));
        }
        if !level_names.insert(level.name.as_str()) {
            return Err(DebiaiError::schema(format!(
                "The block name '{}' is used by more than one block",
                level.name
            )));
        }

        for (group, columns) in level.declared_groups() {
            let mut seen = HashSet::new();
            for column in columns {
                if column.name.is_empty() {
                    return Err(DebiaiError::schema(format!(
                        "The name of the column is required in the '{}' in the block '{}'",
                        group, level.name
                    )));
                }
                if !seen.insert(column.name.as_str()) {
                    return Err(DebiaiError::schema(format!(
                        "The column name '{}' must be unique in the '{}' of the block '{}'",
                        column.name, group, level.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Parse one column descriptor, keeping only name, type, default and group
pub fn parse_column(value: &Value, location: &str) -> Result<ColumnSpec> {
    let column = value.as_object().ok_or_else(|| {
        DebiaiError::schema(format!("Each column in {} must be a dictionary", location))
    })?;

    let name = match column.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) | None => {
            return Err(DebiaiError::schema(format!(
                "The name of the column is required in {}",
                location
            )))
        }
        Some(_) => {
            return Err(DebiaiError::schema(format!(
                "The name of the column in {} must be a string",
                location
            )))
        }
    };

    let type_name = column.get("type").ok_or_else(|| {
        DebiaiError::schema(format!(
            "The type of the column '{}' is required in {}",
            name, location
        ))
    })?;
    let column_type = type_name
        .as_str()
        .and_then(|t| t.parse::<ColumnType>().ok())
        .ok_or_else(|| {
            DebiaiError::schema(format!(
                "Unknown type of the column '{}' in {}. Use : {}",
                name,
                location,
                type_list()
            ))
        })?;

    let kind = parse_default(column, column_type, &name)?;

    let group = match column.get("group") {
        None => None,
        Some(Value::String(group)) => Some(group.clone()),
        Some(_) => {
            return Err(DebiaiError::schema(format!(
                "The group of the column '{}' in {} must be a string",
                name, location
            )))
        }
    };

    Ok(ColumnSpec { name, kind, group })
}

fn parse_default(column: &Map<String, Value>, column_type: ColumnType, name: &str) -> Result<ColumnKind> {
    match column.get("default") {
        None | Some(Value::Null) => Ok(ColumnKind::of(column_type)),
        Some(default) => ColumnKind::with_default(column_type, default).ok_or_else(|| {
            DebiaiError::schema(format!(
                "The default value of the column '{}' must be of type '{}'",
                name, column_type
            ))
        }),
    }
}

/// Parse and validate a caller-supplied expected results list.
///
/// Result names must be unique across the whole list, whatever their type.
pub fn parse_expected_results(value: &Value) -> Result<Vec<ExpectedResult>> {
    let columns = value
        .as_array()
        .ok_or_else(|| DebiaiError::schema("The expected results must be a list"))?;

    if columns.is_empty() {
        return Err(DebiaiError::schema("At least one result is required"));
    }

    let mut results: Vec<ExpectedResult> = Vec::with_capacity(columns.len());
    for column in columns {
        let object = column
            .as_object()
            .ok_or_else(|| DebiaiError::schema("Each column must be a dictionary"))?;
        if !object.contains_key("name") {
            return Err(DebiaiError::schema(
                "The attribute 'name' is required in each column",
            ));
        }
        if !object.contains_key("type") {
            return Err(DebiaiError::schema(
                "The attribute 'type' is required in each column",
            ));
        }
        if let Some(group) = object.get("group") {
            if !group.is_string() {
                return Err(DebiaiError::schema("The group attribute must be a string"));
            }
        }

        let result = parse_column(column, "the expected results")?;
        if results.iter().any(|r| r.name == result.name) {
            return Err(DebiaiError::schema("Each result name need to be unique"));
        }
        results.push(result);
    }

    Ok(results)
}

/// Typed counterpart of [`parse_expected_results`]
pub fn validate_expected_results(results: &[ExpectedResult]) -> Result<()> {
    if results.is_empty() {
        return Err(DebiaiError::schema("At least one result is required"));
    }
    let mut names = HashSet::new();
    for result in results {
        if result.name.is_empty() {
            return Err(DebiaiError::schema(
                "The attribute 'name' is required in each column",
            ));
        }
        if !names.insert(result.name.as_str()) {
            return Err(DebiaiError::schema("Each result name need to be unique"));
        }
    }
    Ok(())
}

/// Validate a column to append to existing expected results. A default is
/// required since it back-fills every stored result row.
pub fn validate_new_expected_result(
    existing: &[ExpectedResult],
    column: &ExpectedResult,
) -> Result<()> {
    if column.name.is_empty() {
        return Err(DebiaiError::schema(
            "The attribute 'name' is required in each column",
        ));
    }
    if existing.iter().any(|r| r.name == column.name) {
        return Err(DebiaiError::schema(format!(
            "The expected result '{}' already exists, each result name need to be unique",
            column.name
        )));
    }
    if column.default_value().is_none() {
        return Err(DebiaiError::schema(format!(
            "A default value is required to add the expected result '{}'",
            column.name
        )));
    }
    Ok(())
}

pub fn expected_result_position(existing: &[ExpectedResult], name: &str) -> Option<usize> {
    existing.iter().position(|r| r.name == name)
}
