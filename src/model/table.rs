use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DebiaiError, Result};

/// A tabular batch: a header of column labels and rows of JSON cells.
///
/// Every row has exactly as many cells as there are columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let table = Self { columns, rows };
        table.check_shape()?;
        Ok(table)
    }

    /// Every row must have exactly one cell per column. The fields are public,
    /// so operations reading cells by position check this first.
    pub fn check_shape(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(DebiaiError::validation(format!(
                    "Row {} has {} values but the table has {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Build a table from a 2-D array whose first row holds the column labels
    pub fn from_array(mut array: Vec<Vec<Value>>) -> Result<Self> {
        if array.is_empty() {
            return Ok(Self::default());
        }
        let header = array.remove(0);
        let columns = header
            .iter()
            .enumerate()
            .map(|(i, label)| {
                crate::model::value_to_key(label).ok_or_else(|| {
                    DebiaiError::validation(format!(
                        "Column label at position {} must be a string",
                        i
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns, array)
    }

    /// Header row followed by the data rows
    pub fn to_array(&self) -> Vec<Vec<Value>> {
        let mut array = Vec::with_capacity(self.rows.len() + 1);
        array.push(
            self.columns
                .iter()
                .map(|c| Value::String(c.clone()))
                .collect(),
        );
        array.extend(self.rows.iter().cloned());
        array
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column carrying `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of a column, `None` when the label is unknown or a row is too short
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|row| row.get(idx)).collect()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a column, or overwrite it when the label already exists
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(DebiaiError::validation(format!(
                "Column '{}' has {} values but the table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.check_shape()?;
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if let Some(cell) = row.get_mut(idx) {
                        *cell = value;
                    }
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_array() -> Vec<Vec<Value>> {
        vec![
            vec![json!("Image ID"), json!("My context 1"), json!("My groundtruth 1")],
            vec![json!("image-1"), json!("D"), json!(1)],
            vec![json!("image-2"), json!("E"), json!(3)],
        ]
    }

    #[test]
    fn test_from_array_and_back() {
        let table = Table::from_array(sample_array()).unwrap();
        assert_eq!(table.columns, vec!["Image ID", "My context 1", "My groundtruth 1"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "My context 1"), Some(&json!("E")));
        assert_eq!(table.to_array(), sample_array());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Table::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![json!(1), json!(2)], vec![json!(3)]],
        )
        .unwrap_err();
        assert!(matches!(err, DebiaiError::Validation(_)));
        assert!(err.to_string().contains("Row 1"));
    }

    #[test]
    fn test_set_column_appends_then_overwrites() {
        let mut table = Table::from_array(sample_array()).unwrap();
        table
            .set_column("hash", vec![json!("h1"), json!("h2")])
            .unwrap();
        assert_eq!(table.columns.len(), 4);
        table
            .set_column("hash", vec![json!("x1"), json!("x2")])
            .unwrap();
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.column("hash").unwrap(), vec![&json!("x1"), &json!("x2")]);
        assert!(table.set_column("short", vec![json!(1)]).is_err());
    }

    #[test]
    fn test_hand_built_ragged_table_does_not_panic() {
        let mut table = Table {
            columns: vec!["id".to_string(), "r".to_string()],
            rows: vec![vec![json!("a")]],
        };
        assert!(table.check_shape().is_err());
        assert_eq!(table.column("r"), None);
        assert_eq!(table.column("id"), Some(vec![&json!("a")]));
        assert!(table.set_column("r", vec![json!(1)]).is_err());
    }

    #[test]
    fn test_empty_array_is_empty_table() {
        let table = Table::from_array(Vec::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
