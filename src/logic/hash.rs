use std::collections::HashSet;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{DebiaiError, Result};
use crate::logic::index_map::ColumnIndex;
use crate::logic::results::identity_columns;
use crate::model::{value_to_key, BlockLevel, HashedResults, ReconcileOutcome};
use crate::store::ModelStore;

/// Slash-joined block names identifying a sample
pub fn sample_path<S: AsRef<str>>(block_names: &[S]) -> String {
    block_names
        .iter()
        .map(|name| name.as_ref())
        .collect::<Vec<_>>()
        .join("/")
}

/// SHA-256 of a sample path, hex encoded
pub fn hash_path(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// Content hash of the sample identified by `block_names`, root first
pub fn compute_sample_hash<S: AsRef<str>>(block_names: &[S]) -> String {
    hash_path(&sample_path(block_names))
}

/// Computes sample hashes for the rows of one header
#[derive(Debug, Clone)]
pub struct SampleHasher {
    columns: Vec<(String, usize)>,
}

impl SampleHasher {
    /// Locate the identity columns in `header`. With `id_column` the sample
    /// level is read from that column instead of the level's own.
    pub fn new<S: AsRef<str>>(
        levels: &[BlockLevel],
        header: &[S],
        id_column: Option<&str>,
    ) -> Result<Self> {
        if levels.is_empty() {
            return Err(DebiaiError::schema(
                "At least a block is required in the block structure",
            ));
        }
        let required = identity_columns(levels, id_column);
        let index = ColumnIndex::resolve(header, &required)?;
        let columns = required
            .into_iter()
            .map(|column| {
                let position = index.position(&column.name)?;
                Ok((column.name, position))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn hash_row(&self, row: &[Value], row_number: usize) -> Result<String> {
        let names = self
            .columns
            .iter()
            .map(|(name, position)| {
                row.get(*position)
                    .and_then(value_to_key)
                    .ok_or_else(|| {
                        DebiaiError::validation(format!(
                            "The block '{}' has no usable value at row {}",
                            name, row_number
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(compute_sample_hash(&names))
    }

    pub fn hash_rows<R: AsRef<[Value]>>(&self, rows: &[R]) -> Result<Vec<String>> {
        rows.iter()
            .enumerate()
            .map(|(row_number, row)| self.hash_row(row.as_ref(), row_number))
            .collect()
    }
}

/// Split hashed results into those still unknown to the backend and the
/// hashes that already exist
pub fn partition_by_existing(entries: HashedResults, existing: &[String]) -> (HashedResults, Vec<String>) {
    let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let mut fresh = HashedResults::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for (hash, values) in entries {
        if existing.contains(hash.as_str()) {
            rejected.push(hash);
        } else {
            fresh.insert(hash, values);
        }
    }
    (fresh, rejected)
}

/// Upload the results whose hash holds no result yet for the model.
///
/// Existing hashes are reported back as rejected and are never overwritten.
/// The existence check is made against the backend on every call.
pub async fn reconcile<S: ModelStore + ?Sized>(
    store: &S,
    project_id: &str,
    model_id: &str,
    entries: HashedResults,
) -> Result<ReconcileOutcome> {
    if entries.is_empty() {
        return Ok(ReconcileOutcome::default());
    }

    let hashes: Vec<String> = entries.keys().cloned().collect();
    let existing = store
        .check_hashes_exist(project_id, Some(model_id), &hashes)
        .await?;
    let (fresh, rejected) = partition_by_existing(entries, &existing);

    if !rejected.is_empty() {
        log::warn!(
            "{} results already exist for the model '{}' and were skipped",
            rejected.len(),
            model_id
        );
    }
    if !fresh.is_empty() {
        store
            .push_results_by_hash(project_id, model_id, &fresh)
            .await?;
        log::debug!("Uploaded {} hashed results", fresh.len());
    }

    Ok(ReconcileOutcome {
        uploaded: fresh.into_keys().collect(),
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn levels() -> Vec<BlockLevel> {
        vec![BlockLevel::new("region"), BlockLevel::new("sample")]
    }

    #[test]
    fn test_hash_is_deterministic_sha256() {
        let hash = compute_sample_hash(&["Bordeaux", "s1"]);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_path("Bordeaux/s1"));
        assert_ne!(hash, compute_sample_hash(&["Bordeaux", "s2"]));
        // Known digest of the empty string
        assert_eq!(
            hash_path(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hasher_reads_header_positions() {
        let hasher = SampleHasher::new(&levels(), &["score", "sample", "region"], None).unwrap();
        let hash = hasher
            .hash_row(&[json!(0.5), json!("s1"), json!("Bordeaux")], 0)
            .unwrap();
        assert_eq!(hash, compute_sample_hash(&["Bordeaux", "s1"]));
    }

    #[test]
    fn test_hasher_with_id_column() {
        let hasher =
            SampleHasher::new(&levels(), &["region", "image_id"], Some("image_id")).unwrap();
        let hashes = hasher
            .hash_rows(&[vec![json!("Rioja"), json!(12)]])
            .unwrap();
        assert_eq!(hashes, vec![compute_sample_hash(&["Rioja", "12"])]);

        let err = SampleHasher::new(&levels(), &["region", "sample"], Some("image_id")).unwrap_err();
        assert!(err.to_string().contains("image_id"));
    }

    #[test]
    fn test_hasher_rejects_null_block() {
        let hasher = SampleHasher::new(&levels(), &["region", "sample"], None).unwrap();
        let err = hasher.hash_row(&[json!("Rioja"), Value::Null], 3).unwrap_err();
        assert!(err.to_string().contains("'sample'"));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_partition_keeps_input_order() {
        let mut entries = HashedResults::new();
        entries.insert("a".into(), vec![json!(1)]);
        entries.insert("b".into(), vec![json!(2)]);
        entries.insert("c".into(), vec![json!(3)]);

        let (fresh, rejected) = partition_by_existing(entries, &["b".to_string()]);
        assert_eq!(fresh.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(rejected, vec!["b"]);
    }
}
