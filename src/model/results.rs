use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One level of a model result tree: nested blocks keyed by block name, or at
/// the sample level the ordered result values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultNode {
    Values(Vec<Value>),
    Blocks(IndexMap<String, ResultNode>),
}

/// Results keyed by the top-level block names
pub type ResultTree = IndexMap<String, ResultNode>;

/// Results keyed by sample content hash
pub type HashedResults = IndexMap<String, Vec<Value>>;

/// Body of a path-keyed results upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPayload {
    pub results: ResultTree,
    /// Name of the expected result held at each position of the value rows
    pub expected_results_order: Vec<String>,
}

/// Outcome of a hash-keyed upload. Hashes already holding a result were left
/// untouched and are reported as rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub uploaded: Vec<String>,
    pub rejected: Vec<String>,
}

impl ReconcileOutcome {
    pub fn merge(&mut self, other: ReconcileOutcome) {
        self.uploaded.extend(other.uploaded);
        self.rejected.extend(other.rejected);
    }
}
