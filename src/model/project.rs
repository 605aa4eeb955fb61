use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{BlockLevel, ExpectedResult, Id};

/// Project metadata as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    /// Empty until the block structure has been set
    #[serde(rename = "blockLevelInfo", default)]
    pub block_structure: Vec<BlockLevel>,
    #[serde(
        rename = "resultStructure",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expected_results: Option<Vec<ExpectedResult>>,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(rename = "creationDate", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "updateDate", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(rename = "nbSamples", default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

impl ProjectInfo {
    pub fn has_block_structure(&self) -> bool {
        !self.block_structure.is_empty()
    }

    /// Expected results, treating an empty list as unset
    pub fn expected_results(&self) -> Option<&[ExpectedResult]> {
        self.expected_results
            .as_deref()
            .filter(|results| !results.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    #[serde(rename = "nbResults", default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u64>,
    #[serde(rename = "creationDate", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// A named immutable subset of a project's samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionInfo {
    pub id: Id,
    pub name: String,
    #[serde(rename = "creationDate", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "nbSamples", default)]
    pub sample_count: u64,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// A tag: sample hashes mapped to an integer tag value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: Id,
    pub name: String,
    #[serde(rename = "creationDate", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "updateDate", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Only present when the tag is fetched individually
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<IndexMap<String, i64>>,
}
