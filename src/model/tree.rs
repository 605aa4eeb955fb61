use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ColumnGroup;

/// A node of the block tree exchanged with the backend bulk-ingest API.
///
/// Value groups are present exactly when the owning block level declares
/// them. Sample-level nodes carry no `childrenInfoList` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleTree {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_info_list: Option<Vec<SampleTree>>,
}

impl SampleTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn values(&self, group: ColumnGroup) -> Option<&Vec<Value>> {
        match group {
            ColumnGroup::Contexts => self.contexts.as_ref(),
            ColumnGroup::Inputs => self.inputs.as_ref(),
            ColumnGroup::GroundTruth => self.ground_truth.as_ref(),
            ColumnGroup::Others => self.others.as_ref(),
        }
    }

    pub fn set_values(&mut self, group: ColumnGroup, values: Vec<Value>) {
        let slot = match group {
            ColumnGroup::Contexts => &mut self.contexts,
            ColumnGroup::Inputs => &mut self.inputs,
            ColumnGroup::GroundTruth => &mut self.ground_truth,
            ColumnGroup::Others => &mut self.others,
        };
        *slot = Some(values);
    }

    pub fn children(&self) -> &[SampleTree] {
        self.children_info_list.as_deref().unwrap_or(&[])
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Copy of this node with its children dropped
    pub fn detached(&self) -> SampleTree {
        SampleTree {
            children_info_list: None,
            ..self.clone()
        }
    }

    /// Number of leaves under (and including) this node
    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children().iter().map(SampleTree::leaf_count).sum()
        }
    }
}

/// Number of samples in a forest of block trees
pub fn count_leaves(tree: &[SampleTree]) -> usize {
    tree.iter().map(SampleTree::leaf_count).sum()
}
