use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::logic::decode_to_table;
use crate::model::{format_timestamp, SelectionInfo, Table};
use crate::store::{Backend, ProjectStore, SampleStore};

/// A named subset of a project's samples
pub struct Selection {
    backend: Arc<dyn Backend>,
    project_id: String,
    info: SelectionInfo,
}

impl Selection {
    pub(crate) fn new(backend: Arc<dyn Backend>, project_id: String, info: SelectionInfo) -> Self {
        Self {
            backend,
            project_id,
            info,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn sample_count(&self) -> u64 {
        self.info.sample_count
    }

    pub fn info(&self) -> &SelectionInfo {
        &self.info
    }

    /// The selected samples as a table following the block structure
    pub async fn get_table(&self) -> Result<Table> {
        let project = self
            .backend
            .fetch_project_metadata(&self.project_id)
            .await?;
        let tree = self
            .backend
            .fetch_selection_samples(&self.project_id, &self.info.id)
            .await?;
        decode_to_table(&project.block_structure, &tree)
    }

    pub async fn get_array(&self) -> Result<Vec<Vec<Value>>> {
        Ok(self.get_table().await?.to_array())
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DebiAI selection : {}", self.info.name)?;
        writeln!(f, "Creation date : {}", format_timestamp(self.info.created_at))?;
        writeln!(f, "Samples : {}", self.info.sample_count)
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("project_id", &self.project_id)
            .field("info", &self.info)
            .finish()
    }
}
