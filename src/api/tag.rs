use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::logic::decode_to_table;
use crate::model::{format_timestamp, TagInfo, Table};
use crate::store::{Backend, ProjectStore, SampleStore, TagStore};

/// A tag: an integer value attached to some samples of a project
pub struct Tag {
    backend: Arc<dyn Backend>,
    project_id: String,
    info: TagInfo,
    tags: RwLock<Option<IndexMap<String, i64>>>,
}

impl Tag {
    pub(crate) fn new(backend: Arc<dyn Backend>, project_id: String, info: TagInfo) -> Self {
        let tags = info.tags.clone();
        Self {
            backend,
            project_id,
            info,
            tags: RwLock::new(tags),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Sample hash to tag value map, fetched on first use
    pub async fn load(&self) -> Result<IndexMap<String, i64>> {
        if let Some(tags) = self.tags.read().as_ref() {
            return Ok(tags.clone());
        }
        let info = self.backend.get_tag(&self.project_id, &self.info.id).await?;
        let tags = info.tags.unwrap_or_default();
        *self.tags.write() = Some(tags.clone());
        Ok(tags)
    }

    /// Number of samples carrying each tag value
    pub async fn tag_counts(&self) -> Result<IndexMap<i64, usize>> {
        let mut counts = IndexMap::new();
        for value in self.load().await?.values() {
            *counts.entry(*value).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Samples carrying `value` as a table following the block structure
    pub async fn get_table(&self, value: i64) -> Result<Table> {
        let project = self
            .backend
            .fetch_project_metadata(&self.project_id)
            .await?;
        let tree = self
            .backend
            .fetch_tag_samples(&self.project_id, &self.info.id, value)
            .await?;
        decode_to_table(&project.block_structure, &tree)
    }

    pub async fn get_array(&self, value: i64) -> Result<Vec<Vec<Value>>> {
        Ok(self.get_table(value).await?.to_array())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DebiAI tag : {}", self.info.name)?;
        writeln!(f, "Creation date : {}", format_timestamp(self.info.created_at))?;
        writeln!(f, "Update date : {}", format_timestamp(self.info.updated_at))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("project_id", &self.project_id)
            .field("info", &self.info)
            .finish()
    }
}
