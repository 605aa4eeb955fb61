use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::api::{Model, Selection, Tag};
use crate::config::AppConfig;
use crate::error::{DebiaiError, Result};
use crate::logic::{
    build_index_map, chunk_and_submit, decode_tree, encode_rows, parse_block_structure,
    parse_column, parse_expected_results, prepare_chunks, validate_block_levels,
    validate_new_expected_result, LogProgress, ProgressReporter, SampleHasher, SchemaWarning,
};
use crate::model::{
    count_leaves, format_timestamp, schema_columns, BlockLevel, ExpectedResult, ProjectInfo,
    Table,
};
use crate::store::{Backend, ModelStore, ProjectStore, SampleStore, SelectionStore, TagStore};

/// A project on the backend.
///
/// Keeps the metadata of the last fetch. Operations that depend on the schema
/// fetch it again before running, since any mutation makes the copy stale.
pub struct Project {
    backend: Arc<dyn Backend>,
    config: Arc<AppConfig>,
    id: String,
    info: RwLock<ProjectInfo>,
}

impl Project {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: Arc<AppConfig>, info: ProjectInfo) -> Self {
        Self {
            backend,
            config,
            id: info.id.clone(),
            info: RwLock::new(info),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    /// Metadata of the last fetch
    pub fn info(&self) -> ProjectInfo {
        self.info.read().clone()
    }

    /// Fetch the project metadata again
    pub async fn refresh(&self) -> Result<ProjectInfo> {
        let info = self.backend.fetch_project_metadata(&self.id).await?;
        *self.info.write() = info.clone();
        Ok(info)
    }

    fn levels_of(&self, info: &ProjectInfo) -> Result<Vec<BlockLevel>> {
        if !info.has_block_structure() {
            return Err(DebiaiError::validation(format!(
                "The {} DebiAI project block_structure hasn't been set yet",
                info.name
            )));
        }
        Ok(info.block_structure.clone())
    }

    fn expected_of(&self, info: &ProjectInfo) -> Result<Vec<ExpectedResult>> {
        info.expected_results()
            .map(<[ExpectedResult]>::to_vec)
            .ok_or_else(|| {
                DebiaiError::validation(format!(
                    "The {} DebiAI project expected_results hasn't been set yet",
                    info.name
                ))
            })
    }

    pub async fn block_structure(&self) -> Result<Vec<BlockLevel>> {
        let info = self.refresh().await?;
        self.levels_of(&info)
    }

    pub async fn expected_results(&self) -> Result<Vec<ExpectedResult>> {
        let info = self.refresh().await?;
        self.expected_of(&info)
    }

    // Schema

    /// Parse, validate and bind a block structure given as JSON. Unknown keys
    /// come back as warnings.
    pub async fn set_block_structure(&self, structure: &Value) -> Result<Vec<SchemaWarning>> {
        self.ensure_block_structure_unset().await?;
        let (levels, warnings) = parse_block_structure(structure)?;
        self.push_block_levels(&levels).await?;
        Ok(warnings)
    }

    pub async fn set_block_levels(&self, levels: Vec<BlockLevel>) -> Result<()> {
        validate_block_levels(&levels)?;
        self.ensure_block_structure_unset().await?;
        self.push_block_levels(&levels).await
    }

    async fn ensure_block_structure_unset(&self) -> Result<()> {
        let info = self.refresh().await?;
        if info.has_block_structure() {
            return Err(DebiaiError::schema(format!(
                "The {} DebiAI project block_structure is already set",
                info.name
            )));
        }
        Ok(())
    }

    async fn push_block_levels(&self, levels: &[BlockLevel]) -> Result<()> {
        self.backend.push_block_structure(&self.id, levels).await?;
        self.refresh().await?;
        log::info!(
            "Block structure set on project {} ({} levels)",
            self.id,
            levels.len()
        );
        Ok(())
    }

    pub async fn set_expected_results(&self, columns: &Value) -> Result<Vec<ExpectedResult>> {
        let results = parse_expected_results(columns)?;
        let info = self.refresh().await?;
        if info.expected_results().is_some() {
            return Err(DebiaiError::schema(format!(
                "The {} DebiAI project expected_results are already set",
                info.name
            )));
        }
        self.backend.push_expected_results(&self.id, &results).await?;
        self.refresh().await?;
        Ok(results)
    }

    /// Append an expected result; every stored model result gets its default
    pub async fn add_expected_result(&self, column: &Value) -> Result<Vec<ExpectedResult>> {
        let info = self.refresh().await?;
        let existing = self.expected_of(&info)?;
        let column = parse_column(column, "the expected results")?;
        validate_new_expected_result(&existing, &column)?;

        self.backend.add_expected_result(&self.id, &column).await?;
        let info = self.refresh().await?;
        self.expected_of(&info)
    }

    /// Drop an expected result along with its value in every stored model
    /// result. Removing the last one leaves the expected results unset.
    pub async fn remove_expected_result(&self, name: &str) -> Result<Vec<ExpectedResult>> {
        let info = self.refresh().await?;
        self.expected_of(&info)?;

        self.backend.remove_expected_result(&self.id, name).await?;
        let info = self.refresh().await?;
        Ok(info
            .expected_results()
            .map(<[ExpectedResult]>::to_vec)
            .unwrap_or_default())
    }

    // Samples

    /// Upload samples from a 2-D array whose first row holds the column labels
    pub async fn add_samples(&self, array: Vec<Vec<Value>>) -> Result<usize> {
        let table = Table::from_array(array)?;
        self.add_samples_table(&table).await
    }

    pub async fn add_samples_table(&self, table: &Table) -> Result<usize> {
        let mut progress = LogProgress::new("Adding samples");
        self.add_samples_with_progress(table, &mut progress).await
    }

    /// Upload samples chunk by chunk. Every required column must be in the
    /// header, other columns are ignored. All rows are converted before the
    /// first chunk is sent, so a bad cell uploads nothing.
    pub async fn add_samples_with_progress(
        &self,
        table: &Table,
        progress: &mut dyn ProgressReporter,
    ) -> Result<usize> {
        let info = self.refresh().await?;
        let levels = self.levels_of(&info)?;
        let index = build_index_map(&levels, &table.columns)?;
        table.check_shape()?;
        if table.is_empty() {
            return Ok(0);
        }

        let chunks = prepare_chunks(&table.rows, self.config.chunk_size(), |chunk, first_row| {
            encode_rows(&levels, chunk, &index, first_row)
        })?;

        let backend = self.backend.as_ref();
        let project_id = self.id.as_str();
        let added = chunk_and_submit(&chunks, progress, move |tree| async move {
            backend.push_sample_tree_chunk(project_id, tree).await
        })
        .await?;

        log::info!("Added {} samples to project {}", added, self.id);
        Ok(added)
    }

    /// Every sample of the project as a table following the block structure
    pub async fn get_table(&self) -> Result<Table> {
        let info = self.refresh().await?;
        let levels = self.levels_of(&info)?;
        let page_size = self.config.page_size();

        let mut rows = Vec::new();
        let mut from = 0;
        loop {
            let page = self
                .backend
                .fetch_sample_page(&self.id, from, from + page_size)
                .await?;
            let fetched = count_leaves(&page);
            rows.extend(decode_tree(&levels, &page)?);
            log::debug!("Fetched samples {}..{}", from, from + fetched);
            if fetched < page_size {
                break;
            }
            from += page_size;
        }
        Table::new(schema_columns(&levels), rows)
    }

    /// Header row followed by every sample row
    pub async fn get_array(&self) -> Result<Vec<Vec<Value>>> {
        Ok(self.get_table().await?.to_array())
    }

    /// Append a `hash` column holding each row's sample hash
    pub async fn create_hash(&self, table: &mut Table, id_column: Option<&str>) -> Result<()> {
        let info = self.refresh().await?;
        let levels = self.levels_of(&info)?;
        table.check_shape()?;
        let hasher = SampleHasher::new(&levels, &table.columns, id_column)?;
        let hashes = hasher.hash_rows(&table.rows)?;
        table.set_column("hash", hashes.into_iter().map(Value::String).collect())
    }

    // Models

    fn model(&self, info: crate::model::ModelInfo) -> Model {
        Model::new(self.backend.clone(), self.config.clone(), self.id.clone(), info)
    }

    pub async fn get_models(&self) -> Result<Vec<Model>> {
        let info = self.refresh().await?;
        Ok(info.models.into_iter().map(|model| self.model(model)).collect())
    }

    pub async fn get_model(&self, name: &str) -> Result<Option<Model>> {
        let info = self.refresh().await?;
        Ok(info
            .models
            .into_iter()
            .find(|model| model.name == name)
            .map(|model| self.model(model)))
    }

    /// Create a model, or return the existing one when the name is taken
    pub async fn create_model(&self, name: &str) -> Result<Model> {
        if name.is_empty() {
            return Err(DebiaiError::validation(
                "Can't create the model: The model name is required",
            ));
        }
        match self.backend.create_model(&self.id, name, &Value::Null).await {
            Ok(info) => Ok(self.model(info)),
            Err(DebiaiError::Conflict(_)) => {
                log::warn!("The model {} already exists", name);
                self.get_model(name).await?.ok_or_else(|| {
                    DebiaiError::NotFound(format!("model '{}'", name))
                })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(DebiaiError::validation(
                "Can't delete the model: The model name is required",
            ));
        }
        let model = self.get_model(name).await?.ok_or_else(|| {
            DebiaiError::validation(format!("The model '{}' does not exist", name))
        })?;
        self.backend.delete_model(&self.id, model.id()).await?;
        log::info!("Deleted model: {}", model.id());
        Ok(())
    }

    // Selections

    pub async fn get_selections(&self) -> Result<Vec<Selection>> {
        let selections = self.backend.list_selections(&self.id).await?;
        Ok(selections
            .into_iter()
            .map(|info| Selection::new(self.backend.clone(), self.id.clone(), info))
            .collect())
    }

    pub async fn get_selection(&self, name: &str) -> Result<Option<Selection>> {
        Ok(self
            .get_selections()
            .await?
            .into_iter()
            .find(|selection| selection.name() == name))
    }

    /// Create a selection from sample hashes, all of which must exist
    pub async fn create_selection(&self, name: &str, sample_ids: &[String]) -> Result<Selection> {
        if name.is_empty() {
            return Err(DebiaiError::validation("The selection name is required"));
        }
        if sample_ids.is_empty() {
            return Err(DebiaiError::validation("The sample id list is required"));
        }

        let existing = self
            .backend
            .check_hashes_exist(&self.id, None, sample_ids)
            .await?;
        let missing: Vec<&String> = sample_ids
            .iter()
            .filter(|id| !existing.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(DebiaiError::validation(format!(
                "The samples {:?} do not exist",
                missing
            )));
        }

        let info = self
            .backend
            .create_selection(&self.id, name, sample_ids)
            .await?;
        log::info!("Created selection '{}' ({} samples)", info.name, info.sample_count);
        Ok(Selection::new(self.backend.clone(), self.id.clone(), info))
    }

    pub async fn delete_selection(&self, name: &str) -> Result<()> {
        let selection = self.get_selection(name).await?.ok_or_else(|| {
            DebiaiError::validation(format!("The selection '{}' does not exist", name))
        })?;
        self.backend
            .delete_selection(&self.id, selection.id())
            .await?;
        log::info!("Deleted selection: {}", selection.id());
        Ok(())
    }

    // Tags

    pub async fn get_tags(&self) -> Result<Vec<Tag>> {
        let tags = self.backend.list_tags(&self.id).await?;
        Ok(tags
            .into_iter()
            .map(|info| Tag::new(self.backend.clone(), self.id.clone(), info))
            .collect())
    }

    pub async fn get_tag(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self
            .get_tags()
            .await?
            .into_iter()
            .find(|tag| tag.name() == name))
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info.read();
        writeln!(f, "DebiAI project : {}", info.name)?;
        writeln!(f, "Creation date : {}", format_timestamp(info.created_at))?;
        writeln!(f, "Update date : {}", format_timestamp(info.updated_at))
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("info", &*self.info.read())
            .finish()
    }
}
