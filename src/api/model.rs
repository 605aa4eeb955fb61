use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{DebiaiError, Result};
use crate::logic::{
    check_hashed_widths, check_result_tree, chunk_and_submit, prepare_chunks, reconcile,
    resolve_result_order, result_columns, results_to_tree, ColumnIndex, LogProgress,
    SampleHasher,
};
use crate::model::{
    format_timestamp, BlockLevel, ExpectedResult, HashedResults, ModelInfo, ProjectInfo,
    ReconcileOutcome, ResultTree, ResultsPayload, Table,
};
use crate::store::{Backend, ModelStore, ProjectStore};

/// A model of a project and its results
pub struct Model {
    backend: Arc<dyn Backend>,
    config: Arc<AppConfig>,
    project_id: String,
    info: ModelInfo,
}

/// Schema a results upload is checked against
struct ResultSchema {
    levels: Vec<BlockLevel>,
    expected: Vec<ExpectedResult>,
}

impl Model {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        config: Arc<AppConfig>,
        project_id: String,
        info: ModelInfo,
    ) -> Self {
        Self {
            backend,
            config,
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

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn schema(&self) -> Result<ResultSchema> {
        let info: ProjectInfo = self
            .backend
            .fetch_project_metadata(&self.project_id)
            .await?;
        if !info.has_block_structure() {
            return Err(DebiaiError::validation(format!(
                "The {} DebiAI project block_structure hasn't been set yet",
                info.name
            )));
        }
        let expected = info.expected_results().map(<[ExpectedResult]>::to_vec).ok_or_else(|| {
            DebiaiError::validation(
                "The project expected results need to be specified before doing this operation",
            )
        })?;
        Ok(ResultSchema {
            levels: info.block_structure,
            expected,
        })
    }

    /// Upload a result tree keyed by block names. `order` names the expected
    /// result held at each position of the value rows and defaults to the
    /// project's expected results order.
    pub async fn add_results_dict(&self, results: &ResultTree, order: Option<&[String]>) -> Result<()> {
        let schema = self.schema().await?;
        let order = resolve_result_order(&schema.expected, order)?;
        self.push_tree(&schema.levels, results, &order).await
    }

    async fn push_tree(&self, levels: &[BlockLevel], results: &ResultTree, order: &[String]) -> Result<()> {
        let payload = results_payload(levels, results.clone(), order)?;
        self.backend
            .push_results(&self.project_id, &self.info.id, &payload)
            .await
    }

    /// Upload results from a table holding the block name columns and one
    /// column per expected result. With `id_column` the sample level is read
    /// from that column. Every row is checked before the first chunk is sent.
    pub async fn add_results_table(&self, table: &Table, id_column: Option<&str>) -> Result<usize> {
        let schema = self.schema().await?;
        let order = resolve_result_order(&schema.expected, None)?;
        let index = ColumnIndex::resolve(&table.columns, &result_columns(&schema.levels, &order, id_column))?;
        table.check_shape()?;
        if table.is_empty() {
            return Ok(0);
        }

        let levels = schema.levels.as_slice();
        let chunks = prepare_chunks(&table.rows, self.config.chunk_size(), |chunk, first_row| {
            let tree = results_to_tree(levels, chunk, &index, &order, id_column, first_row)?;
            results_payload(levels, tree, &order)
        })?;

        let mut progress = LogProgress::new("Adding results");
        let backend = self.backend.as_ref();
        let (project_id, model_id) = (self.project_id.as_str(), self.info.id.as_str());
        let added = chunk_and_submit(&chunks, &mut progress, move |payload| async move {
            backend.push_results(project_id, model_id, payload).await
        })
        .await?;

        log::info!("Added {} results to model {}", added, self.info.name);
        Ok(added)
    }

    /// Upload results from a 2-D array whose first row holds the column labels
    pub async fn add_results_array(&self, array: Vec<Vec<Value>>, id_column: Option<&str>) -> Result<usize> {
        let table = Table::from_array(array)?;
        self.add_results_table(&table, id_column).await
    }

    /// Upload results keyed by sample hash, values in expected results order.
    /// Hashes already holding a result are left untouched and come back as
    /// rejected.
    pub async fn add_results_hash(&self, results: HashedResults) -> Result<ReconcileOutcome> {
        let schema = self.schema().await?;
        check_hashed_widths(&results, schema.expected.len())?;
        reconcile(self.backend.as_ref(), &self.project_id, &self.info.id, results).await
    }

    /// Hash every row of a table and reconcile its results chunk by chunk.
    /// All rows are hashed before the first chunk is reconciled.
    pub async fn add_results_table_by_hash(
        &self,
        table: &Table,
        id_column: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let schema = self.schema().await?;
        let order = resolve_result_order(&schema.expected, None)?;
        let index = ColumnIndex::resolve(&table.columns, &result_columns(&schema.levels, &order, id_column))?;
        let hasher = SampleHasher::new(&schema.levels, &table.columns, id_column)?;
        let positions = order
            .iter()
            .map(|name| index.position(name))
            .collect::<Result<Vec<_>>>()?;
        table.check_shape()?;

        let chunks = prepare_chunks(&table.rows, self.config.chunk_size(), |chunk, first_row| {
            let mut entries = HashedResults::with_capacity(chunk.len());
            for (offset, row) in chunk.iter().enumerate() {
                let row_number = first_row + offset;
                let hash = hasher.hash_row(row, row_number)?;
                let values = positions
                    .iter()
                    .map(|&p| {
                        row.get(p).cloned().ok_or_else(|| {
                            DebiaiError::validation(format!("Row {} is missing column {}", row_number, p))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                entries.insert(hash, values);
            }
            Ok(entries)
        })?;

        let outcome = Mutex::new(ReconcileOutcome::default());
        let mut progress = LogProgress::new("Adding results");
        let backend = self.backend.as_ref();
        let (project_id, model_id) = (self.project_id.as_str(), self.info.id.as_str());
        let outcome_ref = &outcome;
        chunk_and_submit(&chunks, &mut progress, move |entries| async move {
            let chunk_outcome = reconcile(backend, project_id, model_id, entries.clone()).await?;
            outcome_ref.lock().merge(chunk_outcome);
            Ok(())
        })
        .await?;

        let outcome = outcome.into_inner();
        log::info!(
            "Model {}: {} results uploaded, {} already present",
            self.info.name,
            outcome.uploaded.len(),
            outcome.rejected.len()
        );
        Ok(outcome)
    }
}

/// Check a result tree against the schema and wrap it for upload
fn results_payload(levels: &[BlockLevel], results: ResultTree, order: &[String]) -> Result<ResultsPayload> {
    check_result_tree(&results, levels.len() - 1, order.len())?;
    Ok(ResultsPayload {
        results,
        expected_results_order: order.to_vec(),
    })
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DebiAI model : {}", self.info.name)?;
        writeln!(f, "Creation date : {}", format_timestamp(self.info.created_at))
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("project_id", &self.project_id)
            .field("info", &self.info)
            .finish()
    }
}
