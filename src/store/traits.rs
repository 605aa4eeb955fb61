use crate::error::Result;
use crate::model::{
    BlockLevel, ExpectedResult, HashedResults, ModelInfo, ProjectInfo, ResultsPayload,
    SampleTree, SelectionInfo, TagInfo,
};

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    /// Whether the backend answers its health probe
    async fn check_online(&self) -> Result<bool>;
    async fn list_projects(&self) -> Result<Vec<ProjectInfo>>;
    /// Metadata of one project, `NotFound` when the id is unknown
    async fn fetch_project_metadata(&self, project_id: &str) -> Result<ProjectInfo>;
    async fn create_project(&self, name: &str) -> Result<ProjectInfo>;
    async fn delete_project(&self, project_id: &str) -> Result<()>;
    /// Bind the block structure; fails when one is already set
    async fn push_block_structure(&self, project_id: &str, levels: &[BlockLevel]) -> Result<()>;
    async fn push_expected_results(&self, project_id: &str, columns: &[ExpectedResult]) -> Result<()>;
    /// Append an expected result; stored result rows get its default appended
    async fn add_expected_result(&self, project_id: &str, column: &ExpectedResult) -> Result<()>;
    /// Drop an expected result along with its value in every stored result row
    async fn remove_expected_result(&self, project_id: &str, name: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SampleStore: Send + Sync {
    /// Upsert a block tree; a sample path already stored is replaced
    async fn push_sample_tree_chunk(&self, project_id: &str, tree: &[SampleTree]) -> Result<()>;
    /// Samples `from..to` in storage order, as a block tree
    async fn fetch_sample_page(&self, project_id: &str, from: usize, to: usize) -> Result<Vec<SampleTree>>;
    async fn fetch_selection_samples(&self, project_id: &str, selection_id: &str) -> Result<Vec<SampleTree>>;
    async fn fetch_tag_samples(
        &self,
        project_id: &str,
        tag_id: &str,
        tag_value: i64,
    ) -> Result<Vec<SampleTree>>;
}

#[async_trait::async_trait]
pub trait ModelStore: Send + Sync {
    /// Create a model, `Conflict` when the name is taken
    async fn create_model(&self, project_id: &str, name: &str, metadata: &serde_json::Value) -> Result<ModelInfo>;
    async fn delete_model(&self, project_id: &str, model_id: &str) -> Result<()>;
    /// Path-keyed results; last write wins per sample
    async fn push_results(&self, project_id: &str, model_id: &str, payload: &ResultsPayload) -> Result<()>;
    /// Hash-keyed results, values in expected results order
    async fn push_results_by_hash(&self, project_id: &str, model_id: &str, results: &HashedResults) -> Result<()>;
    /// Subset of `hashes` already known. Without a model these are the sample
    /// hashes of the project, with one the hashes holding a result for it.
    async fn check_hashes_exist(
        &self,
        project_id: &str,
        model_id: Option<&str>,
        hashes: &[String],
    ) -> Result<Vec<String>>;
}

#[async_trait::async_trait]
pub trait SelectionStore: Send + Sync {
    async fn list_selections(&self, project_id: &str) -> Result<Vec<SelectionInfo>>;
    async fn create_selection(&self, project_id: &str, name: &str, sample_hashes: &[String]) -> Result<SelectionInfo>;
    async fn delete_selection(&self, project_id: &str, selection_id: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait TagStore: Send + Sync {
    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>>;
    /// A tag with its sample hash to value map
    async fn get_tag(&self, project_id: &str, tag_id: &str) -> Result<TagInfo>;
}

pub trait Backend: ProjectStore + SampleStore + ModelStore + SelectionStore + TagStore + Send + Sync {}
