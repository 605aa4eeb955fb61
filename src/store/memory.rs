use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DebiaiError, Result};
use crate::logic::{
    check_hashed_widths, check_result_tree, compute_sample_hash, expected_result_position,
    patch_rows_on_add, patch_rows_on_remove, reorder_row, resolve_result_order, sample_path,
    validate_block_levels, validate_expected_results, validate_new_expected_result,
};
use crate::model::{
    now_millis, BlockLevel, ExpectedResult, HashedResults, ModelInfo, ProjectInfo, ResultNode,
    ResultsPayload, SampleTree, SelectionInfo, TagInfo,
};
use crate::store::traits::{Backend, ModelStore, ProjectStore, SampleStore, SelectionStore, TagStore};

/// Backend keeping everything in process memory.
///
/// Samples are stored by content hash, results by model then sample hash.
/// Storage order is insertion order; re-pushing a sample replaces it in place.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<IndexMap<String, ProjectRecord>>,
}

#[derive(Debug, Clone)]
struct StoredSample {
    path: Vec<String>,
    /// Detached nodes from the root block down to the sample
    chain: Vec<SampleTree>,
}

#[derive(Debug, Clone)]
struct ModelRecord {
    info: ModelInfo,
    results: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Clone)]
struct SelectionRecord {
    info: SelectionInfo,
    samples: Vec<String>,
}

#[derive(Debug, Clone)]
struct ProjectRecord {
    id: String,
    name: String,
    created_at: i64,
    updated_at: i64,
    block_structure: Vec<BlockLevel>,
    expected_results: Option<Vec<ExpectedResult>>,
    samples: IndexMap<String, StoredSample>,
    models: IndexMap<String, ModelRecord>,
    selections: IndexMap<String, SelectionRecord>,
    tags: IndexMap<String, TagInfo>,
}

impl ProjectRecord {
    fn new(name: &str) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            block_structure: Vec::new(),
            expected_results: None,
            samples: IndexMap::new(),
            models: IndexMap::new(),
            selections: IndexMap::new(),
            tags: IndexMap::new(),
        }
    }

    fn info(&self) -> ProjectInfo {
        ProjectInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            block_structure: self.block_structure.clone(),
            expected_results: self.expected_results.clone(),
            models: self.models.values().map(ModelRecord::info).collect(),
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            sample_count: Some(self.samples.len() as u64),
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    fn levels(&self) -> Result<&[BlockLevel]> {
        if self.block_structure.is_empty() {
            return Err(DebiaiError::validation(format!(
                "The {} project block_structure hasn't been set yet",
                self.name
            )));
        }
        Ok(&self.block_structure)
    }

    fn expected(&self) -> Result<&[ExpectedResult]> {
        self.expected_results.as_deref().ok_or_else(|| {
            DebiaiError::validation(format!(
                "The {} project expected_results haven't been set yet",
                self.name
            ))
        })
    }

    fn model_mut(&mut self, model_id: &str) -> Result<&mut ModelRecord> {
        self.models
            .get_mut(model_id)
            .ok_or_else(|| DebiaiError::NotFound(format!("model '{}'", model_id)))
    }

    /// Upsert samples by path. Ancestor blocks are shared between samples, so
    /// the nodes of the written chains replace those of every stored sample
    /// under the same block; the last write wins at every level.
    fn store_samples(&mut self, samples: Vec<StoredSample>) {
        let mut ancestors: HashMap<Vec<String>, SampleTree> = HashMap::new();
        for sample in &samples {
            for depth in 0..sample.chain.len().saturating_sub(1) {
                ancestors.insert(sample.path[..=depth].to_vec(), sample.chain[depth].clone());
            }
        }
        for sample in samples {
            self.samples.insert(compute_sample_hash(&sample.path), sample);
        }
        if ancestors.is_empty() {
            return;
        }
        for stored in self.samples.values_mut() {
            for depth in 0..stored.chain.len().saturating_sub(1) {
                if let Some(node) = ancestors.get(&stored.path[..=depth]) {
                    stored.chain[depth] = node.clone();
                }
            }
        }
    }

    fn ensure_sample(&self, hash: &str, label: &str) -> Result<()> {
        if self.samples.contains_key(hash) {
            Ok(())
        } else {
            Err(DebiaiError::validation(format!(
                "in : {}, the sample does not exist",
                label
            )))
        }
    }
}

impl ModelRecord {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            result_count: Some(self.results.len() as u64),
            ..self.info.clone()
        }
    }
}

/// Rebuilds block trees from stored sample chains
#[derive(Default)]
struct Assembly {
    nodes: IndexMap<String, (SampleTree, Assembly)>,
}

impl Assembly {
    fn insert(&mut self, chain: &[SampleTree]) {
        if let Some((first, rest)) = chain.split_first() {
            let (_, children) = self
                .nodes
                .entry(first.name.clone())
                .or_insert_with(|| (first.clone(), Assembly::default()));
            children.insert(rest);
        }
    }

    fn into_trees(self) -> Vec<SampleTree> {
        self.nodes
            .into_values()
            .map(|(mut node, children)| {
                if !children.nodes.is_empty() {
                    node.children_info_list = Some(children.into_trees());
                }
                node
            })
            .collect()
    }
}

fn assemble<'a>(samples: impl IntoIterator<Item = &'a StoredSample>) -> Vec<SampleTree> {
    let mut assembly = Assembly::default();
    for sample in samples {
        assembly.insert(&sample.chain);
    }
    assembly.into_trees()
}

/// Split a pushed tree into one chain per sample, checking it against the
/// block structure
fn collect_samples(levels: &[BlockLevel], tree: &[SampleTree]) -> Result<Vec<StoredSample>> {
    fn visit(
        levels: &[BlockLevel],
        node: &SampleTree,
        depth: usize,
        chain: &mut Vec<SampleTree>,
        out: &mut Vec<StoredSample>,
    ) -> Result<()> {
        chain.push(node.detached());
        let path: Vec<String> = chain.iter().map(|n| n.name.clone()).collect();

        let Some(level) = levels.get(depth) else {
            return Err(DebiaiError::validation(format!(
                "in : {}, the tree is deeper than the block structure",
                path.join(" / ")
            )));
        };
        for (group, columns) in level.declared_groups() {
            let given = node.values(group).map(Vec::len).unwrap_or(0);
            if given != columns.len() {
                return Err(DebiaiError::validation(format!(
                    "in : {}, {} {} values were given but {} were expected",
                    path.join(" / "),
                    given,
                    group,
                    columns.len()
                )));
            }
        }

        if depth + 1 == levels.len() {
            out.push(StoredSample {
                path,
                chain: chain.clone(),
            });
        } else if node.is_leaf() {
            return Err(DebiaiError::validation(format!(
                "in : {}, the block has no children",
                path.join(" / ")
            )));
        } else {
            for child in node.children() {
                visit(levels, child, depth + 1, chain, out)?;
            }
        }
        chain.pop();
        Ok(())
    }

    let mut out = Vec::new();
    let mut chain = Vec::with_capacity(levels.len());
    for node in tree {
        visit(levels, node, 0, &mut chain, &mut out)?;
    }
    Ok(out)
}

/// Flatten a result tree into `(path, values)` pairs
fn collect_results(tree: &IndexMap<String, ResultNode>, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, Vec<Value>)>) {
    for (name, node) in tree {
        prefix.push(name.clone());
        match node {
            ResultNode::Values(values) => out.push((prefix.clone(), values.clone())),
            ResultNode::Blocks(children) => collect_results(children, prefix, out),
        }
        prefix.pop();
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_project<T>(&self, project_id: &str, f: impl FnOnce(&mut ProjectRecord) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let project = state
            .get_mut(project_id)
            .ok_or_else(|| DebiaiError::NotFound(format!("project '{}'", project_id)))?;
        f(project)
    }

    /// Stored results of a model keyed by slash-joined sample path, values in
    /// expected results order
    pub fn model_results(&self, project_id: &str, model_id: &str) -> Result<IndexMap<String, Vec<Value>>> {
        self.with_project(project_id, |project| {
            let model = project
                .models
                .get(model_id)
                .ok_or_else(|| DebiaiError::NotFound(format!("model '{}'", model_id)))?;
            Ok(model
                .results
                .iter()
                .map(|(hash, values)| {
                    let path = project
                        .samples
                        .get(hash)
                        .map(|sample| sample_path(&sample.path))
                        .unwrap_or_else(|| hash.clone());
                    (path, values.clone())
                })
                .collect())
        })
    }

    /// Create a tag mapping sample hashes to integer values
    pub fn add_tag(&self, project_id: &str, name: &str, tags: IndexMap<String, i64>) -> Result<TagInfo> {
        self.with_project(project_id, |project| {
            let now = now_millis();
            let tag = TagInfo {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                created_at: Some(now),
                updated_at: Some(now),
                tags: Some(tags),
            };
            project.tags.insert(tag.id.clone(), tag.clone());
            project.touch();
            Ok(tag)
        })
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryBackend {
    async fn check_online(&self) -> Result<bool> {
        Ok(true)
    }

    async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        Ok(self.state.lock().values().map(ProjectRecord::info).collect())
    }

    async fn fetch_project_metadata(&self, project_id: &str) -> Result<ProjectInfo> {
        self.with_project(project_id, |project| Ok(project.info()))
    }

    async fn create_project(&self, name: &str) -> Result<ProjectInfo> {
        let mut state = self.state.lock();
        if state.values().any(|project| project.name == name) {
            return Err(DebiaiError::Conflict(format!(
                "A project named '{}' already exists",
                name
            )));
        }
        let project = ProjectRecord::new(name);
        let info = project.info();
        state.insert(project.id.clone(), project);
        Ok(info)
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.state
            .lock()
            .shift_remove(project_id)
            .map(|_| ())
            .ok_or_else(|| DebiaiError::NotFound(format!("project '{}'", project_id)))
    }

    async fn push_block_structure(&self, project_id: &str, levels: &[BlockLevel]) -> Result<()> {
        validate_block_levels(levels)?;
        self.with_project(project_id, |project| {
            if !project.block_structure.is_empty() {
                return Err(DebiaiError::schema(format!(
                    "The {} project block structure is already set",
                    project.name
                )));
            }
            project.block_structure = levels.to_vec();
            project.touch();
            Ok(())
        })
    }

    async fn push_expected_results(&self, project_id: &str, columns: &[ExpectedResult]) -> Result<()> {
        validate_expected_results(columns)?;
        self.with_project(project_id, |project| {
            if project.expected_results.as_ref().is_some_and(|e| !e.is_empty()) {
                return Err(DebiaiError::schema(format!(
                    "The {} project expected results are already set",
                    project.name
                )));
            }
            project.expected_results = Some(columns.to_vec());
            project.touch();
            Ok(())
        })
    }

    async fn add_expected_result(&self, project_id: &str, column: &ExpectedResult) -> Result<()> {
        self.with_project(project_id, |project| {
            let expected = project.expected()?;
            validate_new_expected_result(expected, column)?;
            let default = column.default_value().unwrap_or(Value::Null);

            for model in project.models.values_mut() {
                patch_rows_on_add(model.results.values_mut(), &default);
            }
            project
                .expected_results
                .get_or_insert_with(Vec::new)
                .push(column.clone());
            project.touch();
            Ok(())
        })
    }

    async fn remove_expected_result(&self, project_id: &str, name: &str) -> Result<()> {
        self.with_project(project_id, |project| {
            let Some(position) = expected_result_position(project.expected()?, name) else {
                log::warn!("The expected result '{}' does not exist, nothing removed", name);
                return Ok(());
            };

            let remaining = project.expected_results.as_mut().map_or(0, |expected| {
                expected.remove(position);
                expected.len()
            });
            for model in project.models.values_mut() {
                if remaining == 0 {
                    model.results.clear();
                } else {
                    patch_rows_on_remove(model.results.values_mut(), position);
                }
            }
            if remaining == 0 {
                project.expected_results = None;
            }
            project.touch();
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl SampleStore for MemoryBackend {
    async fn push_sample_tree_chunk(&self, project_id: &str, tree: &[SampleTree]) -> Result<()> {
        self.with_project(project_id, |project| {
            let samples = collect_samples(project.levels()?, tree)?;
            project.store_samples(samples);
            project.touch();
            Ok(())
        })
    }

    async fn fetch_sample_page(&self, project_id: &str, from: usize, to: usize) -> Result<Vec<SampleTree>> {
        self.with_project(project_id, |project| {
            Ok(assemble(
                project
                    .samples
                    .values()
                    .skip(from)
                    .take(to.saturating_sub(from)),
            ))
        })
    }

    async fn fetch_selection_samples(&self, project_id: &str, selection_id: &str) -> Result<Vec<SampleTree>> {
        self.with_project(project_id, |project| {
            let selection = project
                .selections
                .get(selection_id)
                .ok_or_else(|| DebiaiError::NotFound(format!("selection '{}'", selection_id)))?;
            Ok(assemble(
                selection
                    .samples
                    .iter()
                    .filter_map(|hash| project.samples.get(hash)),
            ))
        })
    }

    async fn fetch_tag_samples(
        &self,
        project_id: &str,
        tag_id: &str,
        tag_value: i64,
    ) -> Result<Vec<SampleTree>> {
        self.with_project(project_id, |project| {
            let tag = project
                .tags
                .get(tag_id)
                .ok_or_else(|| DebiaiError::NotFound(format!("tag '{}'", tag_id)))?;
            let tagged = tag.tags.as_ref();
            Ok(assemble(project.samples.iter().filter_map(|(hash, sample)| {
                tagged
                    .and_then(|tags| tags.get(hash))
                    .filter(|value| **value == tag_value)
                    .map(|_| sample)
            })))
        })
    }
}

#[async_trait::async_trait]
impl ModelStore for MemoryBackend {
    async fn create_model(&self, project_id: &str, name: &str, metadata: &Value) -> Result<ModelInfo> {
        self.with_project(project_id, |project| {
            if project.models.values().any(|model| model.info.name == name) {
                return Err(DebiaiError::Conflict(format!(
                    "The model {} already exists",
                    name
                )));
            }
            let info = ModelInfo {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                metadata: metadata.clone(),
                result_count: None,
                created_at: Some(now_millis()),
            };
            project.models.insert(
                info.id.clone(),
                ModelRecord {
                    info: info.clone(),
                    results: IndexMap::new(),
                },
            );
            project.touch();
            Ok(info)
        })
    }

    async fn delete_model(&self, project_id: &str, model_id: &str) -> Result<()> {
        self.with_project(project_id, |project| {
            project
                .models
                .shift_remove(model_id)
                .ok_or_else(|| DebiaiError::NotFound(format!("model '{}'", model_id)))?;
            project.touch();
            Ok(())
        })
    }

    async fn push_results(&self, project_id: &str, model_id: &str, payload: &ResultsPayload) -> Result<()> {
        self.with_project(project_id, |project| {
            let sample_level = project.levels()?.len() - 1;
            let expected = project.expected()?.to_vec();
            let order = resolve_result_order(&expected, Some(payload.expected_results_order.as_slice()))?;
            check_result_tree(&payload.results, sample_level, order.len())?;

            let mut rows = Vec::new();
            collect_results(&payload.results, &mut Vec::new(), &mut rows);
            let mut keyed = Vec::with_capacity(rows.len());
            for (path, values) in rows {
                let hash = compute_sample_hash(&path);
                project.ensure_sample(&hash, &path.join(" / "))?;
                keyed.push((hash, reorder_row(&values, &order, &expected)));
            }

            let model = project.model_mut(model_id)?;
            model.results.extend(keyed);
            project.touch();
            Ok(())
        })
    }

    async fn push_results_by_hash(&self, project_id: &str, model_id: &str, results: &HashedResults) -> Result<()> {
        self.with_project(project_id, |project| {
            check_hashed_widths(results, project.expected()?.len())?;
            for hash in results.keys() {
                project.ensure_sample(hash, hash)?;
            }
            let model = project.model_mut(model_id)?;
            model
                .results
                .extend(results.iter().map(|(hash, values)| (hash.clone(), values.clone())));
            project.touch();
            Ok(())
        })
    }

    async fn check_hashes_exist(
        &self,
        project_id: &str,
        model_id: Option<&str>,
        hashes: &[String],
    ) -> Result<Vec<String>> {
        self.with_project(project_id, |project| {
            let known = |hash: &String| match model_id {
                Some(model_id) => project
                    .models
                    .get(model_id)
                    .map(|model| model.results.contains_key(hash))
                    .ok_or_else(|| DebiaiError::NotFound(format!("model '{}'", model_id))),
                None => Ok(project.samples.contains_key(hash)),
            };
            let mut existing = Vec::new();
            for hash in hashes {
                if known(hash)? {
                    existing.push(hash.clone());
                }
            }
            Ok(existing)
        })
    }
}

#[async_trait::async_trait]
impl SelectionStore for MemoryBackend {
    async fn list_selections(&self, project_id: &str) -> Result<Vec<SelectionInfo>> {
        self.with_project(project_id, |project| {
            Ok(project
                .selections
                .values()
                .map(|selection| selection.info.clone())
                .collect())
        })
    }

    async fn create_selection(&self, project_id: &str, name: &str, sample_hashes: &[String]) -> Result<SelectionInfo> {
        self.with_project(project_id, |project| {
            let missing: Vec<&str> = sample_hashes
                .iter()
                .filter(|hash| !project.samples.contains_key(hash.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(DebiaiError::validation(format!(
                    "The samples {:?} do not exist",
                    missing
                )));
            }

            let samples: Vec<String> = sample_hashes
                .iter()
                .cloned()
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect();
            let info = SelectionInfo {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                created_at: Some(now_millis()),
                sample_count: samples.len() as u64,
                request_id: None,
            };
            project.selections.insert(
                info.id.clone(),
                SelectionRecord {
                    info: info.clone(),
                    samples,
                },
            );
            project.touch();
            Ok(info)
        })
    }

    async fn delete_selection(&self, project_id: &str, selection_id: &str) -> Result<()> {
        self.with_project(project_id, |project| {
            project
                .selections
                .shift_remove(selection_id)
                .ok_or_else(|| DebiaiError::NotFound(format!("selection '{}'", selection_id)))?;
            project.touch();
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl TagStore for MemoryBackend {
    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>> {
        self.with_project(project_id, |project| {
            Ok(project
                .tags
                .values()
                .map(|tag| TagInfo {
                    tags: None,
                    ..tag.clone()
                })
                .collect())
        })
    }

    async fn get_tag(&self, project_id: &str, tag_id: &str) -> Result<TagInfo> {
        self.with_project(project_id, |project| {
            project
                .tags
                .get(tag_id)
                .cloned()
                .ok_or_else(|| DebiaiError::NotFound(format!("tag '{}'", tag_id)))
        })
    }
}

impl Backend for MemoryBackend {}
