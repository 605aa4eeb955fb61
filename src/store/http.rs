use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::{DebiaiError, Result};
use crate::model::{
    BlockLevel, ExpectedResult, HashedResults, ModelInfo, ProjectInfo, ResultsPayload,
    SampleTree, SelectionInfo, TagInfo,
};
use crate::store::traits::{Backend, ModelStore, ProjectStore, SampleStore, SelectionStore, TagStore};

const DATA_PROVIDER_ID: &str = "Python module Data Provider";

/// Backend reached over its JSON HTTP API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

#[derive(Deserialize)]
struct CreatedProject {
    id: String,
}

impl HttpBackend {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config.backend_url()?;
        let base = Url::parse(&url)
            .map_err(|e| DebiaiError::Config(format!("Invalid backend url '{}': {}", url, e)))?;
        if base.cannot_be_a_base() {
            return Err(DebiaiError::Config(format!(
                "Invalid backend url '{}'",
                url
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.backend.connect_timeout_ms))
            .timeout(Duration::from_millis(config.backend.request_timeout_ms))
            .build()
            .map_err(|e| DebiaiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DebiaiError::Config(format!("Invalid backend url '{}'", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn project_url(&self, project_id: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["data-providers", DATA_PROVIDER_ID, "projects", project_id];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    /// Send a request and return the body of a successful answer
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }
        let message = error_message(&body);
        Err(match status {
            StatusCode::NOT_FOUND => DebiaiError::NotFound(format!("{}: {}", what, message)),
            StatusCode::CONFLICT => DebiaiError::Conflict(format!("{}: {}", what, message)),
            _ => DebiaiError::Backend {
                status: status.as_u16(),
                message: format!("{}: {}", what, message),
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let body = self.send(request, what).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_tree(&self, url: Url, what: &str) -> Result<Vec<SampleTree>> {
        self.send_json(self.request(Method::GET, url), what).await
    }
}

/// Backends answer errors with a JSON string, an object or plain text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(message)) => message,
        Ok(Value::Object(object)) => object
            .get("message")
            .or_else(|| object.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.trim().to_string(),
    }
}

#[async_trait::async_trait]
impl ProjectStore for HttpBackend {
    async fn check_online(&self) -> Result<bool> {
        let version = self
            .send(self.request(Method::GET, self.url(&["version"])?), "version")
            .await;
        if matches!(&version, Ok(body) if body.contains("Online")) {
            return Ok(true);
        }
        let root = self.send(self.request(Method::GET, self.base.clone()), "status").await;
        match root {
            Ok(body) => Ok(body.contains("Online")),
            Err(err) if err.is_transport() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let url = self.url(&["data-providers", DATA_PROVIDER_ID, "projects"])?;
        self.send_json(self.request(Method::GET, url), "list projects").await
    }

    async fn fetch_project_metadata(&self, project_id: &str) -> Result<ProjectInfo> {
        let url = self.project_url(project_id, &[])?;
        self.send_json(self.request(Method::GET, url), &format!("project '{}'", project_id))
            .await
    }

    async fn create_project(&self, name: &str) -> Result<ProjectInfo> {
        let request = self
            .request(Method::POST, self.url(&["projects"])?)
            .json(&json!({ "projectName": name }));
        let created: CreatedProject = self.send_json(request, "create project").await?;
        log::info!("Created project '{}'", created.id);
        self.fetch_project_metadata(&created.id).await
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        let url = self.project_url(project_id, &[])?;
        self.send(self.request(Method::DELETE, url), &format!("delete project '{}'", project_id))
            .await?;
        Ok(())
    }

    async fn push_block_structure(&self, project_id: &str, levels: &[BlockLevel]) -> Result<()> {
        let request = self
            .request(Method::POST, self.project_url(project_id, &["blocklevels"])?)
            .json(levels);
        self.send(request, "set block structure").await?;
        Ok(())
    }

    async fn push_expected_results(&self, project_id: &str, columns: &[ExpectedResult]) -> Result<()> {
        let request = self
            .request(Method::POST, self.project_url(project_id, &["resultsStructure"])?)
            .json(columns);
        self.send(request, "set expected results").await?;
        Ok(())
    }

    async fn add_expected_result(&self, project_id: &str, column: &ExpectedResult) -> Result<()> {
        let url = self.project_url(project_id, &["resultsStructure", "add"])?;
        self.send(self.request(Method::POST, url).json(column), "add expected result")
            .await?;
        Ok(())
    }

    async fn remove_expected_result(&self, project_id: &str, name: &str) -> Result<()> {
        let url = self.project_url(project_id, &["resultsStructure", "column", name])?;
        self.send(self.request(Method::DELETE, url), "remove expected result")
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SampleStore for HttpBackend {
    async fn push_sample_tree_chunk(&self, project_id: &str, tree: &[SampleTree]) -> Result<()> {
        let request = self
            .request(Method::POST, self.project_url(project_id, &["blocks"])?)
            .json(&json!({ "blockTree": tree }));
        self.send(request, "add samples").await?;
        Ok(())
    }

    async fn fetch_sample_page(&self, project_id: &str, from: usize, to: usize) -> Result<Vec<SampleTree>> {
        let mut url = self.project_url(project_id, &["blocks"])?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_string())
            .append_pair("to", &to.to_string());
        self.fetch_tree(url, "get samples").await
    }

    async fn fetch_selection_samples(&self, project_id: &str, selection_id: &str) -> Result<Vec<SampleTree>> {
        let mut url = self.project_url(project_id, &["blocks", selection_id])?;
        url.query_pairs_mut().append_pair("depth", "0");
        self.fetch_tree(url, &format!("selection '{}'", selection_id))
            .await
    }

    async fn fetch_tag_samples(
        &self,
        project_id: &str,
        tag_id: &str,
        tag_value: i64,
    ) -> Result<Vec<SampleTree>> {
        let value = tag_value.to_string();
        let url = self.project_url(project_id, &["tags", tag_id, "samples", &value])?;
        self.fetch_tree(url, &format!("tag '{}'", tag_id)).await
    }
}

#[async_trait::async_trait]
impl ModelStore for HttpBackend {
    async fn create_model(&self, project_id: &str, name: &str, metadata: &Value) -> Result<ModelInfo> {
        let request = self
            .request(Method::POST, self.project_url(project_id, &["models"])?)
            .json(&json!({ "name": name, "metadata": metadata }));
        self.send(request, &format!("create model '{}'", name)).await?;
        Ok(ModelInfo {
            id: name.to_string(),
            name: name.to_string(),
            metadata: metadata.clone(),
            ..Default::default()
        })
    }

    async fn delete_model(&self, project_id: &str, model_id: &str) -> Result<()> {
        let url = self.project_url(project_id, &["models", model_id])?;
        self.send(self.request(Method::DELETE, url), &format!("delete model '{}'", model_id))
            .await?;
        Ok(())
    }

    async fn push_results(&self, project_id: &str, model_id: &str, payload: &ResultsPayload) -> Result<()> {
        let url = self.project_url(project_id, &["models", model_id, "resultsDict"])?;
        self.send(self.request(Method::POST, url).json(payload), "add results")
            .await?;
        Ok(())
    }

    async fn push_results_by_hash(&self, project_id: &str, model_id: &str, results: &HashedResults) -> Result<()> {
        let url = self.project_url(project_id, &["models", model_id, "resultsHash"])?;
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "results": results }));
        self.send(request, "add hashed results").await?;
        Ok(())
    }

    async fn check_hashes_exist(
        &self,
        project_id: &str,
        model_id: Option<&str>,
        hashes: &[String],
    ) -> Result<Vec<String>> {
        let mut body = json!({ "hash_list": hashes });
        if let Some(model_id) = model_id {
            body["model_id"] = Value::String(model_id.to_string());
        }
        let request = self
            .request(Method::POST, self.project_url(project_id, &["check_hash"])?)
            .json(&body);
        self.send_json(request, "check hashes").await
    }
}

#[async_trait::async_trait]
impl SelectionStore for HttpBackend {
    async fn list_selections(&self, project_id: &str) -> Result<Vec<SelectionInfo>> {
        let url = self.project_url(project_id, &["selections"])?;
        self.send_json(self.request(Method::GET, url), "list selections").await
    }

    async fn create_selection(&self, project_id: &str, name: &str, sample_hashes: &[String]) -> Result<SelectionInfo> {
        let request = self
            .request(Method::POST, self.project_url(project_id, &["selections"])?)
            .json(&json!({ "selectionName": name, "sampleHashList": sample_hashes }));
        self.send_json(request, &format!("create selection '{}'", name))
            .await
    }

    async fn delete_selection(&self, project_id: &str, selection_id: &str) -> Result<()> {
        let url = self.project_url(project_id, &["selections", selection_id])?;
        self.send(self.request(Method::DELETE, url), &format!("delete selection '{}'", selection_id))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TagStore for HttpBackend {
    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>> {
        let url = self.project_url(project_id, &["tags"])?;
        self.send_json(self.request(Method::GET, url), "list tags").await
    }

    async fn get_tag(&self, project_id: &str, tag_id: &str) -> Result<TagInfo> {
        let url = self.project_url(project_id, &["tags", tag_id])?;
        self.send_json(self.request(Method::GET, url), &format!("tag '{}'", tag_id))
            .await
    }
}

impl Backend for HttpBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_urls_are_encoded() {
        let backend = HttpBackend::from_config(&AppConfig::with_url("http://localhost:3000/")).unwrap();
        let url = backend.project_url("my project", &["models", "m/1", "resultsDict"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/data-providers/Python%20module%20Data%20Provider/projects/my%20project/models/m%2F1/resultsDict"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let backend = HttpBackend::from_config(&AppConfig::with_url("http://host/debiai/")).unwrap();
        assert_eq!(backend.url(&["version"]).unwrap().as_str(), "http://host/debiai/version");
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = HttpBackend::from_config(&AppConfig::with_url("not a url")).unwrap_err();
        assert!(matches!(err, DebiaiError::Config(_)));
        let err = HttpBackend::from_config(&AppConfig::with_url("  ")).unwrap_err();
        assert!(matches!(err, DebiaiError::Config(_)));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message("\"Project not found\""), "Project not found");
        assert_eq!(error_message("{\"message\": \"nope\"}"), "nope");
        assert_eq!(error_message(" plain text \n"), "plain text");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_offline() {
        let mut config = AppConfig::with_url("http://127.0.0.1:9/");
        config.backend.connect_timeout_ms = 200;
        config.backend.request_timeout_ms = 500;
        let backend = HttpBackend::from_config(&config).unwrap();
        assert!(!backend.check_online().await.unwrap());
    }
}
