use std::sync::Arc;

use crate::api::Project;
use crate::config::AppConfig;
use crate::error::{DebiaiError, Result};
use crate::store::{Backend, HttpBackend, ProjectStore};

/// Entry point: a backend connection plus the configuration it was built with
#[derive(Clone)]
pub struct Debiai {
    backend: Arc<dyn Backend>,
    config: Arc<AppConfig>,
}

impl Debiai {
    /// Connect to the HTTP backend named by `config`, failing when it does not
    /// answer its health check
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let backend = HttpBackend::from_config(&config)?;
        let online = match backend.check_online().await {
            Ok(online) => online,
            Err(err) if err.is_transport() => false,
            Err(err) => return Err(err),
        };
        if !online {
            log::warn!("Backend is down");
            return Err(DebiaiError::Transport(format!(
                "Unable to connect to the DebiAI backend at the url : {}",
                config.backend.url
            )));
        }
        log::info!("DebiAI server is up at {}", backend.base_url());
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: AppConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    fn project(&self, info: crate::model::ProjectInfo) -> Project {
        Project::new(self.backend.clone(), self.config.clone(), info)
    }

    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        let projects = self.backend.list_projects().await?;
        Ok(projects.into_iter().map(|info| self.project(info)).collect())
    }

    /// The project with this id, `None` when the backend does not know it
    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        match self.backend.fetch_project_metadata(project_id).await {
            Ok(info) => Ok(Some(self.project(info))),
            Err(DebiaiError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn create_project(&self, name: &str) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(DebiaiError::validation("Project name cannot be empty"));
        }
        let info = self.backend.create_project(name).await?;
        log::info!("Created project '{}' ({})", info.name, info.id);
        Ok(self.project(info))
    }

    pub async fn delete_project(&self, project: &Project) -> Result<()> {
        self.delete_project_by_id(project.id()).await
    }

    pub async fn delete_project_by_id(&self, project_id: &str) -> Result<()> {
        if project_id.is_empty() {
            return Err(DebiaiError::validation("The project id cannot be empty"));
        }
        self.backend.delete_project(project_id).await?;
        log::info!("Deleted project: {}", project_id);
        Ok(())
    }
}

impl std::fmt::Debug for Debiai {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debiai")
            .field("url", &self.config.backend.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn client() -> Debiai {
        Debiai::with_backend(Arc::new(MemoryBackend::new()), AppConfig::default())
    }

    #[tokio::test]
    async fn test_project_lifecycle() {
        let debiai = client();
        let project = debiai.create_project("wine").await.unwrap();
        assert_eq!(project.name(), "wine");

        let fetched = debiai.get_project(project.id()).await.unwrap().unwrap();
        assert_eq!(fetched.name(), "wine");
        assert_eq!(debiai.get_projects().await.unwrap().len(), 1);

        debiai.delete_project(&project).await.unwrap();
        assert!(debiai.get_project(project.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_names_rejected() {
        let debiai = client();
        let err = debiai.create_project("  ").await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Project name cannot be empty");
        let err = debiai.delete_project_by_id("").await.unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_backend() {
        let mut config = AppConfig::with_url("http://127.0.0.1:9/");
        config.backend.connect_timeout_ms = 200;
        config.backend.request_timeout_ms = 500;
        let err = Debiai::connect(config).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err
            .to_string()
            .contains("Unable to connect to the DebiAI backend at the url : http://127.0.0.1:9/"));
    }
}
