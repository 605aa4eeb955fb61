use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Rows converted and pushed per network call
    pub chunk_size: usize,
    /// Samples pulled per page when reading a project back
    pub page_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5000,
            page_size: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `debiai` config file and
    /// `DEBIAI_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("debiai").required(false));

        // DEBIAI_BACKEND__URL, DEBIAI_UPLOAD__CHUNK_SIZE, ...
        config = config.add_source(
            config::Environment::with_prefix("DEBIAI")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Config pointing at the given backend, everything else defaulted
    pub fn with_url(url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.backend.url = url.into();
        config
    }

    /// Backend base URL without its trailing slash
    pub fn backend_url(&self) -> crate::error::Result<String> {
        let url = self.backend.url.trim();
        if url.is_empty() {
            return Err(crate::error::DebiaiError::Config(
                "Backend url cannot be empty".to_string(),
            ));
        }
        Ok(url.strip_suffix('/').unwrap_or(url).to_string())
    }

    /// Chunk size clamped to at least one row
    pub fn chunk_size(&self) -> usize {
        self.upload.chunk_size.max(1)
    }

    pub fn page_size(&self) -> usize {
        self.upload.page_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_url_trailing_slash() {
        let config = AppConfig::with_url("http://localhost:3000/");
        assert_eq!(config.backend_url().unwrap(), "http://localhost:3000");

        let config = AppConfig::with_url("http://debiai.local");
        assert_eq!(config.backend_url().unwrap(), "http://debiai.local");
    }

    #[test]
    fn test_empty_url_rejected() {
        let config = AppConfig::with_url("  ");
        let err = config.backend_url().unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.upload.chunk_size, 5000);
        assert_eq!(config.backend.request_timeout_ms, 30_000);

        let mut config = config;
        config.upload.chunk_size = 0;
        assert_eq!(config.chunk_size(), 1);
    }
}
