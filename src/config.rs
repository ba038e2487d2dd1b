//! Configuration for the pdfstract engine and its built-in backends.
//!
//! All knobs live in [`StractConfig`], built via [`StractConfigBuilder`].
//! Setters clamp obviously out-of-range values; [`StractConfigBuilder::build`]
//! rejects combinations that cannot work.

use crate::error::StractError;
use crate::progress::BatchProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Engine configuration.
///
/// # Example
/// ```rust
/// use pdfstract::StractConfig;
///
/// let config = StractConfig::builder()
///     .workers(4)
///     .process_timeout_secs(300)
///     .mineru_backend("pipeline")
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct StractConfig {
    /// Default batch worker count. Default: 2.
    pub workers: usize,

    /// Hard timeout for backends that run an external process, in seconds. Default: 600.
    pub process_timeout_secs: u64,

    /// MinerU executable name or path. Default: `mineru`.
    pub mineru_binary: String,

    /// MinerU `-b` mode (`pipeline`, `vlm-transformers`, …). Default: `pipeline`.
    pub mineru_backend: String,

    /// LLM provider name for the `vlm` backend (e.g. "openai", "ollama").
    /// `None` auto-detects from the environment.
    pub vlm_provider_name: Option<String>,

    /// Pre-constructed provider; takes precedence over `vlm_provider_name`.
    pub vlm_provider: Option<Arc<dyn LLMProvider>>,

    /// Model identifier for the `vlm` backend.
    pub vlm_model: Option<String>,

    /// Max tokens per page for the `vlm` backend. Default: 4096.
    pub vlm_max_tokens: usize,

    /// Sampling temperature for the `vlm` backend. Default: 0.1.
    pub vlm_temperature: f32,

    /// Concurrent page requests inside one `vlm` conversion. Default: 4.
    pub vlm_page_concurrency: usize,

    /// Rendering DPI for `vlm` page images. Range 72–400. Default: 150.
    pub vlm_dpi: u32,

    /// Retries per page on transient model failures. Default: 3.
    pub vlm_max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt). Default: 500.
    pub vlm_retry_backoff_ms: u64,

    /// Override for the artifact cache root (PDFium library).
    pub cache_dir: Option<PathBuf>,

    /// Location of the JSON enablement file. `None` uses the platform default.
    pub settings_path: Option<PathBuf>,

    /// Timeout for downloading URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives batch progress events.
    pub progress: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for StractConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            process_timeout_secs: 600,
            mineru_binary: "mineru".to_string(),
            mineru_backend: "pipeline".to_string(),
            vlm_provider_name: None,
            vlm_provider: None,
            vlm_model: None,
            vlm_max_tokens: 4096,
            vlm_temperature: 0.1,
            vlm_page_concurrency: 4,
            vlm_dpi: 150,
            vlm_max_retries: 3,
            vlm_retry_backoff_ms: 500,
            cache_dir: None,
            settings_path: None,
            download_timeout_secs: 120,
            progress: None,
        }
    }
}

impl fmt::Debug for StractConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StractConfig")
            .field("workers", &self.workers)
            .field("process_timeout_secs", &self.process_timeout_secs)
            .field("mineru_binary", &self.mineru_binary)
            .field("mineru_backend", &self.mineru_backend)
            .field("vlm_provider_name", &self.vlm_provider_name)
            .field("vlm_provider", &self.vlm_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("vlm_model", &self.vlm_model)
            .field("vlm_page_concurrency", &self.vlm_page_concurrency)
            .field("cache_dir", &self.cache_dir)
            .field("settings_path", &self.settings_path)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn BatchProgressCallback>"))
            .finish_non_exhaustive()
    }
}

impl StractConfig {
    pub fn builder() -> StractConfigBuilder {
        StractConfigBuilder {
            config: Self::default(),
        }
    }

    /// Settings file to use: the configured path or the platform default.
    pub fn resolved_settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(crate::store::JsonFileStore::default_path)
    }
}

/// Builder for [`StractConfig`].
#[derive(Debug)]
pub struct StractConfigBuilder {
    config: StractConfig,
}

impl StractConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn process_timeout_secs(mut self, secs: u64) -> Self {
        self.config.process_timeout_secs = secs;
        self
    }

    pub fn mineru_binary(mut self, bin: impl Into<String>) -> Self {
        self.config.mineru_binary = bin.into();
        self
    }

    pub fn mineru_backend(mut self, mode: impl Into<String>) -> Self {
        self.config.mineru_backend = mode.into();
        self
    }

    pub fn vlm_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.vlm_provider_name = Some(name.into());
        self
    }

    pub fn vlm_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vlm_provider = Some(provider);
        self
    }

    pub fn vlm_model(mut self, model: impl Into<String>) -> Self {
        self.config.vlm_model = Some(model.into());
        self
    }

    pub fn vlm_max_tokens(mut self, n: usize) -> Self {
        self.config.vlm_max_tokens = n;
        self
    }

    pub fn vlm_temperature(mut self, t: f32) -> Self {
        self.config.vlm_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vlm_page_concurrency(mut self, n: usize) -> Self {
        self.config.vlm_page_concurrency = n.max(1);
        self
    }

    pub fn vlm_dpi(mut self, dpi: u32) -> Self {
        self.config.vlm_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn vlm_max_retries(mut self, n: u32) -> Self {
        self.config.vlm_max_retries = n;
        self
    }

    pub fn vlm_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.vlm_retry_backoff_ms = ms;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.settings_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress = Some(cb);
        self
    }

    pub fn build(self) -> Result<StractConfig, StractError> {
        let c = &self.config;
        if c.process_timeout_secs == 0 {
            return Err(StractError::InvalidConfig(
                "process timeout must be at least 1 second".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(StractError::InvalidConfig(
                "download timeout must be at least 1 second".into(),
            ));
        }
        if c.mineru_binary.trim().is_empty() {
            return Err(StractError::InvalidConfig("mineru binary cannot be empty".into()));
        }
        if c.vlm_max_tokens == 0 {
            return Err(StractError::InvalidConfig("vlm max tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// Serialisable view of the effective configuration, logged by the CLI at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub workers: usize,
    pub process_timeout_secs: u64,
    pub mineru_binary: String,
    pub mineru_backend: String,
    pub vlm_provider: Option<String>,
    pub vlm_model: Option<String>,
    pub settings_path: PathBuf,
}

impl From<&StractConfig> for ConfigSummary {
    fn from(c: &StractConfig) -> Self {
        Self {
            workers: c.workers,
            process_timeout_secs: c.process_timeout_secs,
            mineru_binary: c.mineru_binary.clone(),
            mineru_backend: c.mineru_backend.clone(),
            vlm_provider: c.vlm_provider_name.clone(),
            vlm_model: c.vlm_model.clone(),
            settings_path: c.resolved_settings_path(),
        }
    }
}
