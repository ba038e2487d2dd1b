//! Execution engine: single-item conversion and chunking.
//!
//! [`Stract`] owns the converter and chunker registries and is the entry
//! point for every operation. Each operation has an `async` form and a
//! blocking form; the blocking form only drives the async one to completion
//! on a private current-thread runtime, so the two can never disagree.
//!
//! Conversion order of checks:
//!
//! ```text
//! resolve backend ──► prepare (lazy download) ──► availability
//!        │                    │                        │
//!  BackendNotFound      DownloadFailed          ConversionFailed
//!
//! resolve input ──► supports_format ──► dispatch
//!        │                 │                │
//!  InputNotFound   UnsupportedFormat  ConversionFailed
//! ```

use crate::capability::{ChunkParams, Chunker, Converter, ParameterSchema};
use crate::chunkers::builtin_chunkers;
use crate::config::StractConfig;
use crate::converters::builtin_converters;
use crate::error::StractError;
use crate::input::{materialize_bytes, resolve_input};
use crate::lifecycle::DownloadStatus;
use crate::output::{ChunkingResult, Content, OutputFormat};
use crate::registry::{BackendDescriptor, BackendSpec, Registry};
use crate::store::{EnablementStore, JsonFileStore, MemoryStore};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Name that asks the chunker registry for its default choice.
pub const AUTO_CHUNKER: &str = "auto";

/// Document extraction and chunking over pluggable backends.
///
/// # Example
///
/// ```rust,no_run
/// use pdfstract::{OutputFormat, Stract, StractConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stract = Stract::new(StractConfig::default());
/// let md = stract.convert("paper.pdf", "pdfium", OutputFormat::Markdown)?;
/// let chunks = stract.chunk(&md.to_text(), "auto", &Default::default())?;
/// println!("{} chunks", chunks.total_chunks);
/// # Ok(())
/// # }
/// ```
pub struct Stract {
    pub(crate) config: Arc<StractConfig>,
    converters: Registry<dyn Converter>,
    chunkers: Registry<dyn Chunker>,
}

impl Stract {
    /// Built-in backends, with converter enablement persisted in the JSON
    /// settings file of `config`.
    pub fn new(config: StractConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(config.resolved_settings_path()));
        Self::with_store(config, store)
    }

    /// Built-in backends over a caller-supplied enablement store.
    pub fn with_store(config: StractConfig, store: Arc<dyn EnablementStore>) -> Self {
        let converters = builtin_converters(&config);
        Self::with_registries(config, converters, builtin_chunkers(), store)
    }

    /// Custom catalogs. Chunkers are always all enabled.
    pub fn with_registries(
        config: StractConfig,
        converters: Vec<BackendSpec<dyn Converter>>,
        chunkers: Vec<BackendSpec<dyn Chunker>>,
        store: Arc<dyn EnablementStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            converters: Registry::new(converters, store),
            chunkers: Registry::new(chunkers, Arc::new(MemoryStore::new())),
        }
    }

    pub fn config(&self) -> &StractConfig {
        &self.config
    }

    // ── Converters ───────────────────────────────────────────────────────

    /// Convert one file or `http(s)://` URL.
    pub async fn convert_async(
        &self,
        input: impl AsRef<Path>,
        backend: &str,
        format: OutputFormat,
    ) -> Result<Content, StractError> {
        let converter = self.acquire_converter(backend).await?;
        run_conversion(converter.as_ref(), input.as_ref(), format, self.config.download_timeout_secs).await
    }

    /// Blocking form of [`Stract::convert_async`].
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn convert(
        &self,
        input: impl AsRef<Path>,
        backend: &str,
        format: OutputFormat,
    ) -> Result<Content, StractError> {
        block_on(self.convert_async(input, backend, format))?
    }

    /// Convert an in-memory document. `file_name` supplies the extension.
    pub async fn convert_bytes_async(
        &self,
        bytes: &[u8],
        file_name: &str,
        backend: &str,
        format: OutputFormat,
    ) -> Result<Content, StractError> {
        let converter = self.acquire_converter(backend).await?;
        let scratch = materialize_bytes(bytes, file_name).await?;
        run_conversion(converter.as_ref(), scratch.path(), format, self.config.download_timeout_secs).await
    }

    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
        backend: &str,
        format: OutputFormat,
    ) -> Result<Content, StractError> {
        block_on(self.convert_bytes_async(bytes, file_name, backend, format))?
    }

    /// Every known converter kind with its status.
    pub fn list_backends(&self) -> Vec<BackendDescriptor> {
        self.converters.list_all()
    }

    /// Names of converters usable right now.
    pub fn list_available_backends(&self) -> Vec<String> {
        self.converters.list_available()
    }

    pub fn get_backend_info(&self, name: &str) -> Option<BackendDescriptor> {
        self.converters.descriptor(name)
    }

    /// Run a converter's one-time setup now instead of on first use.
    pub async fn prepare_backend_async(&self, name: &str) -> Result<DownloadStatus, StractError> {
        let converter = self.resolve_converter(name)?;
        let available = converter.prepare().await;
        let status = converter.download_status();
        info!("Prepared {name}: status={status}, available={available}");
        Ok(status)
    }

    pub fn prepare_backend(&self, name: &str) -> Result<DownloadStatus, StractError> {
        block_on(self.prepare_backend_async(name))?
    }

    /// Persist a converter's enabled flag and rebuild the registries.
    ///
    /// When nothing is configured yet every kind is implicitly enabled, so
    /// the implicit set is written out first; otherwise disabling one kind
    /// would leave the set empty and re-enable everything.
    pub fn set_backend_enabled(&self, name: &str, enabled: bool) -> Result<(), StractError> {
        if !self.converters.is_known(name) {
            return Err(StractError::BackendNotFound {
                name: name.to_string(),
                available: self.converters.known_names(),
            });
        }
        let store = self.converters.store();
        if !self.converters.snapshot().is_configured() {
            for known in self.converters.known_names() {
                store.set_enabled(&known, true)?;
            }
        }
        store.set_enabled(name, enabled)?;
        info!("{} backend {name}", if enabled { "Enabled" } else { "Disabled" });
        self.refresh();
        Ok(())
    }

    /// Re-read enablement and rebuild both registries.
    ///
    /// Instances already handed out stay valid until their callers finish.
    pub fn refresh(&self) {
        self.converters.refresh();
        self.chunkers.refresh();
    }

    fn resolve_converter(&self, name: &str) -> Result<Arc<dyn Converter>, StractError> {
        self.converters
            .resolve(name)
            .ok_or_else(|| StractError::BackendNotFound {
                name: name.to_string(),
                available: self.converters.list_available(),
            })
    }

    /// Resolve a converter and make sure it is usable, preparing it if it
    /// still needs its one-time download.
    pub(crate) async fn acquire_converter(&self, name: &str) -> Result<Arc<dyn Converter>, StractError> {
        let converter = self.resolve_converter(name)?;
        if converter.requires_download() && !converter.available() {
            debug!("{name} needs preparation (status {})", converter.download_status());
            converter.prepare().await;
            if converter.download_status() == DownloadStatus::Failed {
                return Err(StractError::DownloadFailed {
                    backend: name.to_string(),
                    message: converter
                        .download_error()
                        .unwrap_or_else(|| "unknown download error".to_string()),
                });
            }
        }
        if !converter.available() {
            return Err(StractError::ConversionFailed {
                backend: name.to_string(),
                message: format!(
                    "backend is not available: {}",
                    converter
                        .error_message()
                        .unwrap_or_else(|| "dependencies not installed".to_string())
                ),
            });
        }
        Ok(converter)
    }

    // ── Chunkers ─────────────────────────────────────────────────────────

    /// Split `text` with the named chunker, or the default one for `"auto"`.
    ///
    /// ```rust
    /// use pdfstract::{ChunkParams, MemoryStore, Stract, StractConfig};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let stract = Stract::with_store(StractConfig::default(), Arc::new(MemoryStore::new()));
    /// let result = stract
    ///     .chunk_async("one two three four", "token", &ChunkParams::new().with("chunk_size", 2))
    ///     .await?;
    /// assert_eq!(result.total_chunks, 2);
    /// # Ok::<(), pdfstract::StractError>(())
    /// # });
    /// ```
    pub async fn chunk_async(
        &self,
        text: &str,
        chunker: &str,
        params: &ChunkParams,
    ) -> Result<ChunkingResult, StractError> {
        let instance = self.resolve_chunker(chunker)?;
        if text.trim().is_empty() {
            return Err(StractError::EmptyInput);
        }
        let name = instance.name().to_string();
        if !instance.available() {
            return Err(StractError::ChunkingFailed {
                message: format!(
                    "chunker is not available: {}",
                    instance
                        .error_message()
                        .unwrap_or_else(|| "dependencies not installed".to_string())
                ),
                chunker: name,
            });
        }

        let owned_text = text.to_string();
        let owned_params = params.clone();
        let chunks = tokio::task::spawn_blocking(move || instance.chunk(&owned_text, &owned_params))
            .await
            .map_err(|e| StractError::Internal(format!("chunking task failed: {e}")))?
            .map_err(|e| StractError::chunking(&name, e))?;
        info!("Chunked {} bytes with {name} into {} chunks", text.len(), chunks.len());
        Ok(ChunkingResult::new(name, chunks))
    }

    pub fn chunk(&self, text: &str, chunker: &str, params: &ChunkParams) -> Result<ChunkingResult, StractError> {
        block_on(self.chunk_async(text, chunker, params))?
    }

    /// Names of chunkers usable right now.
    pub fn list_chunkers(&self) -> Vec<String> {
        self.chunkers.list_available()
    }

    pub fn list_all_chunkers(&self) -> Vec<BackendDescriptor> {
        self.chunkers.list_all()
    }

    /// Parameter schema of a chunker; `"auto"` describes the default one.
    pub fn get_chunker_info(&self, name: &str) -> Option<ParameterSchema> {
        self.resolve_chunker(name).ok().map(|c| c.parameter_schema())
    }

    fn resolve_chunker(&self, name: &str) -> Result<Arc<dyn Chunker>, StractError> {
        if name == AUTO_CHUNKER {
            let chosen = self
                .chunkers
                .snapshot()
                .first_available()
                .ok_or(StractError::NoChunkerAvailable)?;
            debug!("auto chunker resolved to {}", chosen.name());
            return Ok(chosen);
        }
        self.chunkers
            .resolve(name)
            .ok_or_else(|| StractError::BackendNotFound {
                name: name.to_string(),
                available: self.chunkers.list_available(),
            })
    }
}

impl std::fmt::Debug for Stract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stract")
            .field("config", &self.config)
            .field("converters", &self.converters)
            .field("chunkers", &self.chunkers)
            .finish()
    }
}

/// Resolve the input, check the format, then call the backend.
pub(crate) async fn run_conversion(
    converter: &dyn Converter,
    input: &Path,
    format: OutputFormat,
    download_timeout_secs: u64,
) -> Result<Content, StractError> {
    let name = converter.name();
    let resolved = resolve_input(input, download_timeout_secs).await?;
    if !converter.supports_format(format) {
        return Err(StractError::UnsupportedFormat {
            backend: name.to_string(),
            format: format.to_string(),
        });
    }

    info!("Converting {} with {name} to {format}", input.display());
    let path = resolved.path();
    let content = match format {
        OutputFormat::Markdown => converter.convert_to_markdown(path).await.map(Content::Text),
        OutputFormat::Json => converter.convert_to_json(path).await.map(Content::Json),
        OutputFormat::Text => converter.convert_to_text(path).await.map(Content::Text),
    }
    .map_err(|e| StractError::conversion(name, e))?;
    debug!("{name} produced {} bytes from {}", content.len(), input.display());
    Ok(content)
}

/// Drive `fut` to completion on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output, StractError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StractError::Internal(format!("Failed to create tokio runtime: {e}")))?;
    Ok(runtime.block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Backend;
    use crate::error::BackendError;
    use async_trait::async_trait;

    struct Echo;

    impl Backend for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn available(&self) -> bool {
            true
        }
        fn error_message(&self) -> Option<String> {
            None
        }
    }

    #[async_trait]
    impl Converter for Echo {
        async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
            Ok(tokio::fs::read_to_string(input).await?)
        }
        fn supports_format(&self, format: OutputFormat) -> bool {
            format == OutputFormat::Markdown
        }
    }

    fn stract() -> Stract {
        Stract::with_registries(
            StractConfig::default(),
            vec![BackendSpec::new("echo", false, || Arc::new(Echo) as Arc<dyn Converter>)],
            builtin_chunkers(),
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn unsupported_format_is_reported_after_input_check() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.md");
        std::fs::write(&p, "hi").unwrap();

        let err = stract().convert_async(&p, "echo", OutputFormat::Json).await.unwrap_err();
        assert!(matches!(err, StractError::UnsupportedFormat { .. }));

        let err = stract()
            .convert_async(dir.path().join("nope.md"), "echo", OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, StractError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn convert_bytes_uses_a_scratch_file() {
        let out = stract()
            .convert_bytes_async(b"# Title", "doc.md", "echo", OutputFormat::Markdown)
            .await
            .unwrap();
        assert_eq!(out, Content::Text("# Title".into()));
    }

    #[tokio::test]
    async fn auto_picks_first_builtin_chunker() {
        let result = stract()
            .chunk_async("a b c", AUTO_CHUNKER, &ChunkParams::new())
            .await
            .unwrap();
        assert_eq!(result.chunker_name, "token");
        assert_eq!(result.total_tokens, 3);
    }

    #[tokio::test]
    async fn unknown_chunker_and_blank_text() {
        let s = stract();
        let err = s.chunk_async("text", "semantic", &ChunkParams::new()).await.unwrap_err();
        assert!(matches!(err, StractError::BackendNotFound { .. }));
        let err = s.chunk_async(" \n ", "token", &ChunkParams::new()).await.unwrap_err();
        assert!(matches!(err, StractError::EmptyInput));
    }

    #[tokio::test]
    async fn bad_chunk_parameters_become_chunking_failed() {
        let params = ChunkParams::new().with("chunk_size", "big");
        let err = stract().chunk_async("a b", "token", &params).await.unwrap_err();
        assert!(matches!(err, StractError::ChunkingFailed { ref chunker, .. } if chunker == "token"));
    }

    #[test]
    fn disabling_from_unconfigured_store_keeps_the_others() {
        let store = Arc::new(MemoryStore::new());
        let s = Stract::with_store(StractConfig::default(), store.clone());
        s.set_backend_enabled("mineru", false).unwrap();
        let enabled = store.enabled_names().unwrap();
        assert!(!enabled.contains("mineru"));
        assert!(enabled.contains("plaintext"));
        assert!(s.get_backend_info("mineru").is_some_and(|d| !d.enabled));
    }

    #[test]
    fn enabling_unknown_backend_fails() {
        let err = stract().set_backend_enabled("docling", true).unwrap_err();
        assert!(matches!(err, StractError::BackendNotFound { .. }));
    }

    #[test]
    fn chunker_schema_lookup() {
        let s = stract();
        assert_eq!(s.get_chunker_info("sentence").unwrap().name, "sentence");
        assert_eq!(s.get_chunker_info(AUTO_CHUNKER).unwrap().name, "token");
        assert!(s.get_chunker_info("nope").is_none());
    }
}
