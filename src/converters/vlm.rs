//! Vision-LLM converter: rasterise pages with PDFium, transcribe each page
//! image with a vision model, assemble the cleaned markdown.
//!
//! Pages are sent with bounded concurrency (`buffer_unordered`) and retried
//! with exponential backoff. A page that still fails after its retries
//! fails the whole conversion; partial documents are never returned.

use crate::capability::{Backend, Converter};
use crate::config::StractConfig;
use crate::converters::markdown::{clean_markdown, strip_markdown};
use crate::converters::pdfium::PdfiumLibrary;
use crate::error::BackendError;
use crate::lifecycle::DownloadStatus;
use crate::output::OutputFormat;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";
const MAX_RENDERED_PIXELS: u32 = 2000;

const SYSTEM_PROMPT: &str = "Transcribe this document page into GitHub-flavoured Markdown. \
Preserve headings, lists, tables and reading order. Output only the page content, \
without commentary and without wrapping it in a code fence.";

/// Per-conversion model settings.
#[derive(Debug, Clone)]
pub struct VlmSettings {
    pub max_tokens: usize,
    pub temperature: f32,
    pub page_concurrency: usize,
    pub dpi: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl From<&StractConfig> for VlmSettings {
    fn from(c: &StractConfig) -> Self {
        Self {
            max_tokens: c.vlm_max_tokens,
            temperature: c.vlm_temperature,
            page_concurrency: c.vlm_page_concurrency,
            dpi: c.vlm_dpi,
            max_retries: c.vlm_max_retries,
            retry_backoff_ms: c.vlm_retry_backoff_ms,
        }
    }
}

pub struct VlmConverter {
    library: PdfiumLibrary,
    provider: Result<Arc<dyn LLMProvider>, String>,
    settings: VlmSettings,
}

impl VlmConverter {
    pub const NAME: &'static str = "vlm";

    pub fn new(config: &StractConfig, cache_root: std::path::PathBuf) -> Self {
        Self::with_parts(
            PdfiumLibrary::new(Self::NAME, cache_root),
            resolve_provider(config),
            VlmSettings::from(config),
        )
    }

    pub fn with_parts(
        library: PdfiumLibrary,
        provider: Result<Arc<dyn LLMProvider>, String>,
        settings: VlmSettings,
    ) -> Self {
        Self {
            library,
            provider,
            settings,
        }
    }

    async fn transcribe(&self, input: &Path) -> Result<String, BackendError> {
        let provider = self
            .provider
            .as_ref()
            .map_err(|e| BackendError::Unavailable(e.clone()))?;
        let images = self
            .library
            .render(input, self.settings.dpi, MAX_RENDERED_PIXELS)
            .await?;
        let total = images.len();
        info!("vlm: {} pages from {}", total, input.display());

        let encoded = tokio::task::spawn_blocking(move || {
            images
                .iter()
                .map(encode_page)
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| BackendError::Other(format!("encode task panicked: {e}")))?
        .map_err(|e| BackendError::Other(format!("page encoding failed: {e}")))?;

        let mut pages: Vec<(usize, Result<String, String>)> = stream::iter(encoded.into_iter().enumerate())
            .map(|(idx, image)| {
                let provider = Arc::clone(provider);
                async move { (idx, transcribe_page(&provider, idx + 1, image, &self.settings).await) }
            })
            .buffer_unordered(self.settings.page_concurrency)
            .collect()
            .await;
        pages.sort_by_key(|(idx, _)| *idx);

        assemble(pages)
    }
}

/// Join page outputs in order, or report the first failed page.
fn assemble(pages: Vec<(usize, Result<String, String>)>) -> Result<String, BackendError> {
    let mut parts = Vec::with_capacity(pages.len());
    for (idx, page) in pages {
        match page {
            Ok(md) => parts.push(clean_markdown(&md).trim_end().to_string()),
            Err(e) => return Err(BackendError::Model(format!("page {}: {e}", idx + 1))),
        }
    }
    Ok(clean_markdown(&parts.join("\n\n")))
}

/// Encode a rendered page as a lossless PNG attachment.
fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image: ImageData,
    settings: &VlmSettings,
) -> Result<String, String> {
    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    };

    let mut last_err = String::from("unknown error");
    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "vlm page {}: retry {}/{} after {}ms",
                page_num, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "vlm page {}: {} prompt / {} completion tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(response.content);
            }
            Err(e) => {
                warn!("vlm page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = e.to_string();
            }
        }
    }
    Err(format!("failed after {} retries: {last_err}", settings.max_retries))
}

/// Provider lookup, most specific first: pre-built, named, environment pair,
/// then auto-detection.
fn resolve_provider(config: &StractConfig) -> Result<Arc<dyn LLMProvider>, String> {
    if let Some(provider) = &config.vlm_provider {
        return Ok(Arc::clone(provider));
    }
    let model = config.vlm_model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(name) = &config.vlm_provider_name {
        return ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| format!("LLM provider '{name}' is not configured: {e}"));
    }
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return ProviderFactory::create_llm_provider(&prov, &model)
                .map_err(|e| format!("LLM provider '{prov}' is not configured: {e}"));
        }
    }
    ProviderFactory::from_env()
        .map(|(llm, _embedding)| llm)
        .map_err(|e| {
            format!(
                "no vision LLM provider configured; set OPENAI_API_KEY or ANTHROPIC_API_KEY \
                 (or PDFSTRACT_VLM_PROVIDER): {e}"
            )
        })
}

impl Backend for VlmConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn available(&self) -> bool {
        self.provider.is_ok() && self.library.is_ready()
    }

    fn error_message(&self) -> Option<String> {
        match &self.provider {
            Err(e) => Some(e.clone()),
            Ok(_) => self.library.unavailable_reason(),
        }
    }
}

#[async_trait]
impl Converter for VlmConverter {
    fn requires_download(&self) -> bool {
        true
    }

    fn download_status(&self) -> DownloadStatus {
        self.library.status()
    }

    fn download_error(&self) -> Option<String> {
        self.library.error()
    }

    async fn prepare(&self) -> bool {
        if let Err(reason) = &self.provider {
            debug!("vlm: skipping PDFium download, {reason}");
            return false;
        }
        self.library.prepare().await;
        self.available()
    }

    async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
        self.transcribe(input).await
    }

    async fn convert_to_json(&self, input: &Path) -> Result<Value, BackendError> {
        let content = self.transcribe(input).await?;
        Ok(json!({
            "content": content,
            "format": "markdown",
            "library": Self::NAME,
        }))
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, BackendError> {
        Ok(strip_markdown(&self.transcribe(input).await?))
    }

    fn supports_format(&self, _format: OutputFormat) -> bool {
        true
    }
}
