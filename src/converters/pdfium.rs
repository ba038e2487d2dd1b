//! PDFium-backed text extraction and the shared PDFium library handle.
//!
//! The PDFium shared library is not bundled. [`PdfiumLibrary`] owns one
//! [`Lifecycle`] that fetches it through `artifact-fetch` on first
//! `prepare()`; a cached copy or `PDFIUM_LIB_PATH` makes the backend READY at
//! construction. Each blocking task binds its own `Pdfium` handle.
//!
//! PDFium calls are CPU-bound and not async-aware, so every document
//! operation runs inside `tokio::task::spawn_blocking`.

use crate::capability::{Backend, Converter};
use crate::converters::markdown::clean_markdown;
use crate::error::BackendError;
use crate::lifecycle::{DownloadStatus, Lifecycle};
use crate::output::OutputFormat;
use artifact_fetch::Artifact;
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind PDFium for the current blocking task.
///
/// `Pdfium` is neither `Send` nor `Sync`, so it is created and dropped inside
/// the `spawn_blocking` closure that uses it.
fn bind_pdfium(lib_path: &Path) -> Result<Pdfium, BackendError> {
    debug!("Binding PDFium from {}", lib_path.display());
    Pdfium::bind_to_library(lib_path).map(Pdfium::new).map_err(|e| {
        BackendError::Pdf(format!(
            "failed to bind PDFium from '{}': {e}",
            lib_path.display()
        ))
    })
}

/// The PDFium shared library as a lazily downloaded artifact.
pub struct PdfiumLibrary {
    lifecycle: Lifecycle,
    artifact: Result<Artifact, String>,
    cache_root: PathBuf,
    path: OnceCell<PathBuf>,
}

impl PdfiumLibrary {
    /// Library handle for the current platform. `owner` names the backend in logs.
    pub fn new(owner: &str, cache_root: PathBuf) -> Self {
        Self::with_artifact(
            owner,
            artifact_fetch::pdfium_artifact().map_err(|e| e.to_string()),
            cache_root,
        )
    }

    pub fn with_artifact(owner: &str, artifact: Result<Artifact, String>, cache_root: PathBuf) -> Self {
        let path = OnceCell::new();
        let lifecycle = match &artifact {
            Ok(a) => match a.cached_path(&cache_root) {
                Some(p) => {
                    debug!("{owner}: PDFium already present at {}", p.display());
                    let _ = path.set(p);
                    Lifecycle::ready(owner)
                }
                None => Lifecycle::pending(owner),
            },
            Err(_) => Lifecycle::pending(owner),
        };
        Self {
            lifecycle,
            artifact,
            cache_root,
            path,
        }
    }

    pub fn status(&self) -> DownloadStatus {
        self.lifecycle.status()
    }

    pub fn error(&self) -> Option<String> {
        self.lifecycle.error()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == DownloadStatus::Ready && self.path.get().is_some()
    }

    /// Why the library cannot be used yet; `None` when ready.
    pub fn unavailable_reason(&self) -> Option<String> {
        if self.is_ready() {
            return None;
        }
        if let Err(e) = &self.artifact {
            return Some(format!("PDFium is not available for this platform: {e}"));
        }
        Some(match self.status() {
            DownloadStatus::Failed => format!(
                "PDFium download failed: {}",
                self.error().unwrap_or_else(|| "unknown error".into())
            ),
            DownloadStatus::Downloading => "PDFium download in progress".to_string(),
            _ => "PDFium library not downloaded yet (fetched automatically on first use, \
                  or run `pdfstract prepare`)"
                .to_string(),
        })
    }

    /// Fetch the library if needed and return the terminal status.
    pub async fn prepare(&self) -> DownloadStatus {
        self.lifecycle
            .prepare_with(|| async {
                let artifact = self.artifact.clone()?;
                let root = self.cache_root.clone();
                let path = tokio::task::spawn_blocking(move || {
                    artifact_fetch::ensure_artifact(&artifact, &root, None)
                })
                .await
                .map_err(|e| format!("download task panicked: {e}"))?
                .map_err(|e| e.to_string())?;
                let _ = self.path.set(path);
                Ok::<(), String>(())
            })
            .await
    }

    fn library_path(&self) -> Result<PathBuf, BackendError> {
        match self.path.get() {
            Some(p) if self.is_ready() => Ok(p.clone()),
            _ => Err(BackendError::Unavailable(
                self.unavailable_reason()
                    .unwrap_or_else(|| "PDFium library not ready".into()),
            )),
        }
    }

    /// Extract per-page text.
    pub async fn extract_text(&self, input: &Path) -> Result<Vec<String>, BackendError> {
        let lib = self.library_path()?;
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(&lib)?;
            extract_pages(&pdfium, &input)
        })
        .await
        .map_err(|e| BackendError::Other(format!("PDFium task panicked: {e}")))?
    }

    /// Rasterise every page with the long edge capped at `max_pixels`.
    pub async fn render(&self, input: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<DynamicImage>, BackendError> {
        let lib = self.library_path()?;
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(&lib)?;
            render_pages(&pdfium, &input, dpi, max_pixels)
        })
        .await
        .map_err(|e| BackendError::Other(format!("PDFium task panicked: {e}")))?
    }
}

fn load<'a>(pdfium: &'a Pdfium, input: &Path) -> Result<PdfDocument<'a>, BackendError> {
    pdfium
        .load_pdf_from_file(input, None)
        .map_err(|e| BackendError::Pdf(format!("cannot open '{}': {e:?}", input.display())))
}

fn extract_pages(pdfium: &Pdfium, input: &Path) -> Result<Vec<String>, BackendError> {
    let document = load(pdfium, input)?;
    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| BackendError::Pdf(format!("page {}: text extraction failed: {e}", idx + 1)))?;
        pages.push(text.all());
    }
    debug!("Extracted text from {} pages of {}", pages.len(), input.display());
    Ok(pages)
}

fn render_pages(pdfium: &Pdfium, input: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<DynamicImage>, BackendError> {
    let document = load(pdfium, input)?;
    let mut images = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        let width_px = ((page.width().value * dpi as f32 / 72.0) as i32).clamp(1, max_pixels as i32);
        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_maximum_height(max_pixels as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| BackendError::Pdf(format!("page {}: render failed: {e:?}", idx + 1)))?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push(image);
    }
    Ok(images)
}

/// Join page texts into one document, skipping blank pages.
pub(crate) fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// In-process PDF text extraction through PDFium.
pub struct PdfiumConverter {
    library: PdfiumLibrary,
}

impl PdfiumConverter {
    pub const NAME: &'static str = "pdfium";

    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            library: PdfiumLibrary::new(Self::NAME, cache_root),
        }
    }

    pub fn with_library(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

impl Backend for PdfiumConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn available(&self) -> bool {
        self.library.is_ready()
    }

    fn error_message(&self) -> Option<String> {
        self.library.unavailable_reason()
    }
}

#[async_trait]
impl Converter for PdfiumConverter {
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
        self.library.prepare().await;
        self.available()
    }

    async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
        let pages = self.library.extract_text(input).await?;
        let md = clean_markdown(&join_pages(&pages));
        info!("pdfium: converted {} ({} bytes)", input.display(), md.len());
        Ok(md)
    }

    async fn convert_to_json(&self, input: &Path) -> Result<Value, BackendError> {
        let pages = self.library.extract_text(input).await?;
        let content = join_pages(&pages);
        let page_records: Vec<Value> = pages
            .iter()
            .enumerate()
            .map(|(i, text)| json!({"page": i + 1, "text": text}))
            .collect();
        Ok(json!({
            "content": content,
            "format": "text",
            "library": Self::NAME,
            "page_count": pages.len(),
            "pages": page_records,
        }))
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, BackendError> {
        let pages = self.library.extract_text(input).await?;
        Ok(join_pages(&pages))
    }

    fn supports_format(&self, _format: OutputFormat) -> bool {
        true
    }
}
