//! Error types for the pdfstract library.
//!
//! Two distinct error types reflect two distinct sides of the backend
//! boundary:
//!
//! * [`StractError`]: what callers see. Every public entry point returns
//!   `Result<_, StractError>`, and every variant names one failure kind with
//!   a message that says what to do next (e.g. which backends *are*
//!   available).
//!
//! * [`BackendError`]: what a [`crate::capability::Converter`] or
//!   [`crate::capability::Chunker`] implementation reports. It never crosses
//!   the public boundary: the engine re-wraps it as
//!   [`StractError::ConversionFailed`] or [`StractError::ChunkingFailed`]
//!   carrying the original message.
//!
//! Batch runs never return per-item failures as `Err`; they are recorded in
//! [`crate::output::BatchResult`] so one bad file does not hide the others.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfstract public API.
#[derive(Debug, Error)]
pub enum StractError {
    // ── Resolution errors ─────────────────────────────────────────────────
    /// No backend with this name is registered (unknown or disabled).
    #[error("Backend '{name}' is not available. Available: {}", format_names(.available))]
    BackendNotFound { name: String, available: Vec<String> },

    /// `auto` chunker selection found nothing usable.
    #[error("No available chunkers found for auto-selection")]
    NoChunkerAvailable,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory does not exist (or a URL input could not be fetched).
    #[error("Input not found: '{path}'{}", .reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    InputNotFound {
        path: PathBuf,
        reason: Option<String>,
    },

    /// Text to chunk was empty or whitespace only.
    #[error("Text cannot be empty")]
    EmptyInput,

    /// The backend cannot produce the requested output shape.
    #[error("Backend '{backend}' does not support format '{format}'")]
    UnsupportedFormat { backend: String, format: String },

    // ── Backend failures ──────────────────────────────────────────────────
    /// Conversion failed inside the backend, or the backend is unusable.
    #[error("Conversion failed ({backend}): {message}")]
    ConversionFailed { backend: String, message: String },

    /// Chunking failed inside the chunker, or the chunker is unusable.
    #[error("Chunking failed ({chunker}): {message}")]
    ChunkingFailed { chunker: String, message: String },

    /// A backend's one-time download ended in the FAILED state.
    #[error(
        "Download for backend '{backend}' failed: {message}\n\
Retry with `pdfstract prepare {backend}` once the cause is fixed."
    )]
    DownloadFailed { backend: String, message: String },

    // ── Configuration / environment ───────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The enablement store could not be read or written.
    #[error("Library settings store error: {0}")]
    Store(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StractError {
    /// Wrap a backend-internal failure from a converter.
    pub fn conversion(backend: &str, err: BackendError) -> Self {
        StractError::ConversionFailed {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap a backend-internal failure from a chunker.
    pub fn chunking(chunker: &str, err: BackendError) -> Self {
        StractError::ChunkingFailed {
            chunker: chunker.to_string(),
            message: err.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind, used in batch results
    /// and `--json` CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            StractError::BackendNotFound { .. } => "backend_not_found",
            StractError::NoChunkerAvailable => "no_chunker_available",
            StractError::InputNotFound { .. } => "input_not_found",
            StractError::EmptyInput => "empty_input",
            StractError::UnsupportedFormat { .. } => "unsupported_format",
            StractError::ConversionFailed { .. } => "conversion_failed",
            StractError::ChunkingFailed { .. } => "chunking_failed",
            StractError::DownloadFailed { .. } => "download_failed",
            StractError::InvalidConfig(_) => "invalid_config",
            StractError::Store(_) => "store",
            StractError::Internal(_) => "internal",
        }
    }
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        format!("[{}]", names.join(", "))
    }
}

/// A failure reported by a backend implementation.
///
/// Backends that shell out or fetch models translate their own failure modes
/// (non-zero exit, missing output artifact, timeout) into these variants.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Preconditions (dependency, download) are not met.
    #[error("backend is not available: {0}")]
    Unavailable(String),

    /// Reading the input or writing scratch files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool exited unsuccessfully.
    #[error("{program} failed: {detail}")]
    ProcessFailed { program: String, detail: String },

    /// An external tool or model call exceeded its hard timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The external tool exited cleanly but left no output to read.
    #[error("no {expected} output generated")]
    MissingOutput { expected: String },

    /// PDF loading or text extraction failed.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// A model call failed after retries.
    #[error("model error: {0}")]
    Model(String),

    /// A one-time artifact download failed.
    #[error("download error: {0}")]
    Download(String),

    /// A caller-supplied parameter was wrongly typed or out of range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_not_found_lists_alternatives() {
        let e = StractError::BackendNotFound {
            name: "marker".into(),
            available: vec!["plaintext".into(), "pdfium".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("'marker'"), "got: {msg}");
        assert!(msg.contains("[plaintext, pdfium]"), "got: {msg}");
    }

    #[test]
    fn backend_not_found_with_nothing_available() {
        let e = StractError::BackendNotFound {
            name: "x".into(),
            available: vec![],
        };
        assert!(e.to_string().ends_with("Available: none"));
    }

    #[test]
    fn input_not_found_with_reason() {
        let e = StractError::InputNotFound {
            path: PathBuf::from("https://example.com/a.pdf"),
            reason: Some("HTTP 404".into()),
        };
        assert!(e.to_string().contains("(HTTP 404)"));

        let e = StractError::InputNotFound {
            path: PathBuf::from("missing.pdf"),
            reason: None,
        };
        assert_eq!(e.to_string(), "Input not found: 'missing.pdf'");
    }

    #[test]
    fn conversion_wraps_backend_message() {
        let e = StractError::conversion("mineru", BackendError::Timeout { secs: 600 });
        assert_eq!(e.kind(), "conversion_failed");
        assert!(e.to_string().contains("timed out after 600s"));
    }

    #[test]
    fn download_failed_has_retry_hint() {
        let e = StractError::DownloadFailed {
            backend: "pdfium".into(),
            message: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("pdfstract prepare pdfium"));
    }
}
