//! The contract every extraction or chunking backend satisfies.
//!
//! Backends are consumed only through these traits. Whether a converter
//! calls a library in-process, spawns an external tool or drives a model
//! server, the engine sees the same surface: a call either returns the
//! requested shape or fails with a [`BackendError`]. Partial output on
//! failure is never returned.
//!
//! # Thread safety
//!
//! Batch runs call one resolved backend instance from several workers at
//! once, so implementations must be `Send + Sync` and must not mutate shared
//! state during a conversion without their own synchronisation.

use crate::error::BackendError;
use crate::lifecycle::DownloadStatus;
use crate::output::OutputFormat;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Identity and availability shared by converters and chunkers.
pub trait Backend: Send + Sync {
    /// Unique, stable registry key.
    fn name(&self) -> &str;

    /// True only when every precondition (dependency present, lifecycle
    /// `NOT_REQUIRED` or `READY`) holds. Computed on each call.
    fn available(&self) -> bool;

    /// Why the backend is unavailable; `None` when available.
    fn error_message(&self) -> Option<String>;
}

/// A document-extraction backend.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pdfstract::{Backend, BackendError, Converter, OutputFormat};
/// use std::path::Path;
///
/// struct Upper;
///
/// impl Backend for Upper {
///     fn name(&self) -> &str { "upper" }
///     fn available(&self) -> bool { true }
///     fn error_message(&self) -> Option<String> { None }
/// }
///
/// #[async_trait]
/// impl Converter for Upper {
///     async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
///         Ok(tokio::fs::read_to_string(input).await?.to_uppercase())
///     }
///     fn supports_format(&self, format: OutputFormat) -> bool {
///         format == OutputFormat::Markdown
///     }
/// }
/// ```
#[async_trait]
pub trait Converter: Backend {
    /// Whether this backend kind ever needs a one-time download. Fixed per kind.
    fn requires_download(&self) -> bool {
        false
    }

    fn download_status(&self) -> DownloadStatus {
        DownloadStatus::NotRequired
    }

    /// Message of the last failed download, if any.
    fn download_error(&self) -> Option<String> {
        None
    }

    /// Perform lazy one-time setup and return the resulting availability.
    ///
    /// Idempotent: a no-op on `READY` / `NOT_REQUIRED` backends.
    async fn prepare(&self) -> bool {
        self.available()
    }

    async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError>;

    async fn convert_to_json(&self, input: &Path) -> Result<Value, BackendError> {
        let _ = input;
        Err(BackendError::Other(format!("{} does not produce JSON", self.name())))
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, BackendError> {
        let _ = input;
        Err(BackendError::Other(format!("{} does not produce text", self.name())))
    }

    fn supports_format(&self, format: OutputFormat) -> bool;
}

/// A text-chunking backend.
///
/// Chunking is synchronous CPU work; the engine runs it on the blocking pool.
pub trait Chunker: Backend {
    /// Split `text` into ordered chunks.
    fn chunk(&self, text: &str, params: &ChunkParams) -> Result<Vec<Chunk>, BackendError>;

    /// Describe accepted parameters for introspection.
    fn parameter_schema(&self) -> ParameterSchema;
}

/// A contiguous span of the chunked text.
///
/// Offsets are byte offsets into the original text; `text` is exactly
/// `original[start_offset..end_offset]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Size metric of the chunker (tokens, characters, …).
    pub unit_count: usize,
}

impl Chunk {
    /// Build a chunk for `text[start..end]`.
    pub fn span(text: &str, start: usize, end: usize, unit_count: usize) -> Self {
        Self {
            text: text[start..end].to_string(),
            start_offset: start,
            end_offset: end,
            unit_count,
        }
    }
}

/// Backend-specific chunker parameters (`chunk_size`, `chunk_overlap`, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkParams(Map<String, Value>);

impl ChunkParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Parse a `key=value` assignment. Values that parse as JSON (`512`,
    /// `true`) keep their type; anything else is stored as a string.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), BackendError> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| BackendError::InvalidParameter {
                name: assignment.to_string(),
                reason: "expected key=value".to_string(),
            })?;
        let value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.trim().to_string()));
        self.0.insert(key.trim().to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-negative integer parameter with a default.
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, BackendError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| BackendError::InvalidParameter {
                    name: key.to_string(),
                    reason: format!("expected a non-negative integer, got {v}"),
                }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Introspection record for a chunker's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// JSON type name: `integer`, `boolean`, `string`.
    #[serde(rename = "type")]
    pub kind: String,
    pub default: Value,
    pub description: String,
}

impl ParameterSpec {
    pub fn integer(name: &str, default: usize, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "integer".to_string(),
            default: Value::from(default),
            description: description.to_string(),
        }
    }
}
