//! Pass-through converter for files that are already text or markdown.

use crate::capability::{Backend, Converter};
use crate::converters::markdown::strip_markdown;
use crate::error::BackendError;
use crate::output::OutputFormat;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;

/// Reads UTF-8 `.txt` / `.md` files. Needs no dependency and no download.
#[derive(Debug, Default)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    pub const NAME: &'static str = "plaintext";
}

async fn read_utf8(input: &Path) -> Result<String, BackendError> {
    let bytes = tokio::fs::read(input).await?;
    String::from_utf8(bytes)
        .map_err(|e| BackendError::Other(format!("{} is not valid UTF-8: {e}", input.display())))
}

impl Backend for PlainTextConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn available(&self) -> bool {
        true
    }

    fn error_message(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl Converter for PlainTextConverter {
    async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
        read_utf8(input).await
    }

    async fn convert_to_json(&self, input: &Path) -> Result<Value, BackendError> {
        let content = read_utf8(input).await?;
        Ok(json!({
            "content": content,
            "format": "markdown",
            "library": Self::NAME,
        }))
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, BackendError> {
        Ok(strip_markdown(&read_utf8(input).await?))
    }

    fn supports_format(&self, _format: OutputFormat) -> bool {
        true
    }
}
