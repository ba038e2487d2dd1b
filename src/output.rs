//! Values returned by conversions, chunking and batch runs.

use crate::capability::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Output shape requested from a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown string (default).
    #[default]
    Markdown,
    /// Structured JSON record.
    Json,
    /// Plain text string.
    Text,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Markdown, OutputFormat::Json, OutputFormat::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format '{other}' (expected markdown, json or text)")),
        }
    }
}

/// Content produced by one conversion.
///
/// Serialises untagged, so a markdown result is a bare JSON string and a JSON
/// result is the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Json(serde_json::Value),
}

impl Content {
    /// Textual rendering used when feeding content to a chunker.
    ///
    /// Strings pass through unchanged; JSON records are pretty-printed.
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Content::Json(v) => Some(v),
            Content::Text(_) => None,
        }
    }

    /// Length of the textual rendering in bytes.
    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Json(v) => v.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome for one batch item: content, or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Failed { error: String },
    Converted(Content),
}

impl BatchItem {
    pub fn is_error(&self) -> bool {
        matches!(self, BatchItem::Failed { .. })
    }

    pub fn content(&self) -> Option<&Content> {
        match self {
            BatchItem::Converted(c) => Some(c),
            BatchItem::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BatchItem::Failed { error } => Some(error),
            BatchItem::Converted(_) => None,
        }
    }
}

/// Aggregate of a batch run, keyed by a stable per-input identifier.
///
/// `success + failed == results.len()` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: usize,
    pub failed: usize,
    pub results: BTreeMap<String, BatchItem>,
}

impl BatchResult {
    /// Record one item and bump the matching counter.
    pub(crate) fn record(&mut self, id: String, item: BatchItem) {
        if item.is_error() {
            self.failed += 1;
        } else {
            self.success += 1;
        }
        self.results.insert(id, item);
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// Result of chunking one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingResult {
    pub chunks: Vec<Chunk>,
    pub chunker_name: String,
    pub total_chunks: usize,
    pub total_tokens: usize,
}

impl ChunkingResult {
    pub fn new(chunker_name: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        let total_tokens = chunks.iter().map(|c| c.unit_count).sum();
        Self {
            total_chunks: chunks.len(),
            total_tokens,
            chunker_name: chunker_name.into(),
            chunks,
        }
    }
}

/// Result of the extract → chunk pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertChunkOutput {
    pub extracted_content: Content,
    pub chunking_result: ChunkingResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_format_parses_aliases() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!(" JSON ".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("html".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn json_content_renders_as_text() {
        let c = Content::Json(json!({"content": "hi"}));
        assert!(c.to_text().contains("\"content\": \"hi\""));
        assert_eq!(Content::Text("plain".into()).to_text(), "plain");
    }

    #[test]
    fn batch_result_serialises_like_a_map_of_content_or_error() {
        let mut r = BatchResult::default();
        r.record("a.pdf".into(), BatchItem::Converted(Content::Text("# A".into())));
        r.record(
            "b.pdf".into(),
            BatchItem::Failed {
                error: "boom".into(),
            },
        );

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(
            v,
            json!({"success": 1, "failed": 1, "results": {"a.pdf": "# A", "b.pdf": {"error": "boom"}}})
        );
        assert_eq!(r.total(), 2);
    }

    #[test]
    fn chunking_result_totals() {
        let chunks = vec![
            Chunk {
                text: "a b".into(),
                start_offset: 0,
                end_offset: 3,
                unit_count: 2,
            },
            Chunk {
                text: " c".into(),
                start_offset: 3,
                end_offset: 5,
                unit_count: 1,
            },
        ];
        let r = ChunkingResult::new("token", chunks);
        assert_eq!(r.total_chunks, 2);
        assert_eq!(r.total_tokens, 3);
    }
}
