//! Fixed-size windows of whitespace-separated tokens.

use super::token_spans;
use crate::capability::{Backend, Chunk, ChunkParams, Chunker, ParameterSchema, ParameterSpec};
use crate::error::BackendError;

#[derive(Debug, Default)]
pub struct TokenChunker;

impl TokenChunker {
    pub const NAME: &'static str = "token";
    pub const DEFAULT_CHUNK_SIZE: usize = 512;
}

impl Backend for TokenChunker {
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

impl Chunker for TokenChunker {
    fn chunk(&self, text: &str, params: &ChunkParams) -> Result<Vec<Chunk>, BackendError> {
        let size = params.usize_or("chunk_size", Self::DEFAULT_CHUNK_SIZE)?;
        let overlap = params.usize_or("chunk_overlap", 0)?;
        if size == 0 {
            return Err(BackendError::InvalidParameter {
                name: "chunk_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        if overlap >= size {
            return Err(BackendError::InvalidParameter {
                name: "chunk_overlap".into(),
                reason: format!("must be smaller than chunk_size ({size})"),
            });
        }

        let spans = token_spans(text);
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        // Each window starts at its first token (the first window at 0) and
        // runs up to the next token after its last one (the last to the end),
        // so whitespace between windows belongs to the earlier one.
        let step = size - overlap;
        let mut chunks = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + size).min(spans.len());
            let start = if first == 0 { 0 } else { spans[first].0 };
            let end = if last == spans.len() { text.len() } else { spans[last].0 };
            chunks.push(Chunk::span(text, start, end, last - first));
            if last == spans.len() {
                break;
            }
            first += step;
        }
        Ok(chunks)
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema {
            name: Self::NAME.into(),
            description: "Splits text into windows of N whitespace-separated tokens".into(),
            parameters: vec![
                ParameterSpec::integer("chunk_size", Self::DEFAULT_CHUNK_SIZE, "Tokens per chunk"),
                ParameterSpec::integer("chunk_overlap", 0, "Tokens shared by consecutive chunks"),
            ],
        }
    }
}
