//! Character-budget chunker that prefers the largest semantic boundary
//! (paragraph, line, sentence, word) which keeps a chunk within budget.

use crate::capability::{Backend, Chunk, ChunkParams, Chunker, ParameterSchema, ParameterSpec};
use crate::error::BackendError;
use text_splitter::{Characters, ChunkCapacity, ChunkConfig, TextSplitter};

#[derive(Debug, Default)]
pub struct RecursiveChunker;

impl RecursiveChunker {
    pub const NAME: &'static str = "recursive";
    pub const DEFAULT_CHUNK_SIZE: usize = 2048;
}

fn build_chunk_config(size: usize, overlap: usize) -> Result<ChunkConfig<Characters>, BackendError> {
    ChunkConfig::new(ChunkCapacity::new(size))
        .with_overlap(overlap)
        .map(|config| config.with_trim(false))
        .map_err(|e| BackendError::InvalidParameter {
            name: "chunk_overlap".into(),
            reason: e.to_string(),
        })
}

impl Backend for RecursiveChunker {
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

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str, params: &ChunkParams) -> Result<Vec<Chunk>, BackendError> {
        let size = params.usize_or("chunk_size", Self::DEFAULT_CHUNK_SIZE)?;
        let overlap = params.usize_or("chunk_overlap", 0)?;
        if size == 0 {
            return Err(BackendError::InvalidParameter {
                name: "chunk_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let splitter = TextSplitter::new(build_chunk_config(size, overlap)?);
        Ok(splitter
            .chunk_indices(text)
            .map(|(offset, piece)| {
                Chunk::span(text, offset, offset + piece.len(), piece.chars().count())
            })
            .collect())
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema {
            name: Self::NAME.into(),
            description: "Splits on paragraphs, then lines, sentences and words to fit N characters"
                .into(),
            parameters: vec![
                ParameterSpec::integer("chunk_size", Self::DEFAULT_CHUNK_SIZE, "Characters per chunk"),
                ParameterSpec::integer("chunk_overlap", 0, "Characters shared by consecutive chunks"),
            ],
        }
    }
}
