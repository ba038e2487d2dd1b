//! Extract, then chunk.

use crate::capability::ChunkParams;
use crate::engine::{block_on, Stract};
use crate::error::StractError;
use crate::output::{ConvertChunkOutput, OutputFormat};
use std::path::Path;
use tracing::debug;

impl Stract {
    /// Convert `input` with `backend`, then chunk the result with `chunker`.
    ///
    /// Chunking is skipped when conversion fails and the conversion error is
    /// returned as is. JSON output is chunked in its pretty-printed form.
    pub async fn convert_chunk_async(
        &self,
        input: impl AsRef<Path>,
        backend: &str,
        chunker: &str,
        format: OutputFormat,
        params: &ChunkParams,
    ) -> Result<ConvertChunkOutput, StractError> {
        let extracted_content = self.convert_async(input, backend, format).await?;
        let text = extracted_content.to_text();
        debug!("Chunking {} bytes of {format} output with {chunker}", text.len());
        let chunking_result = self.chunk_async(&text, chunker, params).await?;
        Ok(ConvertChunkOutput {
            extracted_content,
            chunking_result,
        })
    }

    pub fn convert_chunk(
        &self,
        input: impl AsRef<Path>,
        backend: &str,
        chunker: &str,
        format: OutputFormat,
        params: &ChunkParams,
    ) -> Result<ConvertChunkOutput, StractError> {
        block_on(self.convert_chunk_async(input, backend, chunker, format, params))?
    }
}
