//! Sentence-grouping chunker.
//!
//! Sentences end at terminal punctuation (optionally followed by closing
//! quotes or brackets) plus the whitespace after it. The whitespace stays
//! with the sentence it follows, so sentences tile the input exactly.
//! Sentences are grouped greedily until the next one would push the chunk
//! past `chunk_size` tokens; a chunk always holds at least
//! `min_sentences_per_chunk` sentences, even if that overflows the budget.

use super::token_spans;
use crate::capability::{Backend, Chunk, ChunkParams, Chunker, ParameterSchema, ParameterSpec};
use crate::error::BackendError;
use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap());

#[derive(Debug, Default)]
pub struct SentenceChunker;

impl SentenceChunker {
    pub const NAME: &'static str = "sentence";
    pub const DEFAULT_CHUNK_SIZE: usize = 512;
}

/// Byte spans of sentences, covering `text` without gaps.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        spans.push((start, m.end()));
        start = m.end();
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

impl Backend for SentenceChunker {
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

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str, params: &ChunkParams) -> Result<Vec<Chunk>, BackendError> {
        let size = params.usize_or("chunk_size", Self::DEFAULT_CHUNK_SIZE)?;
        let min_sentences = params.usize_or("min_sentences_per_chunk", 1)?;
        if size == 0 {
            return Err(BackendError::InvalidParameter {
                name: "chunk_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        if min_sentences == 0 {
            return Err(BackendError::InvalidParameter {
                name: "min_sentences_per_chunk".into(),
                reason: "must be at least 1".into(),
            });
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let sentences: Vec<(usize, usize, usize)> = sentence_spans(text)
            .into_iter()
            .map(|(s, e)| (s, e, token_spans(&text[s..e]).len()))
            .collect();

        let mut chunks = Vec::new();
        let mut i = 0;
        while i < sentences.len() {
            let start = sentences[i].0;
            let mut tokens = 0;
            let mut taken = 0;
            while i + taken < sentences.len() {
                let next = sentences[i + taken].2;
                if taken >= min_sentences && tokens + next > size {
                    break;
                }
                tokens += next;
                taken += 1;
            }
            let end = sentences[i + taken - 1].1;
            chunks.push(Chunk::span(text, start, end, tokens));
            i += taken;
        }
        Ok(chunks)
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema {
            name: Self::NAME.into(),
            description: "Groups whole sentences into chunks of at most N tokens".into(),
            parameters: vec![
                ParameterSpec::integer("chunk_size", Self::DEFAULT_CHUNK_SIZE, "Token budget per chunk"),
                ParameterSpec::integer(
                    "min_sentences_per_chunk",
                    1,
                    "Sentences per chunk regardless of the budget",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunkers::assert_contiguous;

    #[test]
    fn sentences_tile_the_text() {
        let text = "First one. Second one?!  \"Third.\" Tail without stop";
        let spans = sentence_spans(text);
        let parts: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(
            parts,
            vec!["First one. ", "Second one?!  ", "\"Third.\" ", "Tail without stop"]
        );
    }

    #[test]
    fn groups_by_token_budget() {
        let text = "One two three. Four five. Six seven eight nine. Ten.";
        let chunks = SentenceChunker
            .chunk(text, &ChunkParams::new().with("chunk_size", 5))
            .unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["One two three. Four five. ", "Six seven eight nine. Ten."]);
        assert_eq!(chunks[0].unit_count, 5);
        assert_contiguous(text, &chunks);
    }

    #[test]
    fn oversized_sentence_still_forms_a_chunk() {
        let text = "a b c d e f g. h.";
        let chunks = SentenceChunker
            .chunk(text, &ChunkParams::new().with("chunk_size", 3))
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].unit_count, 7);
        assert_contiguous(text, &chunks);
    }

    #[test]
    fn min_sentences_overrides_budget() {
        let text = "a b. c d. e f.";
        let chunks = SentenceChunker
            .chunk(
                text,
                &ChunkParams::new()
                    .with("chunk_size", 1)
                    .with("min_sentences_per_chunk", 2),
            )
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b. c d. ");
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(SentenceChunker.chunk("  \n", &ChunkParams::new()).unwrap().is_empty());
    }
}
