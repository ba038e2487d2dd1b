//! Built-in chunkers.
//!
//! Every chunker returns chunks whose `text` is exactly the slice
//! `original[start_offset..end_offset]`. With zero overlap, chunks are
//! contiguous and their concatenation reproduces the input.

pub mod recursive;
pub mod sentence;
pub mod token;

use crate::capability::Chunker;
use crate::registry::BackendSpec;
use std::sync::Arc;

pub use recursive::RecursiveChunker;
pub use sentence::SentenceChunker;
pub use token::TokenChunker;

/// Tag of each built-in chunker, in registry order. The first available one
/// is the `auto` choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkerKind {
    Token,
    Sentence,
    Recursive,
}

impl ChunkerKind {
    pub const ALL: [ChunkerKind; 3] = [ChunkerKind::Token, ChunkerKind::Sentence, ChunkerKind::Recursive];

    pub fn name(self) -> &'static str {
        match self {
            ChunkerKind::Token => TokenChunker::NAME,
            ChunkerKind::Sentence => SentenceChunker::NAME,
            ChunkerKind::Recursive => RecursiveChunker::NAME,
        }
    }

    pub fn build(self) -> Arc<dyn Chunker> {
        match self {
            ChunkerKind::Token => Arc::new(TokenChunker),
            ChunkerKind::Sentence => Arc::new(SentenceChunker),
            ChunkerKind::Recursive => Arc::new(RecursiveChunker),
        }
    }

    pub fn spec(self) -> BackendSpec<dyn Chunker> {
        BackendSpec::new(self.name(), false, move || self.build())
    }
}

pub fn builtin_chunkers() -> Vec<BackendSpec<dyn Chunker>> {
    ChunkerKind::ALL.iter().map(|k| k.spec()).collect()
}

/// Byte spans of whitespace-separated tokens.
pub(crate) fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

#[cfg(test)]
pub(crate) fn assert_contiguous(text: &str, chunks: &[crate::capability::Chunk]) {
    let mut rebuilt = String::new();
    let mut pos = 0;
    for c in chunks {
        assert_eq!(c.start_offset, pos, "gap or overlap before {c:?}");
        assert_eq!(&text[c.start_offset..c.end_offset], c.text);
        rebuilt.push_str(&c.text);
        pos = c.end_offset;
    }
    assert_eq!(rebuilt, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_spans_handle_edges() {
        assert_eq!(token_spans("  ab  c\n"), vec![(2, 4), (6, 7)]);
        assert_eq!(token_spans("x"), vec![(0, 1)]);
        assert!(token_spans(" \n\t").is_empty());
    }

    #[test]
    fn token_spans_respect_multibyte_chars() {
        let text = "héllo wörld";
        let spans = token_spans(text);
        assert_eq!(&text[spans[0].0..spans[0].1], "héllo");
        assert_eq!(&text[spans[1].0..spans[1].1], "wörld");
    }

    #[test]
    fn catalog_order_puts_token_first() {
        let names: Vec<String> = builtin_chunkers().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["token", "sentence", "recursive"]);
    }
}
