//! Built-in converter backends.
//!
//! | Name        | Mechanism                          | Download |
//! |-------------|------------------------------------|----------|
//! | `pdfium`    | in-process PDFium text extraction  | PDFium shared library |
//! | `mineru`    | `mineru` CLI subprocess            | none (tool manages its models) |
//! | `vlm`       | PDFium rasterisation + vision LLM  | PDFium shared library |
//! | `plaintext` | reads UTF-8 text / markdown        | none |

pub mod markdown;
pub mod mineru;
pub mod pdfium;
pub mod plaintext;
pub mod vlm;

use crate::capability::Converter;
use crate::config::StractConfig;
use crate::registry::BackendSpec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use mineru::MineruConverter;
pub use pdfium::{PdfiumConverter, PdfiumLibrary};
pub use plaintext::PlainTextConverter;
pub use vlm::VlmConverter;

/// Tag of each built-in converter, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConverterKind {
    Pdfium,
    Mineru,
    Vlm,
    PlainText,
}

impl ConverterKind {
    pub const ALL: [ConverterKind; 4] = [
        ConverterKind::Pdfium,
        ConverterKind::Mineru,
        ConverterKind::Vlm,
        ConverterKind::PlainText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConverterKind::Pdfium => PdfiumConverter::NAME,
            ConverterKind::Mineru => MineruConverter::NAME,
            ConverterKind::Vlm => VlmConverter::NAME,
            ConverterKind::PlainText => PlainTextConverter::NAME,
        }
    }

    pub fn requires_download(self) -> bool {
        matches!(self, ConverterKind::Pdfium | ConverterKind::Vlm)
    }

    pub fn build(self, config: &StractConfig) -> Arc<dyn Converter> {
        match self {
            ConverterKind::Pdfium => Arc::new(PdfiumConverter::new(cache_root(config))),
            ConverterKind::Mineru => Arc::new(MineruConverter::new(
                config.mineru_binary.clone(),
                config.mineru_backend.clone(),
                Duration::from_secs(config.process_timeout_secs),
            )),
            ConverterKind::Vlm => Arc::new(VlmConverter::new(config, cache_root(config))),
            ConverterKind::PlainText => Arc::new(PlainTextConverter),
        }
    }

    pub fn spec(self, config: Arc<StractConfig>) -> BackendSpec<dyn Converter> {
        BackendSpec::new(self.name(), self.requires_download(), move || self.build(&config))
    }
}

/// Catalog of every built-in converter.
pub fn builtin_converters(config: &StractConfig) -> Vec<BackendSpec<dyn Converter>> {
    let config = Arc::new(config.clone());
    ConverterKind::ALL
        .iter()
        .map(|kind| kind.spec(Arc::clone(&config)))
        .collect()
}

fn cache_root(config: &StractConfig) -> PathBuf {
    config
        .cache_dir
        .clone()
        .unwrap_or_else(artifact_fetch::cache_root)
}
