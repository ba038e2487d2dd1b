//! # pdfstract
//!
//! One interface over many document-extraction and text-chunking backends.
//!
//! Backends are selected by name from a registry. Each one either converts a
//! document to markdown, JSON or plain text, or splits text into chunks.
//! The engine owns resolution, input checks, lazy one-time setup (such as
//! downloading the PDFium library), error classification and parallel batch
//! runs, so every backend looks the same to callers.
//!
//! ## Flow
//!
//! ```text
//! input (path | URL | bytes)
//!  │
//!  ├─ 1. Resolve   registry snapshot lookup by name
//!  ├─ 2. Prepare   lazy download, once per backend instance
//!  ├─ 3. Input     local file check / URL download to a temp dir
//!  ├─ 4. Convert   markdown | json | text
//!  └─ 5. Chunk     token | sentence | recursive | auto
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfstract::{ChunkParams, OutputFormat, Stract, StractConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stract = Stract::new(StractConfig::default());
//!     for backend in stract.list_backends() {
//!         println!("{:<10} available={}", backend.name, backend.available);
//!     }
//!
//!     let out = stract
//!         .convert_chunk_async(
//!             "paper.pdf",
//!             "pdfium",
//!             "token",
//!             OutputFormat::Markdown,
//!             &ChunkParams::new().with("chunk_size", 256),
//!         )
//!         .await?;
//!     println!("{} chunks", out.chunking_result.total_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Built-in backends
//!
//! | Converter   | Mechanism                         |
//! |-------------|-----------------------------------|
//! | `pdfium`    | in-process PDFium text extraction |
//! | `mineru`    | `mineru` CLI subprocess           |
//! | `vlm`       | page images sent to a vision LLM  |
//! | `plaintext` | UTF-8 text and markdown files     |
//!
//! Chunkers: `token`, `sentence`, `recursive`. The name `auto` picks the
//! first available one.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfstract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod capability;
pub mod chunkers;
pub mod config;
pub mod converters;
pub mod engine;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capability::{Backend, Chunk, ChunkParams, Chunker, Converter, ParameterSchema, ParameterSpec};
pub use config::{ConfigSummary, StractConfig, StractConfigBuilder};
pub use engine::{Stract, AUTO_CHUNKER};
pub use error::{BackendError, StractError};
pub use lifecycle::{DownloadStatus, Lifecycle};
pub use output::{BatchItem, BatchResult, ChunkingResult, Content, ConvertChunkOutput, OutputFormat};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{BackendDescriptor, BackendSpec, Registry};
pub use store::{EnablementStore, JsonFileStore, MemoryStore};
pub use stream::BatchStream;
