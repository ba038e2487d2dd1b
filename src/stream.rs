//! Streaming batch API: emit each input's outcome as soon as it finishes.
//!
//! [`Stract::batch_convert_paths_async`] returns only after every item is
//! done. [`Stract::batch_convert_stream`] yields `(id, result)` pairs in
//! completion order instead, so callers can write files or update a UI while
//! the rest of the batch is still running.

use crate::batch::keyed_inputs;
use crate::engine::{run_conversion, Stract};
use crate::error::StractError;
use crate::output::{Content, OutputFormat};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-input outcomes, keyed like [`crate::BatchResult`].
pub type BatchStream = Pin<Box<dyn Stream<Item = (String, Result<Content, StractError>)> + Send>>;

impl Stract {
    /// Convert `inputs` concurrently, yielding outcomes as they complete.
    ///
    /// The backend is resolved and prepared before the stream is returned,
    /// so resolution errors surface here rather than per item. Dropping the
    /// stream stops scheduling new items.
    ///
    /// # Example
    /// ```rust,no_run
    /// use futures::StreamExt;
    /// use pdfstract::{OutputFormat, Stract, StractConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let stract = Stract::new(StractConfig::default());
    /// let inputs = vec!["a.pdf".into(), "b.pdf".into()];
    /// let mut s = stract
    ///     .batch_convert_stream(inputs, "pdfium", OutputFormat::Markdown, Some(2))
    ///     .await?;
    /// while let Some((id, outcome)) = s.next().await {
    ///     match outcome {
    ///         Ok(content) => println!("{id}: {} bytes", content.len()),
    ///         Err(e) => eprintln!("{id}: {e}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn batch_convert_stream(
        &self,
        inputs: Vec<PathBuf>,
        backend: &str,
        format: OutputFormat,
        workers: Option<usize>,
    ) -> Result<BatchStream, StractError> {
        if inputs.is_empty() {
            return Ok(Box::pin(stream::empty()));
        }

        let converter = self.acquire_converter(backend).await?;
        let keyed = keyed_inputs(inputs);
        let concurrency = workers.unwrap_or(self.config.workers).max(1);
        let timeout = self.config.download_timeout_secs;
        info!(
            "Streaming batch with {backend}: {} inputs, concurrency {concurrency}",
            keyed.len()
        );

        let s = stream::iter(keyed.into_iter().map(move |(id, path)| {
            let converter = Arc::clone(&converter);
            async move {
                let outcome = AssertUnwindSafe(run_conversion(converter.as_ref(), &path, format, timeout))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(StractError::Internal(format!("conversion panicked on {id}"))));
                (id, outcome)
            }
        }))
        .buffer_unordered(concurrency);

        Ok(Box::pin(s))
    }
}
