//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::StractConfigBuilder::progress`] to receive events as the
//! worker pool processes each input. The CLI drives an `indicatif` bar from
//! these events.
//!
//! # Example
//!
//! ```rust
//! use pdfstract::{BatchProgressCallback, StractConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, _id: &str, _content_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = StractConfig::builder()
//!     .progress(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch engine as items move through the worker pool.
///
/// Item events arrive concurrently from different workers; implementations
/// must synchronise their own state. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the input list is fixed and the backend resolved.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks up an item. `index` is 0-based in sorted order.
    fn on_item_start(&self, id: &str, index: usize, total: usize) {
        let _ = (id, index, total);
    }

    /// Called when an item converted successfully.
    fn on_item_complete(&self, id: &str, content_len: usize) {
        let _ = (id, content_len);
    }

    /// Called when an item failed; the batch continues.
    fn on_item_error(&self, id: &str, error: &str) {
        let _ = (id, error);
    }

    /// Called once after every item has been attempted.
    fn on_batch_complete(&self, total: usize, success: usize) {
        let _ = (total, success);
    }
}

/// Callback that ignores every event. Used when none is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
