//! Parallel batch conversion over a bounded worker pool.
//!
//! The input list is fixed and sorted before any worker starts. `workers`
//! tasks share one queue; each item is a full single-item conversion run
//! inside `catch_unwind`, so a failing or panicking item only marks its own
//! entry as failed.

use crate::engine::{block_on, run_conversion, Stract};
use crate::error::StractError;
use crate::output::{BatchItem, BatchResult, Content, OutputFormat};
use futures::FutureExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

struct Job {
    index: usize,
    id: String,
    path: PathBuf,
}

impl Stract {
    /// Convert every `*.pdf` file directly inside `dir`.
    ///
    /// The directory listing is taken once; files created during the run are
    /// not picked up.
    pub async fn batch_convert_async(
        &self,
        dir: impl AsRef<Path>,
        backend: &str,
        format: OutputFormat,
        workers: Option<usize>,
    ) -> Result<BatchResult, StractError> {
        let inputs = list_pdfs(dir.as_ref()).await?;
        self.batch_convert_paths_async(inputs, backend, format, workers).await
    }

    pub fn batch_convert(
        &self,
        dir: impl AsRef<Path>,
        backend: &str,
        format: OutputFormat,
        workers: Option<usize>,
    ) -> Result<BatchResult, StractError> {
        block_on(self.batch_convert_async(dir, backend, format, workers))?
    }

    /// Convert an explicit list of inputs with `workers` concurrent workers
    /// (the configured default when `None`).
    ///
    /// Backend resolution failures abort the whole batch. Per-item failures
    /// are recorded in the result and never abort it.
    pub async fn batch_convert_paths_async(
        &self,
        inputs: Vec<PathBuf>,
        backend: &str,
        format: OutputFormat,
        workers: Option<usize>,
    ) -> Result<BatchResult, StractError> {
        if inputs.is_empty() {
            info!("Batch with {backend}: no inputs");
            return Ok(BatchResult::default());
        }

        let converter = self.acquire_converter(backend).await?;
        let jobs: VecDeque<Job> = keyed_inputs(inputs)
            .into_iter()
            .enumerate()
            .map(|(index, (id, path))| Job { index, id, path })
            .collect();
        let total = jobs.len();
        let workers = workers.unwrap_or(self.config.workers).clamp(1, total);
        let progress = self.config.progress.clone();
        let timeout = self.config.download_timeout_secs;

        info!("Batch with {backend}: {total} inputs, {workers} workers, format {format}");
        if let Some(cb) = &progress {
            cb.on_batch_start(total);
        }

        let queue = Arc::new(Mutex::new(jobs));
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let converter = Arc::clone(&converter);
            let progress = progress.clone();
            set.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let next = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some(job) = next else { break };

                    debug!("worker {worker}: {} ({}/{total})", job.id, job.index + 1);
                    if let Some(cb) = &progress {
                        cb.on_item_start(&job.id, job.index, total);
                    }
                    let outcome = AssertUnwindSafe(run_conversion(converter.as_ref(), &job.path, format, timeout))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(StractError::Internal(format!("worker panicked on {}", job.id))));
                    let item = item_from(&job.id, outcome, progress.as_deref());
                    done.push((job.id, item));
                }
                done
            });
        }

        let mut result = BatchResult::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(items) => {
                    for (id, item) in items {
                        result.record(id, item);
                    }
                }
                Err(e) => return Err(StractError::Internal(format!("batch worker failed: {e}"))),
            }
        }

        info!(
            "Batch with {backend} finished: {} succeeded, {} failed",
            result.success, result.failed
        );
        if let Some(cb) = &progress {
            cb.on_batch_complete(total, result.success);
        }
        Ok(result)
    }

    pub fn batch_convert_paths(
        &self,
        inputs: Vec<PathBuf>,
        backend: &str,
        format: OutputFormat,
        workers: Option<usize>,
    ) -> Result<BatchResult, StractError> {
        block_on(self.batch_convert_paths_async(inputs, backend, format, workers))?
    }
}

fn item_from(
    id: &str,
    outcome: Result<Content, StractError>,
    progress: Option<&dyn crate::progress::BatchProgressCallback>,
) -> BatchItem {
    match outcome {
        Ok(content) => {
            if let Some(cb) = progress {
                cb.on_item_complete(id, content.len());
            }
            BatchItem::Converted(content)
        }
        Err(e) => {
            warn!("{id}: {e}");
            let error = e.to_string();
            if let Some(cb) = progress {
                cb.on_item_error(id, &error);
            }
            BatchItem::Failed { error }
        }
    }
}

/// Pair each input with its result key, sorted by key.
///
/// The key is the file name; inputs whose file names collide use their full
/// path instead. A path listed more than once keeps one entry per occurrence,
/// the repeats keyed `<id>#2`, `<id>#3` and so on.
pub(crate) fn keyed_inputs(inputs: Vec<PathBuf>) -> Vec<(String, PathBuf)> {
    let file_name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.display().to_string())
    };
    let mut counts: HashMap<String, usize> = HashMap::new();
    for p in &inputs {
        *counts.entry(file_name(p)).or_default() += 1;
    }
    let mut keyed: Vec<(String, PathBuf)> = inputs
        .into_iter()
        .map(|p| {
            let name = file_name(&p);
            let id = if counts[&name] > 1 { p.display().to_string() } else { name };
            (id, p)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut taken: HashSet<String> = keyed.iter().map(|(id, _)| id.clone()).collect();
    let mut prev: Option<String> = None;
    let mut repeat = 1;
    for (id, _) in keyed.iter_mut() {
        if prev.as_deref() == Some(id.as_str()) {
            let base = id.clone();
            let mut candidate;
            loop {
                repeat += 1;
                candidate = format!("{base}#{repeat}");
                if taken.insert(candidate.clone()) {
                    break;
                }
            }
            *id = candidate;
        } else {
            prev = Some(id.clone());
            repeat = 1;
        }
    }
    keyed
}

/// Snapshot of the `*.pdf` regular files in `dir`.
async fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, StractError> {
    if !dir.is_dir() {
        return Err(StractError::InputNotFound {
            path: dir.to_path_buf(),
            reason: dir.exists().then(|| "not a directory".to_string()),
        });
    }
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| StractError::InputNotFound {
        path: dir.to_path_buf(),
        reason: Some(e.to_string()),
    })?;
    let mut pdfs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StractError::InputNotFound {
        path: dir.to_path_buf(),
        reason: Some(e.to_string()),
    })? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    debug!("Found {} PDF files in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}
