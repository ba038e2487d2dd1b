//! Per-backend download / initialisation state machine.
//!
//! Some backends need a one-time, possibly slow, setup before their first
//! conversion (fetching a shared library or model weights). [`Lifecycle`]
//! tracks that setup for one backend instance:
//!
//! ```text
//! NOT_REQUIRED                      (constant for the backend's lifetime)
//!
//! PENDING ──prepare()──▶ DOWNLOADING ──▶ READY
//!    ▲                                ╰─▶ FAILED ──prepare()──▶ DOWNLOADING …
//! ```
//!
//! Concurrent `prepare()` calls on one instance serialise on a mutex owned by
//! that instance, so unrelated backends never wait on each other. A caller
//! that queued behind an in-flight attempt returns that attempt's outcome
//! instead of starting another one; only a caller arriving *after* a FAILED
//! attempt has finished starts a retry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::RwLock;
use tracing::{info, warn};

/// Download / initialisation status of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    /// The backend never needs a download.
    NotRequired,
    /// A download is required and has not been attempted.
    Pending,
    /// A download is in flight.
    Downloading,
    /// Setup finished; the backend may be used.
    Ready,
    /// The last attempt failed; see [`Lifecycle::error`].
    Failed,
}

impl DownloadStatus {
    /// True for the two states in which a backend may report itself available.
    pub fn is_usable(self) -> bool {
        matches!(self, DownloadStatus::NotRequired | DownloadStatus::Ready)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::NotRequired => "not_required",
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Ready => "ready",
            DownloadStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct State {
    status: DownloadStatus,
    error: Option<String>,
    /// Number of finished attempts; lets queued callers detect that the
    /// attempt they waited on has already produced an outcome.
    attempts: u64,
}

/// Lifecycle tracker owned by a single backend instance.
#[derive(Debug)]
pub struct Lifecycle {
    name: String,
    state: RwLock<State>,
    gate: tokio::sync::Mutex<()>,
}

impl Lifecycle {
    /// A backend that never downloads anything.
    pub fn not_required(name: impl Into<String>) -> Self {
        Self::with_status(name, DownloadStatus::NotRequired)
    }

    /// A backend that must be prepared before first use.
    pub fn pending(name: impl Into<String>) -> Self {
        Self::with_status(name, DownloadStatus::Pending)
    }

    /// A download-requiring backend whose artifact is already present.
    pub fn ready(name: impl Into<String>) -> Self {
        Self::with_status(name, DownloadStatus::Ready)
    }

    fn with_status(name: impl Into<String>, status: DownloadStatus) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State {
                status,
                error: None,
                attempts: 0,
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current status.
    pub fn status(&self) -> DownloadStatus {
        self.read(|s| s.status)
    }

    /// Error text of the last failed attempt.
    pub fn error(&self) -> Option<String> {
        self.read(|s| s.error.clone())
    }

    /// Whether this lifecycle ever involves a download.
    pub fn requires_download(&self) -> bool {
        self.status() != DownloadStatus::NotRequired
    }

    /// Run `fetch` at most once per attempt and return the terminal status.
    ///
    /// `NOT_REQUIRED` and `READY` return immediately without calling `fetch`.
    pub async fn prepare_with<F, Fut>(&self, fetch: F) -> DownloadStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let seen = match self.read(|s| (s.status, s.attempts)) {
            (status, _) if status.is_usable() => return status,
            (_, attempts) => attempts,
        };

        let _guard = self.gate.lock().await;

        let (status, attempts) = self.read(|s| (s.status, s.attempts));
        if status.is_usable() || attempts > seen {
            return status;
        }

        self.write(|s| {
            s.status = DownloadStatus::Downloading;
            s.error = None;
        });
        info!("{}: preparing (attempt {})", self.name, attempts + 1);

        let outcome = fetch().await;

        self.write(|s| {
            s.attempts += 1;
            match outcome {
                Ok(()) => {
                    s.status = DownloadStatus::Ready;
                    info!("{}: ready", self.name);
                }
                Err(ref e) => {
                    s.status = DownloadStatus::Failed;
                    s.error = Some(e.clone());
                    warn!("{}: preparation failed: {}", self.name, e);
                }
            }
        });

        self.status()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        match self.state.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write(&self, f: impl FnOnce(&mut State)) {
        match self.state.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn not_required_never_fetches() {
        let lc = Lifecycle::not_required("plaintext");
        let calls = AtomicUsize::new(0);
        let status = lc
            .prepare_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(status, DownloadStatus::NotRequired);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!lc.requires_download());
    }

    #[tokio::test]
    async fn ready_is_idempotent() {
        let lc = Lifecycle::pending("pdfium");
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let status = lc
                .prepare_with(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert_eq!(status, DownloadStatus::Ready);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_recorded_and_retry_is_explicit() {
        let lc = Lifecycle::pending("pdfium");
        let status = lc.prepare_with(|| async { Err("HTTP 503".to_string()) }).await;
        assert_eq!(status, DownloadStatus::Failed);
        assert_eq!(lc.error().as_deref(), Some("HTTP 503"));

        let status = lc.prepare_with(|| async { Ok(()) }).await;
        assert_eq!(status, DownloadStatus::Ready);
        assert_eq!(lc.error(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_prepare_downloads_once() {
        let lc = Arc::new(Lifecycle::pending("model"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lc = Arc::clone(&lc);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                lc.prepare_with(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                })
                .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), DownloadStatus::Ready);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_waiters_share_a_failure() {
        let lc = Arc::new(Lifecycle::pending("model"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lc = Arc::clone(&lc);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                lc.prepare_with(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err("disk full".to_string())
                })
                .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), DownloadStatus::Failed);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_serialises_screaming_snake() {
        let json = serde_json::to_string(&DownloadStatus::NotRequired).unwrap();
        assert_eq!(json, "\"NOT_REQUIRED\"");
        assert!(DownloadStatus::Ready.is_usable());
        assert!(!DownloadStatus::Downloading.is_usable());
    }
}
