//! Input resolution: normalise a path, URL or byte buffer to a local file.
//!
//! Every backend takes a file-system path. URL and in-memory inputs are
//! written into a [`TempDir`] owned by the returned [`ResolvedInput`], so the
//! scratch file disappears when the conversion finishes.

use crate::error::StractError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a caller-owned local path or a managed temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// Written into a temp dir kept alive until the value is dropped.
    Managed { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Managed { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or `http(s)://` URL.
///
/// A missing local file and a failed download both surface as
/// [`StractError::InputNotFound`].
pub async fn resolve_input(input: &Path, timeout_secs: u64) -> Result<ResolvedInput, StractError> {
    match input.to_str() {
        Some(s) if is_url(s) => download_url(s, timeout_secs).await,
        _ => resolve_local(input),
    }
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, StractError> {
    if !path.is_file() {
        return Err(StractError::InputNotFound {
            path: path.to_path_buf(),
            reason: path.exists().then(|| "not a regular file".to_string()),
        });
    }
    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

/// Write `bytes` to `<tempdir>/<file_name>`.
///
/// Only the final component of `file_name` is used; the extension is kept so
/// backends that dispatch on it keep working.
pub async fn materialize_bytes(bytes: &[u8], file_name: &str) -> Result<ResolvedInput, StractError> {
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_os_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "input.pdf".into());

    let temp_dir = TempDir::new().map_err(|e| StractError::Internal(format!("cannot create temp dir: {e}")))?;
    let path = temp_dir.path().join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| StractError::Internal(format!("failed to write temp file: {e}")))?;
    debug!("Materialised {} bytes at {}", bytes.len(), path.display());

    Ok(ResolvedInput::Managed {
        path,
        _temp_dir: temp_dir,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, StractError> {
    info!("Downloading input from: {}", url);
    let not_found = |reason: String| StractError::InputNotFound {
        path: PathBuf::from(url),
        reason: Some(reason),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| not_found(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            not_found(format!("download timed out after {timeout_secs}s"))
        } else {
            not_found(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(not_found(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(|e| not_found(e.to_string()))?;
    let resolved = materialize_bytes(&bytes, &filename).await?;
    info!("Downloaded to: {}", resolved.path().display());
    Ok(resolved)
}

/// Last path segment if it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://x.org/papers/a.pdf"), "a.pdf");
        assert_eq!(filename_from_url("https://x.org/papers/"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_local_file_is_input_not_found() {
        let err = resolve_input(Path::new("/definitely/not/here.pdf"), 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "input_not_found");
    }

    #[tokio::test]
    async fn directory_is_not_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(dir.path(), 5).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[tokio::test]
    async fn bytes_are_materialised_and_cleaned_up() {
        let resolved = materialize_bytes(b"hello", "../../evil/notes.md").await.unwrap();
        let path = resolved.path().to_path_buf();
        assert_eq!(path.file_name().unwrap(), "notes.md");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        drop(resolved);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unreachable_url_is_input_not_found() {
        let err = resolve_input(Path::new("http://127.0.0.1:9/a.pdf"), 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "input_not_found");
    }
}
