//! # artifact-fetch
//!
//! Download, unpack and cache the single-file runtime artifacts that some
//! pdfstract backends need before their first conversion (today: the PDFium
//! shared library used by the `pdfium` and `vlm` converters).
//!
//! ## How it works
//!
//! [`ensure_artifact`] resolves an [`Artifact`] to a path on disk:
//!
//! 1. If the artifact's override env var (e.g. `PDFIUM_LIB_PATH`) points to an
//!    existing file, that file is used as-is.
//! 2. Otherwise `{cache_root}/{name}-{version}/{file_name}` is checked.
//! 3. If absent, the `.tgz` at [`Artifact::url`] is downloaded, the single
//!    member [`Artifact::member`] is unpacked next to its final location and
//!    renamed into place, so a crash mid-download never leaves a truncated
//!    file that later looks cached.
//!
//! Every function here is blocking. Async callers wrap them in
//! `tokio::task::spawn_blocking`.
//!
//! ```rust,no_run
//! use artifact_fetch::{cache_root, ensure_artifact, pdfium_artifact};
//!
//! let artifact = pdfium_artifact().expect("platform supported");
//! let path = ensure_artifact(&artifact, &cache_root(), Some(&|done, total| {
//!     if let Some(t) = total {
//!         eprint!("\rpdfium: {done}/{t} bytes");
//!     }
//! }))
//! .expect("download failed");
//! println!("{}", path.display());
//! ```
//!
//! ## Environment variables
//!
//! - `PDFSTRACT_CACHE_DIR`: override the default cache root.
//! - `PDFIUM_LIB_PATH`: path to an existing pdfium library; skips download.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdfium-binaries release tag used for downloads.
pub const PDFIUM_VERSION: &str = "7690";

const PDFIUM_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Callback receiving `(bytes_downloaded, total_size_option)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while resolving an artifact.
#[derive(Error, Debug)]
pub enum FetchError {
    /// No prebuilt artifact exists for this OS/architecture.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create or write inside the cache directory.
    #[error("Cache directory error at '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network download failed.
    #[error("Download of '{name}' failed: {reason}")]
    Download { name: String, reason: String },

    /// gzip/tar extraction failed or the member was missing.
    #[error("Archive extraction failed: {0}")]
    Extract(String),
}

// ── Artifact description ─────────────────────────────────────────────────────

/// A single file shipped inside a gzipped tarball at a fixed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Short name used in the cache layout and log lines, e.g. `pdfium`.
    pub name: String,
    /// Version tag; part of the cache path so upgrades never reuse stale files.
    pub version: String,
    /// Archive URL (`.tgz`).
    pub url: String,
    /// Relative path of the wanted file inside the archive.
    pub member: String,
    /// Filename written on disk.
    pub file_name: String,
    /// Env var that may point at an already-installed copy.
    pub env_override: Option<String>,
}

impl Artifact {
    /// Directory holding this artifact under `root`.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("{}-{}", self.name, self.version))
    }

    /// Final on-disk location under `root`.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        self.cache_dir(root).join(&self.file_name)
    }

    /// The override path, when the env var is set and the file exists.
    fn override_path(&self) -> Option<PathBuf> {
        let var = self.env_override.as_deref()?;
        let p = PathBuf::from(std::env::var(var).ok()?);
        if p.exists() {
            Some(p)
        } else {
            warn!("{} '{}' not found; falling back to cache", var, p.display());
            None
        }
    }

    /// Path to a usable copy without touching the network, if one exists.
    pub fn cached_path(&self, root: &Path) -> Option<PathBuf> {
        if let Some(p) = self.override_path() {
            return Some(p);
        }
        let p = self.cache_path(root);
        p.exists().then_some(p)
    }
}

/// Default cache root.
///
/// - **Linux**: `~/.cache/pdfstract/`
/// - **macOS**: `~/Library/Caches/pdfstract/`
/// - **Windows**: `%LOCALAPPDATA%\pdfstract\`
///
/// Override with `PDFSTRACT_CACHE_DIR`.
pub fn cache_root() -> PathBuf {
    if let Ok(dir) = std::env::var("PDFSTRACT_CACHE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdfstract")
}

/// The PDFium shared library for the current platform.
pub fn pdfium_artifact() -> Result<Artifact, FetchError> {
    let (archive, member, file_name) = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
        (os, arch) => {
            return Err(FetchError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };

    Ok(Artifact {
        name: "pdfium".to_string(),
        version: PDFIUM_VERSION.to_string(),
        url: format!("{PDFIUM_BASE_URL}/chromium%2F{PDFIUM_VERSION}/{archive}"),
        member: member.to_string(),
        file_name: file_name.to_string(),
        env_override: Some("PDFIUM_LIB_PATH".to_string()),
    })
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve `artifact` to a local file, downloading it on a cache miss.
///
/// Not deduplicated across callers: the pdfstract lifecycle serialises calls
/// per backend instance, and the final rename makes two racing processes
/// converge on the same file.
pub fn ensure_artifact(
    artifact: &Artifact,
    root: &Path,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<PathBuf, FetchError> {
    if let Some(path) = artifact.cached_path(root) {
        debug!("{}: using cached {}", artifact.name, path.display());
        return Ok(path);
    }

    let dir = artifact.cache_dir(root);
    std::fs::create_dir_all(&dir).map_err(|source| FetchError::CacheDir {
        path: dir.clone(),
        source,
    })?;

    info!("{}: downloading {}", artifact.name, artifact.url);
    let bytes = download_bytes(&artifact.name, &artifact.url, on_progress)?;

    let dest = artifact.cache_path(root);
    extract_member(&bytes, &artifact.member, &dest)?;
    info!("{}: cached at {}", artifact.name, dest.display());

    Ok(dest)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Streams a URL into memory, calling `on_progress` every 64 KiB.
fn download_bytes(
    name: &str,
    url: &str,
    on_progress: Option<ProgressFn<'_>>,
) -> Result<Vec<u8>, FetchError> {
    let fail = |reason: String| FetchError::Download {
        name: name.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("artifact-fetch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| fail(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(fail(format!("HTTP {} for {url}", response.status())));
    }

    let total = response.content_length();
    let mut buf = Vec::with_capacity(total.unwrap_or(8 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(fail(format!("read error: {e}"))),
        }
    }

    Ok(buf)
}

/// Unpacks one member of a gzipped tarball to `dest` via a `.part` sibling.
fn extract_member(archive_bytes: &[u8], member: &str, dest: &Path) -> Result<(), FetchError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(archive_bytes));
    let partial = dest.with_extension("part");

    for entry in archive
        .entries()
        .map_err(|e| FetchError::Extract(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| FetchError::Extract(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| FetchError::Extract(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        if entry_path.trim_start_matches("./") == member {
            entry
                .unpack(&partial)
                .map_err(|e| FetchError::Extract(format!("unpack failed: {e}")))?;
            std::fs::rename(&partial, dest).map_err(|source| FetchError::CacheDir {
                path: dest.to_path_buf(),
                source,
            })?;
            return Ok(());
        }
    }

    Err(FetchError::Extract(format!("'{member}' not found in archive")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let gz = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(gz);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn sample_artifact() -> Artifact {
        Artifact {
            name: "model".into(),
            version: "1".into(),
            url: "http://127.0.0.1:9/never".into(),
            member: "lib/model.bin".into(),
            file_name: "model.bin".into(),
            env_override: None,
        }
    }

    #[test]
    fn pdfium_artifact_for_current_platform() {
        let a = pdfium_artifact().expect("current platform should be supported");
        assert!(a.url.contains(PDFIUM_VERSION));
        assert!(a.url.ends_with(".tgz"));
        assert!(!a.member.is_empty());
    }

    #[test]
    fn cache_layout_is_versioned() {
        let a = sample_artifact();
        let root = Path::new("/tmp/root");
        assert_eq!(a.cache_path(root), PathBuf::from("/tmp/root/model-1/model.bin"));
    }

    #[test]
    fn extract_member_writes_only_the_wanted_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.bin");
        let bytes = tarball(&[("README", b"hi"), ("lib/model.bin", b"weights")]);

        extract_member(&bytes, "lib/model.bin", &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"weights");
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn extract_member_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = tarball(&[("README", b"hi")]);
        let err = extract_member(&bytes, "lib/model.bin", &dir.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn ensure_artifact_uses_cache_without_network() {
        let root = tempfile::tempdir().unwrap();
        let a = sample_artifact();
        std::fs::create_dir_all(a.cache_dir(root.path())).unwrap();
        std::fs::write(a.cache_path(root.path()), b"cached").unwrap();

        // The URL points to a closed port; a cache hit must not touch it.
        let p = ensure_artifact(&a, root.path(), None).unwrap();
        assert_eq!(p, a.cache_path(root.path()));
    }

    #[test]
    fn ensure_artifact_reports_download_failure() {
        let root = tempfile::tempdir().unwrap();
        let err = ensure_artifact(&sample_artifact(), root.path(), None).unwrap_err();
        assert!(matches!(err, FetchError::Download { .. }), "got {err:?}");
    }
}
