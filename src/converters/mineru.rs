//! MinerU converter: runs the `mineru` CLI as a subprocess.
//!
//! `mineru -p <input> -o <out> -b <mode>` writes markdown somewhere under
//! `<out>`; the converter looks for `<out>/<stem>/<stem>.md`, then
//! `<out>/<stem>.md`, then any `*.md` file. The process is killed when the
//! hard timeout expires.

use crate::capability::{Backend, Converter};
use crate::converters::markdown::strip_markdown;
use crate::error::BackendError;
use crate::output::OutputFormat;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct MineruConverter {
    binary: String,
    mode: String,
    timeout: Duration,
    resolved: Option<PathBuf>,
}

impl MineruConverter {
    pub const NAME: &'static str = "mineru";

    pub fn new(binary: impl Into<String>, mode: impl Into<String>, timeout: Duration) -> Self {
        let binary = binary.into();
        let resolved = find_executable(&binary);
        Self {
            binary,
            mode: mode.into(),
            timeout,
            resolved,
        }
    }

    async fn run(&self, input: &Path) -> Result<String, BackendError> {
        let program = self
            .resolved
            .clone()
            .ok_or_else(|| BackendError::Unavailable(self.install_hint()))?;
        let input = tokio::fs::canonicalize(input).await?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let scratch = tempfile::tempdir()?;
        let out_dir = scratch.path().join("mineru_out");
        tokio::fs::create_dir_all(&out_dir).await?;

        info!(
            "MinerU: running {} -p {} -o {} -b {}",
            program.display(),
            input.display(),
            out_dir.display(),
            self.mode
        );
        let child = Command::new(&program)
            .arg("-p")
            .arg(&input)
            .arg("-o")
            .arg(&out_dir)
            .arg("-b")
            .arg(&self.mode)
            .current_dir(&out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => {
                warn!("MinerU: timed out after {}s on {}", self.timeout.as_secs(), input.display());
                return Err(BackendError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = [stderr.trim(), stdout.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("exit status {}", output.status));
            return Err(BackendError::ProcessFailed {
                program: "mineru".into(),
                detail,
            });
        }
        debug!("MinerU: stdout {} bytes", output.stdout.len());

        let search_dir = out_dir.clone();
        let md_path = tokio::task::spawn_blocking(move || locate_markdown(&search_dir, &stem))
            .await
            .map_err(|e| BackendError::Other(format!("MinerU output search panicked: {e}")))??
            .ok_or_else(|| BackendError::MissingOutput {
                expected: "markdown".into(),
            })?;
        let content = tokio::fs::read_to_string(&md_path).await?;
        info!("MinerU: converted {} ({} bytes)", input.display(), content.len());
        Ok(content)
    }

    fn install_hint(&self) -> String {
        format!(
            "'{}' not found on PATH. Install with: pip install 'mineru[core]'",
            self.binary
        )
    }
}

/// Expected output locations in priority order, then any `*.md` below `out_dir`.
pub(crate) fn locate_markdown(out_dir: &Path, stem: &str) -> std::io::Result<Option<PathBuf>> {
    let md = format!("{stem}.md");
    for candidate in [out_dir.join(stem).join(&md), out_dir.join(&md)] {
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }
    find_first_md(out_dir)
}

fn find_first_md(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in &entries {
        if path.is_file() && path.extension().is_some_and(|e| e == "md") {
            return Ok(Some(path.clone()));
        }
    }
    for path in entries.iter().filter(|p| p.is_dir()) {
        if let Some(found) = find_first_md(path)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Resolve a program name against `PATH`, or check an explicit path.
pub(crate) fn find_executable(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{program}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

impl Backend for MineruConverter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn available(&self) -> bool {
        self.resolved.is_some()
    }

    fn error_message(&self) -> Option<String> {
        (!self.available()).then(|| self.install_hint())
    }
}

#[async_trait]
impl Converter for MineruConverter {
    async fn convert_to_markdown(&self, input: &Path) -> Result<String, BackendError> {
        self.run(input).await
    }

    async fn convert_to_json(&self, input: &Path) -> Result<Value, BackendError> {
        let content = self.run(input).await?;
        Ok(json!({
            "content": content,
            "format": "markdown",
            "library": Self::NAME,
        }))
    }

    async fn convert_to_text(&self, input: &Path) -> Result<String, BackendError> {
        Ok(strip_markdown(&self.run(input).await?))
    }

    fn supports_format(&self, _format: OutputFormat) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable_with_hint() {
        let conv = MineruConverter::new("definitely-not-mineru-xyz", "pipeline", Duration::from_secs(5));
        assert!(!conv.available());
        assert!(conv.error_message().unwrap().contains("pip install"));
    }

    #[test]
    fn locate_prefers_nested_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("doc")).unwrap();
        std::fs::write(dir.path().join("doc.md"), "flat").unwrap();
        std::fs::write(dir.path().join("doc").join("doc.md"), "nested").unwrap();
        let found = locate_markdown(dir.path(), "doc").unwrap().unwrap();
        assert_eq!(found, dir.path().join("doc").join("doc.md"));
    }

    #[test]
    fn locate_falls_back_to_any_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("doc").join("auto");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("other.md"), "x").unwrap();
        let found = locate_markdown(dir.path(), "doc").unwrap().unwrap();
        assert_eq!(found, deep.join("other.md"));
    }

    #[test]
    fn locate_reports_nothing_for_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate_markdown(dir.path(), "doc").unwrap().is_none());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-mineru");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn input(dir: &Path) -> PathBuf {
            let p = dir.join("paper.pdf");
            std::fs::write(&p, b"%PDF-1.4").unwrap();
            p
        }

        #[tokio::test]
        async fn reads_markdown_written_by_the_tool() {
            let dir = tempfile::tempdir().unwrap();
            // $4 is the -o directory
            let bin = script(
                dir.path(),
                r#"mkdir -p "$4/paper" && printf '# Title\n\n**Body**' > "$4/paper/paper.md""#,
            );
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(10));
            assert!(conv.available());

            let pdf = input(dir.path());
            assert_eq!(conv.convert_to_markdown(&pdf).await.unwrap(), "# Title\n\n**Body**");
            assert_eq!(conv.convert_to_text(&pdf).await.unwrap(), "Title\n\nBody");
            let json = conv.convert_to_json(&pdf).await.unwrap();
            assert_eq!(json["library"], "mineru");
        }

        #[tokio::test(flavor = "current_thread")]
        async fn fallback_output_is_found_from_async_context() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                r#"mkdir -p "$4/paper/auto/v2" && printf 'deep' > "$4/paper/auto/v2/result.md""#,
            );
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(10));
            let pdf = input(dir.path());
            let (md, ticked) = tokio::join!(conv.convert_to_markdown(&pdf), async {
                tokio::task::yield_now().await;
                true
            });
            assert!(ticked);
            assert_eq!(md.unwrap(), "deep");
        }

        #[tokio::test]
        async fn missing_input_is_an_io_error_before_spawning() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("ran");
            let bin = script(dir.path(), &format!("touch '{}'", marker.display()));
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(10));
            let err = conv.convert_to_markdown(&dir.path().join("gone.pdf")).await.unwrap_err();
            assert!(matches!(err, BackendError::Io(_)));
            assert!(!marker.exists());
        }

        #[tokio::test]
        async fn non_zero_exit_is_process_failure() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo 'model missing' >&2; exit 3");
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(10));
            let err = conv.convert_to_markdown(&input(dir.path())).await.unwrap_err();
            assert!(matches!(err, BackendError::ProcessFailed { ref detail, .. } if detail == "model missing"));
        }

        #[tokio::test]
        async fn clean_exit_without_output_is_missing_output() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exit 0");
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(10));
            let err = conv.convert_to_markdown(&input(dir.path())).await.unwrap_err();
            assert_eq!(err.to_string(), "no markdown output generated");
        }

        #[tokio::test]
        async fn slow_tool_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "sleep 5");
            let conv = MineruConverter::new(bin.to_string_lossy(), "pipeline", Duration::from_secs(1));
            let err = conv.convert_to_markdown(&input(dir.path())).await.unwrap_err();
            assert!(matches!(err, BackendError::Timeout { secs: 1 }));
        }
    }
}
