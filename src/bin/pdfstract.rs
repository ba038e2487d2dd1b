//! CLI binary for pdfstract.
//!
//! A thin shim over the library crate that maps flags onto `StractConfig`,
//! calls the engine and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfstract::{
    BackendDescriptor, BatchItem, BatchProgressCallback, ChunkParams, ChunkingResult, ConfigSummary, Content,
    OutputFormat, Stract, StractConfig,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Batch progress bar ───────────────────────────────────────────────────────

/// One bar for the whole batch; items may finish in any order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn on_item_start(&self, id: &str, _index: usize, _total: usize) {
        self.bar.set_message(id.to_string());
    }

    fn on_item_complete(&self, id: &str, content_len: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}",
            green("✓"),
            id,
            dim(&format!("{content_len:>8} chars"))
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, id: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {:<40} {}", red("✗"), id, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success);
        if failed == 0 {
            eprintln!("{} {} files converted successfully", green("✔"), bold(&success.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success.to_string()),
                total,
                red(&self.errors.load(Ordering::SeqCst).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Which backends can run here?
  pdfstract libs

  # Convert one file (stdout)
  pdfstract convert paper.pdf --library pdfium

  # Convert to JSON, written to a file
  pdfstract convert paper.pdf -l mineru -f json -o paper.json

  # Convert a directory with 4 workers
  pdfstract batch ./pdfs -l pdfium -w 4 -o ./out

  # Chunk text from stdin
  cat notes.md | pdfstract chunk - --chunker sentence -p chunk_size=200

  # Extract and chunk in one go
  pdfstract convert-chunk paper.pdf -l pdfium -c token -p chunk_size=100

  # Fetch the PDFium library ahead of time
  pdfstract prepare pdfium

ENVIRONMENT VARIABLES:
  PDFSTRACT_CONFIG        Enablement settings file (JSON object name → bool)
  PDFSTRACT_CACHE_DIR     Artifact cache root (PDFium library)
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips the download)
  OPENAI_API_KEY          API key for the vlm backend (or ANTHROPIC_API_KEY, ...)
  EDGEQUAKE_LLM_PROVIDER  Provider for the vlm backend
  EDGEQUAKE_MODEL         Model for the vlm backend
"#;

/// Extract documents and chunk text through interchangeable backends.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstract",
    version,
    about = "Extract documents and chunk text through interchangeable backends",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON.
    #[arg(long, global = true, env = "PDFSTRACT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSTRACT_QUIET")]
    quiet: bool,

    /// Disable the batch progress bar.
    #[arg(long, global = true, env = "PDFSTRACT_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Enablement settings file.
    #[arg(long, global = true, env = "PDFSTRACT_CONFIG")]
    settings: Option<PathBuf>,

    /// Artifact cache root.
    #[arg(long, global = true, env = "PDFSTRACT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Hard timeout for external-process backends, in seconds.
    #[arg(long, global = true, env = "PDFSTRACT_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// URL download timeout in seconds.
    #[arg(long, global = true, env = "PDFSTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// MinerU executable.
    #[arg(long, global = true, env = "PDFSTRACT_MINERU_BIN", default_value = "mineru")]
    mineru_bin: String,

    /// MinerU `-b` mode.
    #[arg(long, global = true, env = "PDFSTRACT_MINERU_BACKEND", default_value = "pipeline")]
    mineru_backend: String,

    /// LLM provider for the vlm backend (openai, anthropic, gemini, ollama, ...).
    #[arg(long, global = true, env = "PDFSTRACT_VLM_PROVIDER")]
    provider: Option<String>,

    /// Model for the vlm backend.
    #[arg(long, global = true, env = "PDFSTRACT_VLM_MODEL")]
    model: Option<String>,

    /// Rendering DPI for the vlm backend (72–400).
    #[arg(long, global = true, env = "PDFSTRACT_VLM_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent page requests for the vlm backend.
    #[arg(long, global = true, env = "PDFSTRACT_VLM_CONCURRENCY", default_value_t = 4)]
    page_concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every converter with its status.
    Libs,
    /// Show one converter's descriptor.
    Info { name: String },
    /// Enable a converter in the settings file.
    Enable { name: String },
    /// Disable a converter in the settings file.
    Disable { name: String },
    /// Run a converter's one-time setup (e.g. download PDFium).
    Prepare { name: String },
    /// Convert one file or URL.
    Convert {
        /// Local file path or HTTP/HTTPS URL.
        input: PathBuf,
        #[arg(short, long, env = "PDFSTRACT_LIBRARY", default_value = "pdfium")]
        library: String,
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,
        /// Write output to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert every PDF in a directory.
    Batch {
        dir: PathBuf,
        #[arg(short, long, env = "PDFSTRACT_LIBRARY", default_value = "pdfium")]
        library: String,
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,
        /// Concurrent workers.
        #[arg(short, long, env = "PDFSTRACT_WORKERS", default_value_t = 2)]
        workers: usize,
        /// Write one output file per input into this directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Chunk a text file (`-` reads stdin).
    Chunk {
        input: String,
        #[arg(short, long, default_value = "auto")]
        chunker: String,
        /// Chunker parameter, `key=value`. Repeatable.
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
    /// List chunkers and their parameters.
    Chunkers,
    /// Convert a file, then chunk the result.
    ConvertChunk {
        input: PathBuf,
        #[arg(short, long, env = "PDFSTRACT_LIBRARY", default_value = "pdfium")]
        library: String,
        #[arg(short, long, default_value = "auto")]
        chunker: String,
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar gives all the feedback a batch needs; keep library
    // logs to errors while it is shown.
    let show_progress =
        matches!(cli.command, Command::Batch { .. }) && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: Option<Arc<dyn BatchProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    debug!(
        "config: {}",
        serde_json::to_string(&ConfigSummary::from(&config)).unwrap_or_default()
    );
    let stract = Stract::new(config);

    match &cli.command {
        Command::Libs => print_backends(&stract.list_backends(), cli.json)?,
        Command::Info { name } => {
            let info = stract
                .get_backend_info(name)
                .with_context(|| format!("Unknown backend '{name}'"))?;
            print_backends(std::slice::from_ref(&info), cli.json)?;
        }
        Command::Enable { name } => {
            stract.set_backend_enabled(name, true).context("Failed to enable backend")?;
            if !cli.quiet {
                eprintln!("{} {} enabled", green("✔"), bold(name));
            }
        }
        Command::Disable { name } => {
            stract.set_backend_enabled(name, false).context("Failed to disable backend")?;
            if !cli.quiet {
                eprintln!("{} {} disabled", green("✔"), bold(name));
            }
        }
        Command::Prepare { name } => {
            let status = stract.prepare_backend_async(name).await.context("Prepare failed")?;
            let info = stract.get_backend_info(name);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info).context("Failed to serialise status")?);
            } else {
                println!("{name}: {status}");
                if let Some(err) = info.and_then(|i| i.error) {
                    eprintln!("  {}", red(&err));
                }
            }
        }
        Command::Convert {
            input,
            library,
            format,
            output,
        } => {
            let content = stract
                .convert_async(input, library, *format)
                .await
                .context("Conversion failed")?;
            match output {
                Some(path) => {
                    write_atomic(path, &render(&content)?).await?;
                    if !cli.quiet {
                        eprintln!("{}  {} chars  →  {}", green("✔"), content.len(), bold(&path.display().to_string()));
                    }
                }
                None => write_stdout(&render(&content)?)?,
            }
        }
        Command::Batch {
            dir,
            library,
            format,
            workers,
            output,
        } => {
            let result = stract
                .batch_convert_async(dir, library, *format, Some(*workers))
                .await
                .context("Batch failed")?;
            if let Some(out_dir) = output {
                tokio::fs::create_dir_all(out_dir)
                    .await
                    .with_context(|| format!("Failed to create {}", out_dir.display()))?;
                for (id, item) in &result.results {
                    if let BatchItem::Converted(content) = item {
                        let target = out_dir.join(output_name(id, *format));
                        write_atomic(&target, &render(content)?).await?;
                    }
                }
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result).context("Failed to serialise result")?);
            } else if !show_progress && !cli.quiet {
                for (id, item) in &result.results {
                    match item {
                        BatchItem::Converted(c) => eprintln!("  {} {id}  {}", green("✓"), dim(&format!("{} chars", c.len()))),
                        BatchItem::Failed { error } => eprintln!("  {} {id}  {}", red("✗"), red(error)),
                    }
                }
                eprintln!("{} succeeded, {} failed", result.success, result.failed);
            }
        }
        Command::Chunk {
            input,
            chunker,
            params,
        } => {
            let text = read_text(input)?;
            let result = stract
                .chunk_async(&text, chunker, &parse_params(params)?)
                .await
                .context("Chunking failed")?;
            print_chunks(&result, cli.json)?;
        }
        Command::Chunkers => {
            let schemas: Vec<_> = stract
                .list_chunkers()
                .iter()
                .filter_map(|n| stract.get_chunker_info(n))
                .collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&schemas).context("Failed to serialise chunkers")?);
            } else {
                for s in schemas {
                    println!("{}  {}", bold(&s.name), dim(&s.description));
                    for p in s.parameters {
                        println!("    {:<26} {:<8} default {:<6} {}", p.name, p.kind, p.default, dim(&p.description));
                    }
                }
            }
        }
        Command::ConvertChunk {
            input,
            library,
            chunker,
            format,
            params,
        } => {
            let out = stract
                .convert_chunk_async(input, library, chunker, *format, &parse_params(params)?)
                .await
                .context("Convert-chunk failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&out).context("Failed to serialise output")?);
            } else {
                print_chunks(&out.chunking_result, false)?;
            }
        }
    }

    Ok(())
}

/// Map CLI args to `StractConfig`.
fn build_config(cli: &Cli, progress: Option<Arc<dyn BatchProgressCallback>>) -> Result<StractConfig> {
    let e = &cli.engine;
    let mut builder = StractConfig::builder()
        .process_timeout_secs(e.timeout)
        .download_timeout_secs(e.download_timeout)
        .mineru_binary(e.mineru_bin.clone())
        .mineru_backend(e.mineru_backend.clone())
        .vlm_dpi(e.dpi)
        .vlm_page_concurrency(e.page_concurrency);
    if let Command::Batch { workers, .. } = &cli.command {
        builder = builder.workers(*workers);
    }
    if let Some(p) = &e.settings {
        builder = builder.settings_path(p.clone());
    }
    if let Some(d) = &e.cache_dir {
        builder = builder.cache_dir(d.clone());
    }
    if let Some(p) = &e.provider {
        builder = builder.vlm_provider_name(p.clone());
    }
    if let Some(m) = &e.model {
        builder = builder.vlm_model(m.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }
    builder.build().context("Invalid configuration")
}

fn parse_params(raw: &[String]) -> Result<ChunkParams> {
    let mut params = ChunkParams::new();
    for assignment in raw {
        params
            .insert_assignment(assignment)
            .with_context(|| format!("Invalid --param '{assignment}'"))?;
    }
    Ok(params)
}

fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

fn render(content: &Content) -> Result<String> {
    Ok(match content {
        Content::Text(s) => s.clone(),
        Content::Json(v) => serde_json::to_string_pretty(v).context("Failed to serialise JSON output")?,
    })
}

fn output_name(id: &str, format: OutputFormat) -> String {
    let stem = Path::new(id)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.replace(['/', '\\'], "_"));
    let ext = match format {
        OutputFormat::Markdown => "md",
        OutputFormat::Json => "json",
        OutputFormat::Text => "txt",
    };
    format!("{stem}.{ext}")
}

/// Write to a temp sibling, then rename, so readers never see a partial file.
async fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move output into {}", path.display()))
}

fn write_stdout(body: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(body.as_bytes()).context("Failed to write to stdout")?;
    if !body.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_backends(backends: &[BackendDescriptor], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(backends).context("Failed to serialise backends")?);
        return Ok(());
    }
    for b in backends {
        let mark = if b.available { green("✓") } else { red("✗") };
        let state = if b.enabled { "enabled" } else { "disabled" };
        println!(
            "{mark} {:<10} {:<9} {:<13} {}",
            b.name,
            state,
            b.download_status.to_string(),
            dim(b.error.as_deref().unwrap_or(""))
        );
    }
    Ok(())
}

fn print_chunks(result: &ChunkingResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result).context("Failed to serialise chunks")?);
        return Ok(());
    }
    for (i, c) in result.chunks.iter().enumerate() {
        println!(
            "{} {}",
            cyan(&format!("── chunk {} [{}..{}] {} units", i + 1, c.start_offset, c.end_offset, c.unit_count)),
            dim("──")
        );
        println!("{}", c.text.trim_end());
    }
    eprintln!(
        "{} {} chunks, {} units ({})",
        green("✔"),
        result.total_chunks,
        result.total_tokens,
        result.chunker_name
    );
    Ok(())
}
