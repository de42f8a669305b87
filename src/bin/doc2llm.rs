//! CLI binary for doc2llm.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `IngestConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use doc2llm::{
    detect, ingest, ingest_to_file, Input, IngestConfig, IngestProgressCallback, IngestStats, PageSelection,
    ProgressCallback, Stage, TableThresholds,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that names the current stage, turning into a counter while
/// image descriptions come back (possibly out of order).
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_ingest_start(&self, source: &str) {
        self.bar.println(format!("{} {}", cyan("◆"), bold(&format!("Ingesting {source}…"))));
    }

    fn on_stage(&self, stage: Stage) {
        self.bar.set_prefix("Working");
        self.bar.set_message(stage.to_string());
    }

    fn on_images_found(&self, total: usize) {
        if total == 0 {
            return;
        }
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Describing");
    }

    fn on_image_described(&self, page: usize, index: usize) {
        self.bar.println(format!("  {} image {index} on page {page}", green("✓")));
        self.bar.inc(1);
    }

    fn on_ingest_complete(&self, stats: &IngestStats) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages, {} images, {} tables",
            if stats.degraded_units == 0 { green("✔") } else { cyan("⚠") },
            bold(&stats.page_count.to_string()),
            stats.images,
            stats.tables
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Any supported input, content to stdout
  doc2llm report.pdf
  doc2llm slides.pptx
  doc2llm notes.md -o notes.txt

  # A web page (needs a headless Chromium)
  doc2llm https://example.com/article

  # Only show how an input would be routed
  doc2llm --detect-only scan.dat

  # Tables on pages 3-15 only, stricter acceptance
  doc2llm --pages 3-15 --min-accuracy 60 paper.pdf

  # No vision model calls
  doc2llm --no-describe deck.pptx

  # Full structured output
  doc2llm --json report.pdf > report.json

SUPPORTED INPUTS:
  pdf · jpg jpeg png bmp tiff gif · html htm · md markdown · pptx · http(s) URLs

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (image descriptions)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  DOC2LLM_CHROMIUM        Headless browser used for URLs (default: chromium)

OUTPUT FILES:
  <output-dir>/<name>.pdf                  canonical PDF of a converted input
  <extract-dir>/image_p<page>_<n>.png      extracted images
  <extract-dir>/extraction_report.txt      human-readable summary
  <extract-dir>/metadata.json              document metadata
"#;

/// Turn PDFs, images, web pages, Markdown and slides into LLM-ready text.
#[derive(Parser, Debug)]
#[command(
    name = "doc2llm",
    version,
    about = "Turn PDFs, images, web pages, Markdown and slides into LLM-ready text",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// Write the content to this file instead of stdout.
    #[arg(short, long, env = "DOC2LLM_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for converted PDFs.
    #[arg(long, env = "DOC2LLM_OUTPUT_DIR", default_value = "assets")]
    output_dir: PathBuf,

    /// Directory for extracted images, the report and metadata.json.
    #[arg(long, env = "DOC2LLM_EXTRACT_DIR", default_value = "extracted_content")]
    extract_dir: PathBuf,

    /// Skip vision-model image descriptions.
    #[arg(long, env = "DOC2LLM_NO_DESCRIBE")]
    no_describe: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (e.g. gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Topic hint for image descriptions.
    #[arg(long, env = "DOC2LLM_TOPIC", default_value = "general")]
    topic: String,

    /// Text file with a custom description prompt (`{topic}` is substituted).
    #[arg(long, env = "DOC2LLM_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Pages scanned for tables: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DOC2LLM_PAGES", default_value = "all")]
    pages: String,

    /// Keep tables whose non-empty cell ratio exceeds this (0.0–1.0).
    #[arg(long, default_value_t = 0.1)]
    min_content_ratio: f64,

    /// Keep tables whose detector accuracy exceeds this (0–100).
    #[arg(long, default_value_t = 40.0)]
    min_accuracy: f64,

    /// Drop images narrower or shorter than this many pixels.
    #[arg(long, env = "DOC2LLM_MIN_IMAGE_SIZE", default_value_t = 50)]
    min_image_size: u32,

    /// Resolution used when an image becomes a PDF page.
    #[arg(long, env = "DOC2LLM_DPI", default_value_t = 100.0)]
    dpi: f32,

    /// URL reachability probe timeout in seconds.
    #[arg(long, default_value_t = 10)]
    probe_timeout: u64,

    /// URL render timeout in seconds.
    #[arg(long, default_value_t = 30)]
    render_timeout: u64,

    /// Per-image description timeout in seconds.
    #[arg(long, default_value_t = 60)]
    describe_timeout: u64,

    /// Concurrent description calls.
    #[arg(short, long, env = "DOC2LLM_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Headless browser binary for URL inputs.
    #[arg(long, env = "DOC2LLM_CHROMIUM")]
    chromium: Option<PathBuf>,

    /// Print how the input is routed, then exit.
    #[arg(long)]
    detect_only: bool,

    /// Output structured JSON (IngestOutput) instead of the content string.
    #[arg(long, env = "DOC2LLM_JSON")]
    json: bool,

    /// Do not write extraction_report.txt and metadata.json.
    #[arg(long)]
    no_artifacts: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2LLM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2LLM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2LLM_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.detect_only;
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

    // ── Detect-only mode ─────────────────────────────────────────────────
    if cli.detect_only {
        let routed = detect(&cli.input).context("Failed to detect input format")?;
        if cli.json {
            let json = serde_json::json!({
                "input": cli.input,
                "kind": routed.kind(),
                "url": matches!(routed, Input::Url(_)),
                "canonical": routed.is_canonical(),
            });
            println!("{}", serde_json::to_string_pretty(&json).context("Failed to serialise route")?);
        } else {
            println!("Input:      {}", cli.input);
            println!("Kind:       {}", routed.kind());
            println!(
                "Conversion: {}",
                if routed.is_canonical() { "none (already PDF)" } else { "to PDF" }
            );
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ingestion ────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = ingest_to_file(&cli.input, output_path, &config)
            .await
            .context("Ingestion failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                if stats.degraded_units == 0 { green("✔") } else { cyan("⚠") },
                stats.page_count,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let output = ingest(&cli.input, &config).await.context("Ingestion failed")?;

        if cli.json {
            let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.content.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet && !cli.json {
            for d in &output.degraded {
                eprintln!("  {} {d}", cyan("⚠"));
            }
            if !show_progress {
                eprintln!(
                    "Ingested {} pages ({} images, {} tables) in {}ms",
                    output.stats.page_count, output.stats.images, output.stats.tables, output.stats.total_duration_ms
                );
            }
            if let Some(ref report) = output.report_path {
                eprintln!("   report: {}", dim(&report.display().to_string()));
            }
            if let Some(ref tables) = output.tables_path {
                eprintln!("   tables: {}", dim(&tables.display().to_string()));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let prompt = if let Some(ref path) = cli.prompt_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read description prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = IngestConfig::builder()
        .output_dir(&cli.output_dir)
        .extract_dir(&cli.extract_dir)
        .describe_images(!cli.no_describe)
        .describe_topic(&cli.topic)
        .describe_timeout_secs(cli.describe_timeout)
        .describe_concurrency(cli.concurrency)
        .table_pages(parse_pages(&cli.pages)?)
        .table_thresholds(TableThresholds {
            min_content_ratio: cli.min_content_ratio,
            min_accuracy: cli.min_accuracy,
        })
        .min_image_dimension(cli.min_image_size)
        .image_dpi(cli.dpi)
        .probe_timeout_secs(cli.probe_timeout)
        .render_timeout_secs(cli.render_timeout)
        .write_artifacts(!cli.no_artifacts);

    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(prompt) = prompt {
        builder = builder.describe_prompt(prompt);
    }
    if let Some(ref chromium) = cli.chromium {
        builder = builder.chromium_path(chromium);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
