//! CLI binary for scan2table.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` / `GraphConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scan2table::{
    extract_graph, preview, BatchItem, ExtractionConfig, ExtractionProgressCallback, Extractor,
    GraphConfig, OutputSource, PartitionStrategy, ProgressCallback, Stage,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a live bar plus one log line per image.
/// Images may finish out of order in batch mode.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner-only until `on_batch_start` tells us the total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading image…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, input: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(input)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting extraction of {total_images} images…"))
        ));
    }

    fn on_image_start(&self, input: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(input.to_string(), Instant::now());
    }

    fn on_stage(&self, input: &str, stage: Stage) {
        if stage == Stage::FallingBack {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.bar.set_message(format!("{}  {}", short_name(input), dim(&stage.to_string())));
    }

    fn on_image_complete(&self, input: &str, source: OutputSource, text_len: usize) {
        let secs = self.elapsed_secs(input);
        let tag = match source {
            OutputSource::Local => green("local "),
            OutputSource::Remote => yellow("remote"),
        };
        self.bar.println(format!(
            "  {} {:<32}  {}  {:<8}  {}",
            green("✓"),
            short_name(input),
            tag,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, input: &str, error: &str) {
        let secs = self.elapsed_secs(input);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            short_name(input),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let failed = total_images.saturating_sub(success_count);
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images extracted  {}",
                green("✔"),
                bold(&success_count.to_string()),
                dim(&format!("({fallbacks} via remote OCR)")),
            );
        } else {
            eprintln!(
                "{} {}/{} images extracted  ({} failed, {} via remote OCR)",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
                fallbacks,
            );
        }
    }
}

fn short_name(input: &str) -> &str {
    input.rsplit(['/', '\\']).next().unwrap_or(input)
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one scan to stdout
  scan2table extract invoice.jpg

  # Several scans, four at a time, one .md per scan
  scan2table extract --concurrency 4 scans/*.png -o out/

  # Structured result (text, source, verdict, stats)
  scan2table extract --json invoice.jpg > invoice.json

  # Inspect what the fallback would send (no services needed)
  scan2table preview invoice.jpg -o invoice.normalized.png

  # Digitise a chart
  scan2table graph sales.png --json

ENVIRONMENT VARIABLES:
  UNSTRUCTURED_API_URL   Local partitioner base URL (default http://localhost:8000)
  UNSTRUCTURED_API_KEY   Partitioner API key, if the server requires one
  MISTRAL_API_KEY        Remote OCR key; only needed when the fallback fires
  MISTRAL_BASE_URL       Remote OCR base URL (default https://api.mistral.ai)
  GEMINI_API_KEY         Vision model key for `graph`
  RUST_LOG               Overrides the log filter

A .env file in the working directory is loaded at startup.
"#;

/// Extract tables and text from scanned images, falling back to hosted OCR
/// only when the local result looks broken.
#[derive(Parser, Debug)]
#[command(
    name = "scan2table",
    version,
    about = "Extract tables from scanned images with a local-first, quality-gated pipeline",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SCAN2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SCAN2TABLE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the extraction pipeline on one or more images.
    Extract(ExtractArgs),
    /// Normalize an image and save it as PNG, without extracting.
    Preview(PreviewArgs),
    /// Read data points off a chart with a vision model.
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local image paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (one input) or directory (several inputs).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output structured JSON instead of plain text.
    #[arg(long, env = "SCAN2TABLE_JSON")]
    json: bool,

    /// Images processed at the same time.
    #[arg(short, long, env = "SCAN2TABLE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Partition strategy hint for the local extractor.
    #[arg(long, env = "SCAN2TABLE_STRATEGY", value_enum, default_value = "hi_res")]
    strategy: StrategyArg,

    /// Minimum normalized width in pixels.
    #[arg(long, env = "SCAN2TABLE_MIN_WIDTH", default_value_t = scan2table::config::DEFAULT_MIN_WIDTH)]
    min_width: u32,

    #[command(flatten)]
    services: ServiceArgs,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2TABLE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Local partitioner base URL.
    #[arg(long, env = "UNSTRUCTURED_API_URL")]
    unstructured_url: Option<String>,

    /// Local partitioner API key.
    #[arg(long, env = "UNSTRUCTURED_API_KEY", hide_env_values = true)]
    unstructured_api_key: Option<String>,

    /// Remote OCR base URL.
    #[arg(long, env = "MISTRAL_BASE_URL")]
    mistral_base_url: Option<String>,

    /// Remote OCR API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    mistral_api_key: Option<String>,

    /// Remote OCR model.
    #[arg(long, env = "MISTRAL_OCR_MODEL", default_value = scan2table::config::DEFAULT_MISTRAL_MODEL)]
    mistral_model: String,

    /// Per-call timeout for both services, in seconds.
    #[arg(long, env = "SCAN2TABLE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout for URL inputs, in seconds.
    #[arg(long, env = "SCAN2TABLE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Local image path or HTTP/HTTPS URL.
    input: String,

    /// Where to write the normalized PNG.
    #[arg(short, long)]
    output: PathBuf,

    /// Minimum normalized width in pixels.
    #[arg(long, env = "SCAN2TABLE_MIN_WIDTH", default_value_t = scan2table::config::DEFAULT_MIN_WIDTH)]
    min_width: u32,
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// Local chart image.
    image: PathBuf,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key. Overrides provider auto-detection.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision model ID. Default: gemini-2.5-flash.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// Output the parsed GraphMetadata as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
#[value(rename_all = "snake_case")]
enum StrategyArg {
    Auto,
    Fast,
    HiRes,
    OcrOnly,
}

impl From<StrategyArg> for PartitionStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Auto => PartitionStrategy::Auto,
            StrategyArg::Fast => PartitionStrategy::Fast,
            StrategyArg::HiRes => PartitionStrategy::HiRes,
            StrategyArg::OcrOnly => PartitionStrategy::OcrOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = match &cli.command {
        Command::Extract(args) => {
            wants_progress_bar(args.inputs.len(), cli.quiet, args.no_progress, args.json)
        }
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract(ref args) => run_extract(args, cli.quiet, show_progress).await,
        Command::Preview(ref args) => run_preview(args, cli.quiet).await,
        Command::Graph(ref args) => run_graph(args).await,
    }
}

async fn run_extract(args: &ExtractArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;
    let extractor = Extractor::new(config).context("Failed to set up extractor")?;

    // ── Single image ─────────────────────────────────────────────────────
    if let [input] = args.inputs.as_slice() {
        let output = match args.output {
            Some(ref path) if !args.json => extractor
                .extract_to_file(input, path)
                .await
                .context("Extraction failed")?,
            _ => extractor.extract(input).await.context("Extraction failed")?,
        };

        if args.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            emit(args.output.as_deref(), &json).await?;
        } else if args.output.is_none() {
            write_stdout(&output.text)?;
        }

        if !quiet && !args.json {
            eprintln!(
                "{}  {}  {}  {}ms",
                if output.source == OutputSource::Local {
                    green("✔")
                } else {
                    yellow("✔")
                },
                bold(&output.source.to_string()),
                dim(&output.verdict.to_string()),
                output.stats.total_duration_ms,
            );
        }
        return Ok(());
    }

    // ── Batch ────────────────────────────────────────────────────────────
    let items = extractor.extract_batch(args.inputs.iter().cloned()).await;

    if args.json {
        let json = serde_json::to_string_pretty(&batch_json(&items))
            .context("Failed to serialise output")?;
        emit(args.output.as_deref(), &json).await?;
    } else if let Some(ref dir) = args.output {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for item in &items {
            if let Ok(ref out) = item.result {
                let path = dir.join(output_file_name(item.index, &item.input));
                tokio::fs::write(&path, &out.text)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    } else {
        let mut text = String::new();
        for item in &items {
            if let Ok(ref out) = item.result {
                text.push_str(&format!("<!-- {} -->\n\n{}\n\n", item.input, out.text.trim_end()));
            }
        }
        write_stdout(&text)?;
    }

    if !quiet && !show_progress {
        let ok = items.iter().filter(|i| i.is_ok()).count();
        eprintln!("Extracted {}/{} images", ok, items.len());
        for item in items.iter().filter(|i| !i.is_ok()) {
            if let Err(ref e) = item.result {
                eprintln!("  {} {}: {}", red("✗"), item.input, e);
            }
        }
    }

    if items.iter().all(|i| !i.is_ok()) {
        anyhow::bail!("All {} images failed", items.len());
    }
    Ok(())
}

async fn run_preview(args: &PreviewArgs, quiet: bool) -> Result<()> {
    let config = ExtractionConfig::builder()
        .min_width(args.min_width)
        .build()
        .context("Invalid configuration")?;
    let normalized = preview(&args.input, &args.output, &config)
        .await
        .context("Preview failed")?;

    if !quiet {
        let (w, h) = normalized.original_dimensions();
        eprintln!(
            "{}  {}×{} → {}×{}  →  {}",
            green("✔"),
            w,
            h,
            normalized.width(),
            normalized.height(),
            bold(&args.output.display().to_string()),
        );
    }
    Ok(())
}

async fn run_graph(args: &GraphArgs) -> Result<()> {
    let config = GraphConfig {
        // GEMINI_API_KEY is only meaningful for the gemini provider.
        api_key: args
            .api_key
            .clone()
            .filter(|_| matches!(args.provider.as_deref(), None | Some("gemini"))),
        provider_name: args.provider.clone(),
        model: args.model.clone(),
        temperature: args.temperature,
        ..Default::default()
    };
    let graph = extract_graph(&args.image, &config)
        .await
        .context("Graph extraction failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&graph).context("Failed to serialise output")?
        );
    } else {
        println!("Graph Type: {}", graph.graph_type);
        println!("X-Axis Scale: {}", graph.x_axis_scale);
        println!("Legends found: {}", graph.legend_items.join(", "));
        println!("\n--- Extracted Data Table ---");
        print!("{}", graph.render_table());
    }
    Ok(())
}

/// The bar tracks batch completions, so a single image gets none.
fn wants_progress_bar(inputs: usize, quiet: bool, no_progress: bool, json: bool) -> bool {
    inputs > 1 && !quiet && !no_progress && !json
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(args: &ExtractArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let s = &args.services;
    let mut builder = ExtractionConfig::builder()
        .min_width(args.min_width)
        .strategy(args.strategy.clone().into())
        .concurrency(args.concurrency)
        .mistral_model(&s.mistral_model)
        .api_timeout_secs(s.api_timeout)
        .download_timeout_secs(s.download_timeout);

    if let Some(ref url) = s.unstructured_url {
        builder = builder.unstructured_url(url);
    }
    if let Some(ref key) = s.unstructured_api_key {
        builder = builder.unstructured_api_key(key);
    }
    if let Some(ref url) = s.mistral_base_url {
        builder = builder.mistral_base_url(url);
    }
    if let Some(ref key) = s.mistral_api_key {
        builder = builder.mistral_api_key(key);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn batch_json(items: &[BatchItem]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = items
        .iter()
        .map(|item| match &item.result {
            Ok(out) => serde_json::json!({ "input": item.input, "output": out }),
            Err(e) => serde_json::json!({
                "input": item.input,
                "error": e.to_string(),
                "error_kind": e.kind(),
            }),
        })
        .collect();
    serde_json::Value::Array(entries)
}

/// `003-invoice.md` style name; the index keeps duplicate stems apart.
fn output_file_name(index: usize, input: &str) -> String {
    let stem = Path::new(short_name(input))
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{:03}-{}.md", index + 1, stem)
}

async fn emit(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => write_stdout(content),
    }
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_input_gets_no_progress_bar() {
        assert!(!wants_progress_bar(1, false, false, false));
        assert!(wants_progress_bar(2, false, false, false));
    }

    #[test]
    fn flags_disable_the_progress_bar() {
        assert!(!wants_progress_bar(3, true, false, false));
        assert!(!wants_progress_bar(3, false, true, false));
        assert!(!wants_progress_bar(3, false, false, true));
    }

    #[test]
    fn batch_file_names_are_numbered() {
        assert_eq!(output_file_name(2, "scans/invoice.png"), "003-invoice.md");
    }
}
