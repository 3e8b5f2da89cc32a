//! CLI binary for menu2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use menu2json::{
    run_from_env, ExtractionMode, PipelineConfig, ProgressCallback, Stage, StageProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar, reset at the start of every stage, plus a log
/// line per image. Images finish out of order, so lines carry their index.
struct CliProgressCallback {
    bar: ProgressBar,
    total_images: AtomicUsize,
    cached: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Looking for menu photos…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            total_images: AtomicUsize::new(0),
            cached: AtomicUsize::new(0),
        })
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_images: usize) {
        self.total_images.store(total_images, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_images} menu photos"))
        ));
    }

    fn on_stage_start(&self, stage: Stage, total: usize) {
        let unit = if stage == Stage::Extract { "batch" } else { "images" };
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.cached.store(0, Ordering::SeqCst);
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("{:<9}", stage.to_string()));
        self.bar.reset_elapsed();
    }

    fn on_item_cached(&self, _stage: Stage, _index: usize, _file_name: &str) {
        self.cached.fetch_add(1, Ordering::SeqCst);
        self.bar.inc(1);
    }

    fn on_item_complete(&self, stage: Stage, index: usize, file_name: &str) {
        self.bar.println(format!(
            "  {} {:<9} {:>3}/{:<3}  {}",
            green("✓"),
            stage.to_string(),
            index + 1,
            self.total_images.load(Ordering::SeqCst),
            dim(file_name),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, stage: Stage, index: usize, file_name: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<9} {:>3}  {}  {}",
            red("✗"),
            stage.to_string(),
            index + 1,
            file_name,
            red(&msg),
        ));
    }

    fn on_stage_complete(&self, stage: Stage) {
        let cached = self.cached.load(Ordering::SeqCst);
        if cached > 0 {
            self.bar.println(format!(
                "  {} {:<9} {} from cache",
                dim("↺"),
                stage.to_string(),
                cached
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read ./input-menu, write ./output/menu.json, cache in ./tmp
  menu2json

  # Another folder and output file, and print the menu too
  menu2json --input-dir photos/bistro -o bistro.json --print

  # Reject answers that are not pure JSON
  menu2json --strict-json

  # Start from scratch
  rm -rf tmp && menu2json

ENVIRONMENT VARIABLES:
  REPLICATE_API_TOKEN   Replicate token (upscaling + OCR)         required
  OPENROUTER_API_KEY    OpenRouter key (menu extraction)          required
  RUST_LOG              Override the log filter (e.g. menu2json=debug)

  Both keys may also be placed in a .env file in the working directory.

CACHE:
  Every stage result is stored under the cache dir:
    tmp/upscaled/<photo>.json     upscaled image URL
    tmp/ocr/<photo>.json          recognised text
    tmp/compressed/<photo>.json   base64 image under the size budget
    tmp/menu/all_<photos>.json    extracted menu for this exact photo set
  Cache entries are keyed by file name: delete them after replacing a photo.
"#;

/// Turn photographed restaurant menus into one structured JSON menu.
#[derive(Parser, Debug)]
#[command(
    name = "menu2json",
    version,
    about = "Turn photographed restaurant menus into one structured JSON menu",
    long_about = "Upscale every menu photo, OCR it, compress it, then ask a vision LLM to \
read the whole menu at once into categories and dishes. Every step is cached, so an \
interrupted run resumes where it stopped.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder with .jpg/.jpeg/.png menu photos.
    #[arg(long, env = "MENU2JSON_INPUT_DIR", default_value = "input-menu")]
    input_dir: PathBuf,

    /// Folder for cached stage results.
    #[arg(long, env = "MENU2JSON_CACHE_DIR", default_value = "tmp")]
    cache_dir: PathBuf,

    /// Where to write the menu JSON.
    #[arg(short, long, env = "MENU2JSON_OUTPUT", default_value = "output/menu.json")]
    output: PathBuf,

    /// Images processed at once within a stage.
    #[arg(short, long, env = "MENU2JSON_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Longest edge, in pixels, photos are upscaled towards.
    #[arg(long, env = "MENU2JSON_TARGET_SIZE", default_value_t = 4000)]
    target_size: u32,

    /// Size budget for each compressed image, in bytes.
    #[arg(long, env = "MENU2JSON_MAX_COMPRESSED_BYTES", default_value_t = 5 * 1024 * 1024)]
    max_compressed_bytes: usize,

    /// Per-image deadline for upscale, OCR and compression, in seconds.
    #[arg(long, env = "MENU2JSON_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Deadline for the extraction call, in seconds.
    #[arg(long, env = "MENU2JSON_EXTRACT_TIMEOUT", default_value_t = 900)]
    extract_timeout: u64,

    /// Vision model used for extraction (OpenRouter model ID).
    #[arg(long, env = "MENU2JSON_MODEL", default_value = "google/gemini-2.5-pro")]
    model: String,

    /// Replicate upscaling model (`owner/name` or `owner/name:version`).
    #[arg(long, env = "MENU2JSON_UPSCALE_MODEL")]
    upscale_model: Option<String>,

    /// Replicate OCR model (`owner/name` or `owner/name:version`).
    #[arg(long, env = "MENU2JSON_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Fail instead of scanning for a JSON object inside a chatty answer.
    #[arg(long, env = "MENU2JSON_STRICT_JSON")]
    strict_json: bool,

    /// Also print the menu JSON to stdout.
    #[arg(long, env = "MENU2JSON_PRINT")]
    print: bool,

    /// Disable progress bar.
    #[arg(long, env = "MENU2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MENU2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MENU2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn StageProgressCallback>);

    let config = build_config(&cli, progress_cb)?;

    let result = run_from_env(&config).await;
    if let Some(cb) = &cli_progress {
        cb.bar.finish_and_clear();
    }
    let output = result.context("Menu extraction failed")?;

    if cli.print {
        let json = serde_json::to_string_pretty(&output.menu).context("Failed to serialise menu")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} photos  →  {} categories, {} dishes  {}ms  →  {}",
            green("✔"),
            stats.images,
            stats.categories,
            stats.dishes,
            stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        if stats.total_computed() == 0 {
            eprintln!("   {}", dim("everything served from cache"));
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input_dir(&cli.input_dir)
        .cache_dir(&cli.cache_dir)
        .output_path(&cli.output)
        .concurrency(cli.concurrency)
        .target_upscale_size(cli.target_size)
        .max_compressed_bytes(cli.max_compressed_bytes)
        .api_timeout_secs(cli.api_timeout)
        .extract_timeout_secs(cli.extract_timeout)
        .extraction_model(&cli.model)
        .extraction_mode(if cli.strict_json {
            ExtractionMode::Strict
        } else {
            ExtractionMode::Lenient
        });

    if let Some(ref model) = cli.upscale_model {
        builder = builder.upscale_model(model);
    }
    if let Some(ref model) = cli.ocr_model {
        builder = builder.ocr_model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
