//! # menu2json
//!
//! Turn a folder of restaurant menu photos into one structured JSON menu.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input-menu/*.jpg
//!  │
//!  ├─ 1. Discover   list .jpg/.jpeg/.png photos, sorted by name
//!  ├─ 2. Upscale    bring the longest edge to ~4000 px (Replicate)
//!  ├─ 3. Recognize  OCR each upscaled photo to text (Replicate)
//!  ├─ 4. Compress   JPEG-recompress each upscaled photo under 5 MiB
//!  ├─ 5. Extract    one vision-LLM call over all photos + all text
//!  └─ 6. Persist    output/menu.json
//! ```
//!
//! Every stage result is cached under `tmp/<stage>/`, so an interrupted run
//! resumes where it stopped and a repeated run makes no remote calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu2json::{run_from_env, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs REPLICATE_API_TOKEN and OPENROUTER_API_KEY.
//!     let config = PipelineConfig::default();
//!     let output = run_from_env(&config).await?;
//!     eprintln!(
//!         "{} categories, {} dishes",
//!         output.stats.categories, output.stats.dishes
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu2json` binary (clap + anyhow + tracing-subscriber + indicatif + dotenv) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! menu2json = { version = "0.1", default-features = false }
//! ```
//!
//! ## Custom Backends
//!
//! The remote work sits behind three traits in [`remote`]: [`Upscaler`],
//! [`Recognizer`] and [`MenuExtractor`]. Pass your own implementations to
//! [`run`] or [`run_to_file`] through a [`Capabilities`] bundle.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod menu;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod remote;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::ContentCache;
pub use config::{Credentials, ExtractionMode, PipelineConfig, PipelineConfigBuilder};
pub use error::{ItemError, MenuError};
pub use menu::{Category, Dish, MenuDocument, Stage};
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use remote::{Capabilities, ExtractionRequest, MenuExtractor, Recognizer, Upscaler};
pub use run::{run, run_from_env, run_to_file, RunOutput, RunStats, StageStats};
