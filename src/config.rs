//! Configuration types for a menu extraction run.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Directory paths are part of the config rather
//! than derived from the working directory, so two runs (or two tests) with
//! different configs never share state.

use crate::error::MenuError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Environment variable holding the Replicate API token (upscale + OCR).
pub const REPLICATE_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";
/// Environment variable holding the OpenRouter API key (extraction).
pub const OPENROUTER_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use menu2json::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input_dir("photos")
///     .cache_dir("/tmp/menu-cache")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Folder holding the menu photos. Default: `input-menu`.
    pub input_dir: PathBuf,

    /// Root of the artifact cache. Default: `tmp`.
    pub cache_dir: PathBuf,

    /// Where the final menu JSON is written. Default: `output/menu.json`.
    pub output_path: PathBuf,

    /// Longest edge, in pixels, the upscaler should reach. Default: 4000.
    ///
    /// Photos whose scale factor `ceil(target / longest edge)` is 1 or less
    /// skip the upscaler entirely.
    pub target_upscale_size: u32,

    /// Soft size ceiling for each compressed image, in bytes. Default: 5 MiB.
    pub max_compressed_bytes: usize,

    /// Maximum number of images processed at once within a stage. Default: 8.
    pub concurrency: usize,

    /// Deadline for one per-image unit of work, in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Deadline for the single extraction call, in seconds. Default: 900.
    ///
    /// Separate from `api_timeout_secs` because one request carries every
    /// photo and every recognised text.
    pub extract_timeout_secs: u64,

    /// Timeout for fetching images over HTTP, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Replicate model used for upscaling.
    pub upscale_model: String,

    /// Replicate model (with pinned version) used for text recognition.
    pub ocr_model: String,

    /// OCR task mode passed to the recognition model.
    pub ocr_task: String,

    /// OCR resolution profile passed to the recognition model.
    pub ocr_resolution: String,

    /// edgequake-llm provider name used for extraction. Default: `openrouter`.
    pub extraction_provider: String,

    /// Vision model used for extraction. Default: `google/gemini-2.5-pro`.
    pub extraction_model: String,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Output token ceiling for extraction. Default: 32768.
    ///
    /// A full multi-page menu easily runs to several thousand tokens of JSON;
    /// a low ceiling truncates the document mid-object.
    pub max_tokens: usize,

    /// How strictly the extraction response is parsed. Default: [`ExtractionMode::Lenient`].
    pub extraction_mode: ExtractionMode,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input-menu"),
            cache_dir: PathBuf::from("tmp"),
            output_path: PathBuf::from("output").join("menu.json"),
            target_upscale_size: 4000,
            max_compressed_bytes: 5 * 1024 * 1024,
            concurrency: 8,
            api_timeout_secs: 300,
            extract_timeout_secs: 900,
            download_timeout_secs: 120,
            upscale_model: "philz1337x/crystal-upscaler".to_string(),
            ocr_model: "lucataco/deepseek-ocr:cb3b474fbfc56b1664c8c7841550bccecbe7b74c30e45ce938ffca1180b4dff5"
                .to_string(),
            ocr_task: "Convert to Markdown".to_string(),
            ocr_resolution: "Gundam (Recommended)".to_string(),
            extraction_provider: "openrouter".to_string(),
            extraction_model: "google/gemini-2.5-pro".to_string(),
            temperature: 0.1,
            max_tokens: 32768,
            extraction_mode: ExtractionMode::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("cache_dir", &self.cache_dir)
            .field("output_path", &self.output_path)
            .field("target_upscale_size", &self.target_upscale_size)
            .field("max_compressed_bytes", &self.max_compressed_bytes)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("extract_timeout_secs", &self.extract_timeout_secs)
            .field("upscale_model", &self.upscale_model)
            .field("ocr_model", &self.ocr_model)
            .field("extraction_provider", &self.extraction_provider)
            .field("extraction_model", &self.extraction_model)
            .field("extraction_mode", &self.extraction_mode)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn target_upscale_size(mut self, px: u32) -> Self {
        self.config.target_upscale_size = px;
        self
    }

    pub fn max_compressed_bytes(mut self, bytes: usize) -> Self {
        self.config.max_compressed_bytes = bytes;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn upscale_model(mut self, model: impl Into<String>) -> Self {
        self.config.upscale_model = model.into();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn extraction_provider(mut self, name: impl Into<String>) -> Self {
        self.config.extraction_provider = name.into();
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.config.extraction_mode = mode;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, MenuError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(MenuError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.target_upscale_size == 0 {
            return Err(MenuError::InvalidConfig(
                "Target upscale size must be > 0".into(),
            ));
        }
        if c.max_compressed_bytes == 0 {
            return Err(MenuError::InvalidConfig(
                "Compressed size budget must be > 0".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.extract_timeout_secs == 0 {
            return Err(MenuError::InvalidConfig("Timeouts must be > 0".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the extraction response is turned into a [`crate::menu::MenuDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// The whole (fence-stripped) response must be the menu JSON.
    Strict,
    /// Try the strict parse first, then fall back to the outermost `{…}` span.
    #[default]
    Lenient,
}

/// API credentials for the two remote providers.
///
/// Only the Replicate token is carried. The OpenRouter key is checked for
/// presence here and read again by the edgequake-llm provider factory.
#[derive(Clone)]
pub struct Credentials {
    pub replicate_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("replicate_token", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Check both credentials in the process environment.
    pub fn from_env() -> Result<Self, MenuError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Check both credentials through `lookup`; empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MenuError> {
        let fetch = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(MenuError::MissingCredential { var })
        };
        let replicate_token = fetch(REPLICATE_TOKEN_VAR)?;
        fetch(OPENROUTER_KEY_VAR)?;
        Ok(Self { replicate_token })
    }
}
