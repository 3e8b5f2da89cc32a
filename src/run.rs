//! Run orchestration: discover → upscale → recognize → compress → extract → persist.
//!
//! The stages run strictly one after another; within a per-image stage the
//! images run concurrently through [`StageRunner`]. Any failure ends the run
//! and nothing is written to the output path. Whatever was cached before the
//! failure is reused on the next run.
//!
//! Recognition and compression both start from the upscaled image; neither
//! depends on the other's output.

use crate::cache::ContentCache;
use crate::config::{Credentials, PipelineConfig};
use crate::error::{ItemError, MenuError};
use crate::menu::{CompressedImage, MenuDocument, RecognizedText, Stage};
use crate::pipeline::extract::extract_stage;
use crate::pipeline::input::{discover_images, fetch_bytes};
use crate::pipeline::runner::{StageOutcome, StageRunner};
use crate::pipeline::{encode, upscale};
use crate::remote::replicate::ReplicateClient;
use crate::remote::vlm::VisionExtractor;
use crate::remote::Capabilities;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Where a run is. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Discover,
    Upscale,
    Recognize,
    Compress,
    Extract,
    Persist,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Discover => "discover",
            PipelineState::Upscale => "upscale",
            PipelineState::Recognize => "recognize",
            PipelineState::Compress => "compress",
            PipelineState::Extract => "extract",
            PipelineState::Persist => "persist",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(state: PipelineState) {
    info!("▶ {}", state);
}

/// Per-stage accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub stage: Stage,
    /// Items served from the cache.
    pub cached: usize,
    /// Items that needed real work (remote calls for upscale/recognize/extract).
    pub computed: usize,
    pub duration_ms: u64,
}

impl StageStats {
    fn from_outcome<T>(stage: Stage, outcome: &StageOutcome<T>, started: Instant) -> Self {
        Self {
            stage,
            cached: outcome.cached,
            computed: outcome.computed,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunStats {
    pub images: usize,
    pub stages: Vec<StageStats>,
    pub categories: usize,
    pub dishes: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub fn stage(&self, stage: Stage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Items computed across all stages; zero for a fully cached rerun.
    pub fn total_computed(&self) -> usize {
        self.stages.iter().map(|s| s.computed).sum()
    }
}

/// The extracted menu plus run statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub menu: MenuDocument,
    pub stats: RunStats,
}

/// Run every stage and return the menu without writing it anywhere.
pub async fn run(config: &PipelineConfig, caps: &Capabilities) -> Result<RunOutput, MenuError> {
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();

    // ── Discover ─────────────────────────────────────────────────────────
    enter(PipelineState::Discover);
    let items = discover_images(&config.input_dir).await?;
    if let Some(cb) = progress {
        cb.on_run_start(items.len());
    }

    let cache = ContentCache::new(&config.cache_dir);
    let runner = StageRunner::new(&cache, config.concurrency, config.api_timeout_secs)
        .with_progress(progress);
    let download_timeout = config.download_timeout_secs;
    let mut stats = RunStats {
        images: items.len(),
        ..Default::default()
    };

    // ── Upscale ──────────────────────────────────────────────────────────
    enter(PipelineState::Upscale);
    let started = Instant::now();
    let upscaler = caps.upscaler.as_ref();
    let target = config.target_upscale_size;
    let upscaled = runner
        .run(Stage::Upscale, &items, |_, item| async move {
            upscale::upscale_item(upscaler, &item, target, download_timeout).await
        })
        .await?;
    stats
        .stages
        .push(StageStats::from_outcome(Stage::Upscale, &upscaled, started));

    // ── Recognize ────────────────────────────────────────────────────────
    enter(PipelineState::Recognize);
    let started = Instant::now();
    let recognizer = caps.recognizer.as_ref();
    let texts = runner
        .run(Stage::Recognize, &items, |index, _| {
            let url = upscaled.values[index].url.clone();
            async move {
                let text = recognizer.recognize(&url).await?;
                Ok::<_, ItemError>(RecognizedText { text })
            }
        })
        .await?;
    stats
        .stages
        .push(StageStats::from_outcome(Stage::Recognize, &texts, started));

    // ── Compress ─────────────────────────────────────────────────────────
    enter(PipelineState::Compress);
    let started = Instant::now();
    let budget = config.max_compressed_bytes;
    let compressed = runner
        .run(Stage::Compress, &items, |index, _| {
            let url = upscaled.values[index].url.clone();
            async move {
                let bytes = fetch_bytes(&url, download_timeout).await?;
                let out = encode::compress_image(bytes, budget).await?;
                Ok::<_, ItemError>(CompressedImage {
                    base64: out.to_base64(),
                })
            }
        })
        .await?;
    stats
        .stages
        .push(StageStats::from_outcome(Stage::Compress, &compressed, started));

    // ── Extract ──────────────────────────────────────────────────────────
    enter(PipelineState::Extract);
    let started = Instant::now();
    let extracted = extract_stage(
        caps.extractor.as_ref(),
        &cache,
        &items,
        &texts.values,
        &compressed.values,
        config,
    )
    .await?;
    stats.stages.push(StageStats {
        stage: Stage::Extract,
        cached: usize::from(extracted.cached),
        computed: usize::from(!extracted.cached),
        duration_ms: started.elapsed().as_millis() as u64,
    });

    stats.categories = extracted.menu.category_count();
    stats.dishes = extracted.menu.dish_count();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    Ok(RunOutput {
        menu: extracted.menu,
        stats,
    })
}

/// Run every stage and write the menu to `config.output_path`.
///
/// The output file is only touched once the menu is complete; a failed run
/// leaves any previous file in place.
pub async fn run_to_file(config: &PipelineConfig, caps: &Capabilities) -> Result<RunOutput, MenuError> {
    let output = run(config, caps).await?;

    enter(PipelineState::Persist);
    write_menu(&config.output_path, &output.menu).await?;
    info!(
        "Saved {} categories, {} dishes to {}",
        output.stats.categories,
        output.stats.dishes,
        config.output_path.display()
    );

    enter(PipelineState::Done);
    Ok(output)
}

/// Read credentials, build the Replicate and vision-LLM adapters, and run.
///
/// Credentials are checked before any stage starts.
pub async fn run_from_env(config: &PipelineConfig) -> Result<RunOutput, MenuError> {
    let credentials = Credentials::from_env()?;
    let replicate = Arc::new(ReplicateClient::new(credentials.replicate_token, config));
    let extractor = Arc::new(VisionExtractor::from_config(config)?);
    let caps = Capabilities {
        upscaler: replicate.clone(),
        recognizer: replicate,
        extractor,
    };
    run_to_file(config, &caps).await
}

/// Atomically replace `path` with the pretty-printed menu.
///
/// Writes a temporary file next to the destination, then renames it over
/// the destination, so readers never observe a half-written document.
pub async fn write_menu(path: &Path, menu: &MenuDocument) -> Result<(), MenuError> {
    let write_failed = |source| MenuError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(menu)
        .map_err(|e| MenuError::Internal(format!("Failed to serialise menu: {e}")))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    tokio::fs::create_dir_all(&parent).await.map_err(write_failed)?;

    let dest = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".menu-")
            .suffix(".json.tmp")
            .tempfile_in(&parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| MenuError::Internal(format!("Output write task panicked: {e}")))?
    .map_err(write_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{Category, Dish};
    use tempfile::TempDir;

    fn menu() -> MenuDocument {
        MenuDocument {
            menu: vec![Category {
                name: "Zupy".into(),
                dishes: vec![Dish {
                    name: "Żurek".into(),
                    description: "300 ml".into(),
                    price: 19.5,
                    currency: "PLN".into(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn write_menu_creates_parents_and_uses_polish_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output").join("menu.json");
        write_menu(&path, &menu()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kategoria\": \"Zupy\""));
        assert!(text.contains("\"cena\": 19.5"));
        assert!(text.starts_with("{\n  \"menu\""));
    }

    #[tokio::test]
    async fn write_menu_replaces_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("menu.json");
        std::fs::write(&path, "old contents that are much longer than the new ones").unwrap();
        let empty = MenuDocument { menu: vec![] };
        write_menu(&path, &empty).await.unwrap();

        let back: MenuDocument = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, empty);
        // No temp files left behind.
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn stats_totals() {
        let stats = RunStats {
            images: 2,
            stages: vec![
                StageStats {
                    stage: Stage::Upscale,
                    cached: 2,
                    computed: 0,
                    duration_ms: 1,
                },
                StageStats {
                    stage: Stage::Extract,
                    cached: 0,
                    computed: 1,
                    duration_ms: 1,
                },
            ],
            ..Default::default()
        };
        assert_eq!(stats.total_computed(), 1);
        assert_eq!(stats.stage(Stage::Upscale).map(|s| s.cached), Some(2));
        assert!(stats.stage(Stage::Recognize).is_none());
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(PipelineState::Recognize.to_string(), "recognize");
        assert_eq!(PipelineState::Done.to_string(), "done");
    }
}
