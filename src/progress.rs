//! Progress-callback trait for stage and per-image events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run as it moves through its stages. The library itself only logs through
//! `tracing`; rendering progress is left to the host (the `menu2json` binary
//! draws an indicatif bar).
//!
//! # Example
//!
//! ```rust
//! use menu2json::{PipelineConfig, Stage, StageProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     remote_calls: AtomicUsize,
//! }
//!
//! impl StageProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, _stage: Stage, _index: usize, _file_name: &str) {
//!         self.remote_calls.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { remote_calls: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn StageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::menu::Stage;
use std::sync::Arc;

/// Called by the pipeline as it processes each stage.
///
/// Implementations must be `Send + Sync`: items within a stage run
/// concurrently and may report in any order. All methods default to no-ops.
pub trait StageProgressCallback: Send + Sync {
    /// Called once after discovery, before any stage starts.
    fn on_run_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when a stage begins. `total` is 1 for the extraction stage.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// An item was served from the cache; no remote work was done.
    fn on_item_cached(&self, stage: Stage, index: usize, file_name: &str) {
        let _ = (stage, index, file_name);
    }

    /// An item was computed and (best-effort) cached.
    fn on_item_complete(&self, stage: Stage, index: usize, file_name: &str) {
        let _ = (stage, index, file_name);
    }

    /// An item failed; the stage is about to fail with it.
    fn on_item_error(&self, stage: Stage, index: usize, file_name: &str, error: &str) {
        let _ = (stage, index, file_name, error);
    }

    /// Called when every item of a stage is done.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;
