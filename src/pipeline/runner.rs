//! The per-image stage runner: cached, concurrent, order-preserving.
//!
//! Every per-image stage goes through [`StageRunner::run`]:
//!
//! 1. look the item up in the stage's cache namespace, skipping the work on a hit;
//! 2. otherwise run the item's future under the per-item deadline;
//! 3. persist the result (best-effort) before handing it back.
//!
//! At most `concurrency` items are in flight at once. Results are re-sorted by
//! input index, so output position `i` always belongs to input item `i`. The
//! first failure fails the stage: the remaining in-flight work is dropped and
//! the error names the image that caused it. Items that finished before the
//! failure stay cached, so the next run picks up where this one stopped.

use crate::cache::{item_key, ContentCache};
use crate::error::{ItemError, MenuError};
use crate::menu::{ImageItem, Stage};
use crate::progress::ProgressCallback;
use crate::remote::with_deadline;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// Results of one stage, in input order, with cache accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    pub values: Vec<T>,
    /// Items served from the cache.
    pub cached: usize,
    /// Items computed by running the stage function.
    pub computed: usize,
}

/// Runs one per-image stage over a batch.
#[derive(Clone, Copy)]
pub struct StageRunner<'a> {
    cache: &'a ContentCache,
    concurrency: usize,
    timeout_secs: u64,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> StageRunner<'a> {
    pub fn new(cache: &'a ContentCache, concurrency: usize, timeout_secs: u64) -> Self {
        Self {
            cache,
            concurrency: concurrency.max(1),
            timeout_secs,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Apply `f(index, item)` to every item, through the cache.
    pub async fn run<T, F, Fut>(
        &self,
        stage: Stage,
        items: &[ImageItem],
        f: F,
    ) -> Result<StageOutcome<T>, MenuError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(usize, ImageItem) -> Fut,
        Fut: Future<Output = Result<T, ItemError>>,
    {
        info!("{} stage: {} images", stage, items.len());
        if let Some(cb) = self.progress {
            cb.on_stage_start(stage, items.len());
        }

        let f = &f;
        let mut results: Vec<(usize, T, bool)> = stream::iter(items.iter().enumerate())
            .map(|(index, item)| self.run_item(stage, index, item, f))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        results.sort_by_key(|(index, _, _)| *index);
        let cached = results.iter().filter(|(_, _, hit)| *hit).count();
        let computed = results.len() - cached;
        info!(
            "{} stage complete: {} computed, {} from cache",
            stage, computed, cached
        );
        if let Some(cb) = self.progress {
            cb.on_stage_complete(stage);
        }

        Ok(StageOutcome {
            values: results.into_iter().map(|(_, value, _)| value).collect(),
            cached,
            computed,
        })
    }

    async fn run_item<T, F, Fut>(
        &self,
        stage: Stage,
        index: usize,
        item: &ImageItem,
        f: &F,
    ) -> Result<(usize, T, bool), MenuError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(usize, ImageItem) -> Fut,
        Fut: Future<Output = Result<T, ItemError>>,
    {
        let key = item_key(item);
        if let Some(hit) = self.cache.get::<T>(stage, &key).await {
            debug!("{}: {} served from cache", stage, item.file_name);
            if let Some(cb) = self.progress {
                cb.on_item_cached(stage, index, &item.file_name);
            }
            return Ok((index, hit, true));
        }

        let capability = stage.to_string().to_lowercase();
        match with_deadline(&capability, self.timeout_secs, f(index, item.clone())).await {
            Ok(value) => {
                self.cache.put(stage, &key, &value).await;
                if let Some(cb) = self.progress {
                    cb.on_item_complete(stage, index, &item.file_name);
                }
                Ok((index, value, false))
            }
            Err(source) => {
                warn!("{}: {} failed: {}", stage, item.file_name, source);
                if let Some(cb) = self.progress {
                    cb.on_item_error(stage, index, &item.file_name, &source.to_string());
                }
                Err(MenuError::StageFailed {
                    stage,
                    index,
                    file_name: item.file_name.clone(),
                    source,
                })
            }
        }
    }
}
