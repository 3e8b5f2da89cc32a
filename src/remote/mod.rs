//! Remote capabilities: the three black boxes the pipeline delegates to.
//!
//! | Trait            | Role                                   | Production adapter      |
//! |------------------|----------------------------------------|-------------------------|
//! | [`Upscaler`]     | image → larger image(s)                | [`replicate::ReplicateClient`] |
//! | [`Recognizer`]   | image → text                           | [`replicate::ReplicateClient`] |
//! | [`MenuExtractor`]| all images + one prompt → raw response | [`vlm::VisionExtractor`] |
//!
//! The traits are the seam the pipeline is tested through: tests plug in
//! in-process doubles, the binary plugs in the HTTP adapters.

pub mod replicate;
pub mod vlm;

use crate::error::ItemError;
use crate::menu::CompressedImage;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upscales one image.
#[async_trait]
pub trait Upscaler: Send + Sync {
    /// Upscale the image in `data_uri` by `scale_factor`.
    ///
    /// Returns one or more references to the result; the first is used.
    async fn upscale(&self, data_uri: &str, scale_factor: u32) -> Result<Vec<String>, ItemError>;
}

/// Recognises the text on one image.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe the image behind `reference` (URL, data URI or local path).
    async fn recognize(&self, reference: &str) -> Result<String, ItemError>;
}

/// One aggregate extraction request: a text part plus every image.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub images: Vec<CompressedImage>,
}

/// Turns the whole batch into a (hopefully JSON) menu response.
#[async_trait]
pub trait MenuExtractor: Send + Sync {
    /// Send the request and return the model's raw text answer.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ItemError>;
}

/// The three capabilities one run needs.
#[derive(Clone)]
pub struct Capabilities {
    pub upscaler: Arc<dyn Upscaler>,
    pub recognizer: Arc<dyn Recognizer>,
    pub extractor: Arc<dyn MenuExtractor>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Run `fut` under a deadline; expiry becomes [`ItemError::Timeout`].
pub async fn with_deadline<T, F>(capability: &str, secs: u64, fut: F) -> Result<T, ItemError>
where
    F: Future<Output = Result<T, ItemError>>,
{
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| ItemError::Timeout {
            capability: capability.to_string(),
            secs,
        })?
}
