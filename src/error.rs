//! Error types for the menu2json library.
//!
//! Two error types mirror the two granularities of work in the pipeline:
//!
//! * [`MenuError`] — **Fatal**: the run stops. Missing credentials, an empty
//!   input folder, any failed stage, an unusable extraction response, or an
//!   output file that cannot be written. Returned from [`crate::run::run`]
//!   and friends.
//!
//! * [`ItemError`] — the failure of a single unit of work: one image in a
//!   per-image stage, or the single batch call of the extraction stage.
//!   It never escapes on its own; the stage runner wraps it in
//!   [`MenuError::StageFailed`] together with the image that caused it.
//!
//! Cache problems are deliberately absent: a corrupt or unreadable entry is a
//! miss and a failed write is a warning, so neither can abort a run.

use crate::menu::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the menu2json library.
#[derive(Debug, Error)]
pub enum MenuError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A required credential is not present in the environment.
    #[error("Missing {var} in the environment.\nAdd it to your shell or to a .env file.")]
    MissingCredential { var: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The extraction provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory is missing or unreadable.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input directory holds no `.jpg`, `.jpeg` or `.png` files.
    #[error("No menu photos (.jpg, .jpeg, .png) found in '{dir}'")]
    NoImages { dir: PathBuf },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// One image failed inside a per-image stage, failing the whole stage.
    #[error("{stage} stage failed on image {} of the batch ('{file_name}'): {source}", .index + 1)]
    StageFailed {
        stage: Stage,
        index: usize,
        file_name: String,
        #[source]
        source: ItemError,
    },

    /// The aggregate extraction call itself failed.
    #[error("Menu extraction failed: {source}")]
    ExtractionFailed {
        #[source]
        source: ItemError,
    },

    // ── Content-format errors ─────────────────────────────────────────────
    /// The response was not JSON and the brace-scanning fallback found no object.
    #[error("Extraction response contains no JSON object (fallback brace scan found nothing)\nResponse starts with: {preview:?}")]
    NoJsonInResponse { preview: String },

    /// JSON was found but does not describe a menu.
    #[error("Extraction response is not a valid menu document: {detail}")]
    MalformedMenu { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MenuError {
    /// The stage and file name attached to a failure, if it came from one image.
    pub fn failed_item(&self) -> Option<(Stage, usize, &str)> {
        match self {
            MenuError::StageFailed {
                stage,
                index,
                file_name,
                ..
            } => Some((*stage, *index, file_name.as_str())),
            _ => None,
        }
    }
}

/// The failure of one unit of work.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The image bytes could not be obtained from their reference.
    #[error("cannot read image source '{reference}': {detail}")]
    Source { reference: String, detail: String },

    /// Decoding, probing or re-encoding the image failed.
    #[error("image processing failed: {detail}")]
    Image { detail: String },

    /// The remote capability reported a failure.
    #[error("{capability} failed: {detail}")]
    Remote { capability: String, detail: String },

    /// The remote endpoint answered with a non-success HTTP status.
    #[error("{capability} returned HTTP {status}: {detail}")]
    Http {
        capability: String,
        status: u16,
        detail: String,
    },

    /// The remote capability succeeded but produced nothing usable.
    #[error("{capability} returned no output")]
    EmptyOutput { capability: String },

    /// The remote capability did not answer within its deadline.
    #[error("{capability} timed out after {secs}s")]
    Timeout { capability: String, secs: u64 },
}
