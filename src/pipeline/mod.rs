//! Pipeline stages for menu-photo-to-JSON extraction.
//!
//! Each submodule implements one step; [`runner`] is the shared machinery
//! that runs a per-image step over the whole batch.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ upscale ──▶ recognize ──▶ extract ──▶ postprocess
//!              │                         ▲
//!              └────────▶ encode ────────┘
//! ```
//!
//! 1. [`input`]   — discover photos; fetch bytes by URL, data URI or path
//! 2. [`upscale`] — integer scale factor towards the target size; skips the
//!    remote call when the photo is already large enough
//! 3. recognition has no local logic; it is a straight call to the
//!    [`crate::remote::Recognizer`] through the runner
//! 4. [`encode`]  — probe dimensions, JPEG-recompress under the size budget
//!    (CPU-bound, `spawn_blocking`)
//! 5. [`extract`] — one request for the batch, parsed into a menu
//! 6. [`postprocess`] — deterministic cleanup of the model's answer

pub mod encode;
pub mod extract;
pub mod input;
pub mod postprocess;
pub mod runner;
pub mod upscale;
