//! Pipeline stages for table extraction.
//!
//! Each submodule implements exactly one step. The orchestration lives in
//! [`crate::extract`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ local ──▶ quality ──┬─ accepted ─▶ joined element text
//! (path/URL) (gray+sharpen) (partition)  (gate)  │
//!                                              └─ rejected ─▶ encode ──▶ remote
//!                                                             (PNG b64)  (OCR)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`normalize`]: grayscale, sharpen and upscale; runs in `spawn_blocking`
//! 3. [`local`]: partition the original file into typed elements
//! 4. [`quality`]: pure accept/reject verdict over the elements
//! 5. [`encode`]: RGB PNG + base64 payload, only built on fallback
//! 6. [`remote`]: hosted OCR, called at most once per image

pub mod encode;
pub mod input;
pub mod local;
pub mod normalize;
pub mod quality;
pub mod remote;
