//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! each image as it moves through the pipeline stages.
//!
//! # Example
//!
//! ```rust
//! use scan2table::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FallbackCounter {
//!     fallbacks: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for FallbackCounter {
//!     fn on_stage(&self, _input: &str, stage: Stage) {
//!         if stage == Stage::FallingBack {
//!             self.fallbacks.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(FallbackCounter { fallbacks: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::extract::Stage;
use crate::output::OutputSource;
use std::sync::Arc;

/// Called by the pipeline as it processes images.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// In batch mode several images are in flight at once, so every method may
/// be called concurrently from different tasks. Protect shared mutable
/// state with `Mutex` or atomics.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before a batch starts.
    fn on_batch_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when work on one image begins.
    fn on_image_start(&self, input: &str) {
        let _ = input;
    }

    /// Called on every state-machine transition of one image, `Init` included.
    fn on_stage(&self, input: &str, stage: Stage) {
        let _ = (input, stage);
    }

    /// Called when one image produced its final text.
    fn on_image_complete(&self, input: &str, source: OutputSource, text_len: usize) {
        let _ = (input, source, text_len);
    }

    /// Called when one image failed.
    fn on_image_error(&self, input: &str, error: &str) {
        let _ = (input, error);
    }

    /// Called once after every image in a batch has been attempted.
    fn on_batch_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StageRecorder {
        stages: Mutex<Vec<Stage>>,
    }

    impl ExtractionProgressCallback for StageRecorder {
        fn on_stage(&self, _input: &str, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_image_start("a.png");
        cb.on_stage("a.png", Stage::Normalizing);
        cb.on_image_complete("a.png", OutputSource::Local, 10);
        cb.on_image_error("b.png", "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn recorder_sees_stages_in_order() {
        let rec = StageRecorder::default();
        rec.on_stage("a.png", Stage::Init);
        rec.on_stage("a.png", Stage::Normalizing);
        rec.on_stage("a.png", Stage::LocalExtracting);
        assert_eq!(
            *rec.stages.lock().unwrap(),
            vec![Stage::Init, Stage::Normalizing, Stage::LocalExtracting]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ExtractionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_image_start("x.png");
        cb.on_stage("x.png", Stage::Done);
    }
}
