//! The extraction orchestrator.
//!
//! One image goes through a fixed state machine:
//!
//! ```text
//! Init → Normalizing → LocalExtracting → QualityChecking ─┬→ Accepted ──┬→ Done
//!                                                         └→ FallingBack ┘
//! ```
//!
//! Exactly one tier contributes the final text. The local partitioner is
//! called once; the remote OCR service is called only on a quality
//! rejection, and at most once. Any collaborator error ends the run; a
//! failing local *call* does not trigger the fallback, only a failing
//! *verdict* does.

use crate::config::ExtractionConfig;
use crate::element::join_text;
use crate::error::ExtractError;
use crate::output::{ExtractionOutput, ExtractionStats, OutputSource};
use crate::pipeline::local::{LocalExtractor, UnstructuredClient};
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::quality::{self, QualityVerdict};
use crate::pipeline::remote::{MistralOcrClient, RemoteOcr};
use crate::pipeline::{encode, input, normalize};
use crate::progress::ExtractionProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// States of the per-image state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Normalizing,
    LocalExtracting,
    QualityChecking,
    Accepted,
    FallingBack,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Normalizing => "normalizing",
            Stage::LocalExtracting => "local-extracting",
            Stage::QualityChecking => "quality-checking",
            Stage::Accepted => "accepted",
            Stage::FallingBack => "falling-back",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Runs the two-tier pipeline. Cheap to clone; holds no per-image state,
/// so one instance can serve many images concurrently.
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractionConfig>,
    local: Arc<dyn LocalExtractor>,
    remote: Arc<dyn RemoteOcr>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("local", &self.local.name())
            .field("remote", &self.remote.name())
            .finish()
    }
}

impl Extractor {
    /// Build an extractor with the default HTTP collaborators
    /// ([`UnstructuredClient`] and [`MistralOcrClient`]).
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let local = Arc::new(UnstructuredClient::new(&config)?);
        let remote = Arc::new(MistralOcrClient::new(&config)?);
        Ok(Self::with_collaborators(config, local, remote))
    }

    /// Build an extractor around caller-supplied collaborators.
    pub fn with_collaborators(
        config: ExtractionConfig,
        local: Arc<dyn LocalExtractor>,
        remote: Arc<dyn RemoteOcr>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            local,
            remote,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract text from one image (local path or HTTP/HTTPS URL).
    ///
    /// # Errors
    /// - image-load errors ([`crate::ErrorKind::ImageLoad`]) before any collaborator runs
    /// - local partitioner failures
    /// - encoding and remote OCR failures, only when the fallback fires
    pub async fn extract(&self, input: impl AsRef<str>) -> Result<ExtractionOutput, ExtractError> {
        let input = input.as_ref();
        let cb = self.config.progress_callback.as_deref();

        if let Some(cb) = cb {
            cb.on_image_start(input);
        }

        let result = self.run(input, cb).await;

        if let Some(cb) = cb {
            match &result {
                Ok(out) => cb.on_image_complete(input, out.source, out.text.len()),
                Err(e) => cb.on_image_error(input, &e.to_string()),
            }
        }
        result
    }

    async fn run(
        &self,
        input_str: &str,
        cb: Option<&dyn ExtractionProgressCallback>,
    ) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();
        let enter = |stage: Stage| {
            debug!("{}: → {}", input_str, stage);
            if let Some(cb) = cb {
                cb.on_stage(input_str, stage);
            }
        };
        let mut stats = ExtractionStats::default();

        enter(Stage::Init);
        info!("Starting extraction: {}", input_str);

        // ── Normalizing ──────────────────────────────────────────────────
        enter(Stage::Normalizing);
        let normalize_start = Instant::now();
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let image_path = resolved.path().to_path_buf();
        let normalized = normalize::normalize_file(&image_path, self.config.min_width).await?;
        stats.normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
        (stats.original_width, stats.original_height) = normalized.original_dimensions();
        stats.normalized_width = normalized.width();
        stats.normalized_height = normalized.height();

        // ── LocalExtracting ──────────────────────────────────────────────
        // The partitioner reads the original file; the normalized buffer is
        // reserved for the fallback.
        enter(Stage::LocalExtracting);
        let local_start = Instant::now();
        let elements = self
            .local
            .partition(&image_path, self.config.strategy)
            .await?;
        stats.local_duration_ms = local_start.elapsed().as_millis() as u64;
        stats.element_count = elements.len();
        stats.table_count = elements.iter().filter(|el| el.is_table()).count();
        info!(
            "{}: {} elements ({} tables) from {}",
            input_str,
            stats.element_count,
            stats.table_count,
            self.local.name()
        );

        // ── QualityChecking ──────────────────────────────────────────────
        enter(Stage::QualityChecking);
        let verdict = quality::evaluate(&elements, &self.config.thresholds);

        let (text, source) = match &verdict {
            QualityVerdict::Accepted => {
                enter(Stage::Accepted);
                info!("{}: local extraction passed", input_str);
                (join_text(&elements), OutputSource::Local)
            }
            QualityVerdict::Rejected { reason } => {
                enter(Stage::FallingBack);
                warn!(
                    "{}: local extraction rejected ({}); falling back to {}",
                    input_str,
                    reason,
                    self.remote.name()
                );
                let remote_start = Instant::now();
                let text = self.fallback(normalized, &mut stats).await?;
                stats.remote_duration_ms = Some(remote_start.elapsed().as_millis() as u64);
                (text, OutputSource::Remote)
            }
        };

        enter(Stage::Done);
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "{}: done via {} in {}ms ({} chars)",
            input_str,
            source,
            stats.total_duration_ms,
            text.len()
        );

        Ok(ExtractionOutput {
            text,
            source,
            verdict,
            stats,
        })
    }

    /// Encode the normalized image and take the first page of the remote transcription.
    async fn fallback(
        &self,
        normalized: NormalizedImage,
        stats: &mut ExtractionStats,
    ) -> Result<String, ExtractError> {
        let payload = tokio::task::spawn_blocking(move || encode::encode_normalized(&normalized))
            .await
            .map_err(|e| ExtractError::Internal(format!("Encode task panicked: {}", e)))??;
        stats.payload_bytes = Some(payload.data.len());

        let document = self.remote.transcribe(&payload).await?;
        document
            .pages
            .into_iter()
            .next()
            .map(|page| page.markdown)
            .ok_or_else(|| ExtractError::RemoteEmptyResponse {
                service: self.remote.name().to_string(),
            })
    }

    /// Extract and write the text to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn extract_to_file(
        &self,
        input: impl AsRef<str>,
        output_path: impl AsRef<Path>,
    ) -> Result<ExtractionOutput, ExtractError> {
        let output = self.extract(input).await?;
        let path = output_path.as_ref();
        let write_err = |source| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &output.text)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        Ok(output)
    }

    /// Blocking wrapper around [`Extractor::extract`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn extract_sync(&self, input: impl AsRef<str>) -> Result<ExtractionOutput, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract(input))
    }
}

/// Extract text from one image with the default collaborators.
pub async fn extract(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?.extract(input).await
}

/// Synchronous wrapper around [`extract`].
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?.extract_sync(input)
}

/// Normalize an image and save the result as PNG without extracting anything.
///
/// Needs no collaborator and no credentials.
pub async fn preview(
    input: impl AsRef<str>,
    output_png: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<NormalizedImage, ExtractError> {
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let normalized = normalize::normalize_file(resolved.path(), config.min_width).await?;
    normalized.save_png(output_png.as_ref())?;
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_names() {
        assert_eq!(Stage::FallingBack.to_string(), "falling-back");
        assert_eq!(Stage::QualityChecking.to_string(), "quality-checking");
    }

    #[test]
    fn extractor_debug_names_collaborators() {
        let ex = Extractor::new(ExtractionConfig::default()).unwrap();
        let dbg = format!("{ex:?}");
        assert!(dbg.contains("unstructured"));
        assert!(dbg.contains("mistral"));
    }
}
