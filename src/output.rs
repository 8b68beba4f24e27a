//! Result types returned by the extraction entry points.

use crate::error::ExtractError;
use crate::pipeline::quality::QualityVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tier produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    /// Local partitioning passed the quality gate.
    Local,
    /// Local result was rejected; text came from the remote OCR service.
    Remote,
}

impl fmt::Display for OutputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSource::Local => f.write_str("local"),
            OutputSource::Remote => f.write_str("remote"),
        }
    }
}

/// Final result for one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The extracted text: joined local element text, or the remote
    /// service's first-page markdown, verbatim.
    pub text: String,
    pub source: OutputSource,
    /// The quality gate's decision on the local result.
    pub verdict: QualityVerdict,
    pub stats: ExtractionStats,
}

/// Timings and counters for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub original_width: u32,
    pub original_height: u32,
    pub normalized_width: u32,
    pub normalized_height: u32,
    /// Elements returned by the local partitioner.
    pub element_count: usize,
    /// Of which tables.
    pub table_count: usize,
    /// Base64 payload length sent to the remote service, when it was called.
    pub payload_bytes: Option<usize>,
    pub normalize_duration_ms: u64,
    pub local_duration_ms: u64,
    pub remote_duration_ms: Option<u64>,
    pub total_duration_ms: u64,
}

/// One entry of a batch run.
#[derive(Debug)]
pub struct BatchItem {
    /// Position of this input in the caller's list.
    pub index: usize,
    pub input: String,
    pub result: Result<ExtractionOutput, ExtractError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
