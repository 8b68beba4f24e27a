//! # scan2table
//!
//! Extract tables and text from scanned images with a local-first,
//! quality-gated pipeline.
//!
//! ## Why this crate?
//!
//! Hosted OCR reads degraded scans well but costs money and sends the
//! document off the machine. A self-hosted layout partitioner is free and
//! private but regularly produces tables with missing rows or mostly-empty
//! cells. This crate runs the local partitioner first, inspects the tables
//! it produced, and only pays for the hosted OCR call when they look broken.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image (path or URL)
//!  │
//!  ├─ 1. Normalize  grayscale → 3×3 sharpen → Lanczos upscale to ≥ 2000 px
//!  ├─ 2. Local      partition the original file (Unstructured API, hi_res)
//!  ├─ 3. Gate       every table needs ≥ 2 rows and ≤ 50 % empty cells
//!  ├─ 4a. Accept    element texts joined with blank lines
//!  └─ 4b. Fallback  normalized image → PNG → base64 → Mistral OCR, page 1
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2table::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoints and MISTRAL_API_KEY are read from the environment.
//!     let config = ExtractionConfig::from_env().build()?;
//!     let output = extract("invoice.jpg", &config).await?;
//!     println!("{}", output.text);
//!     eprintln!("source: {} ({})", output.source, output.verdict);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2table` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scan2table = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod element;
pub mod error;
pub mod extract;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PartitionStrategy, QualityThresholds};
pub use element::{ElementCategory, ExtractionElement};
pub use error::{ErrorKind, ExtractError};
pub use extract::{extract, extract_sync, preview, Extractor, Stage};
pub use graph::{extract_graph, parse_graph_reply, DataPoint, GraphConfig, GraphMetadata};
pub use output::{BatchItem, ExtractionOutput, ExtractionStats, OutputSource};
pub use pipeline::encode::EncodedPayload;
pub use pipeline::local::{LocalExtractor, UnstructuredClient};
pub use pipeline::normalize::NormalizedImage;
pub use pipeline::quality::{QualityVerdict, RejectReason};
pub use pipeline::remote::{MistralOcrClient, OcrDocument, OcrPage, RemoteOcr};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::BatchStream;
