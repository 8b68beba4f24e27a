//! Error types for the scan2table library.
//!
//! Every fatal condition is a variant of [`ExtractError`]. Variants are
//! granular (a missing file and an undecodable file are different problems
//! with different fixes), but callers that only care about *which stage*
//! failed can ask [`ExtractError::kind`] for the coarse [`ErrorKind`]:
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | `ImageLoad` | input resolution and image decoding, before any collaborator runs |
//! | `LocalExtraction` | the local partitioning service |
//! | `Encoding` | PNG/base64 encoding of the normalized image |
//! | `RemoteExtraction` | the remote OCR fallback |
//! | `GraphExtraction` | the vision-model graph flow |
//!
//! None of these are retried inside the library. A quality rejection of the
//! local result is *not* an error; it is a [`crate::QualityVerdict`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2table library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Image load errors ────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is empty or otherwise unusable.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file was read but could not be decoded as a raster image.
    #[error("Cannot decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    // ── Local extraction errors ──────────────────────────────────────────
    /// The local partitioning service failed or was unreachable.
    #[error("Local extraction failed for '{path}': {detail}")]
    LocalExtraction { path: PathBuf, detail: String },

    /// The local partitioning service answered with something we cannot read.
    #[error("Local extraction returned a malformed response: {detail}")]
    LocalResponseMalformed { detail: String },

    // ── Encoding errors ──────────────────────────────────────────────────
    /// PNG serialisation of the normalized image failed.
    #[error("Failed to encode normalized image: {detail}")]
    Encoding { detail: String },

    // ── Remote OCR errors ────────────────────────────────────────────────
    /// No API key is available for the remote OCR service.
    #[error("Remote OCR service '{service}' is not configured.\n{hint}")]
    RemoteNotConfigured { service: String, hint: String },

    /// The remote OCR service returned a non-success status.
    #[error("Remote OCR error from '{service}' (HTTP {status}): {message}")]
    RemoteApi {
        service: String,
        status: u16,
        message: String,
    },

    /// HTTP 401/403 from the remote OCR service.
    #[error("Authentication error from '{service}': {detail}")]
    RemoteAuth { service: String, detail: String },

    /// HTTP 429 from the remote OCR service.
    ///
    /// `retry_after_secs` carries the server's `Retry-After` hint when sent.
    /// The pipeline never retries on its own; this is for the caller.
    #[error("Rate limit exceeded for '{service}'")]
    RemoteRateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    /// The remote call did not complete within the configured timeout.
    #[error("Remote OCR call to '{service}' timed out after {secs}s")]
    RemoteTimeout { service: String, secs: u64 },

    /// Transport-level failure talking to the remote OCR service.
    #[error("Remote OCR request to '{service}' failed: {detail}")]
    RemoteTransport { service: String, detail: String },

    /// The remote OCR service answered but returned no pages.
    #[error("Remote OCR service '{service}' returned no pages")]
    RemoteEmptyResponse { service: String },

    // ── Graph extraction errors ──────────────────────────────────────────
    /// The vision model provider could not be created (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model call failed.
    #[error("Graph extraction failed: {message}")]
    GraphApi { message: String },

    /// The vision model reply did not match the graph schema.
    #[error("Graph extraction reply is not valid graph JSON: {detail}")]
    GraphResponseMalformed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`ExtractError`] by the stage that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    ImageLoad,
    LocalExtraction,
    Encoding,
    RemoteExtraction,
    GraphExtraction,
    Config,
    Io,
    Internal,
}

impl ExtractError {
    /// Which stage of the pipeline produced this error.
    pub fn kind(&self) -> ErrorKind {
        use ExtractError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | ImageDecode { .. } => ErrorKind::ImageLoad,
            LocalExtraction { .. } | LocalResponseMalformed { .. } => ErrorKind::LocalExtraction,
            Encoding { .. } => ErrorKind::Encoding,
            RemoteNotConfigured { .. }
            | RemoteApi { .. }
            | RemoteAuth { .. }
            | RemoteRateLimited { .. }
            | RemoteTimeout { .. }
            | RemoteTransport { .. }
            | RemoteEmptyResponse { .. } => ErrorKind::RemoteExtraction,
            ProviderNotConfigured { .. } | GraphApi { .. } | GraphResponseMalformed { .. } => {
                ErrorKind::GraphExtraction
            }
            OutputWriteFailed { .. } => ErrorKind::Io,
            InvalidConfig(_) => ErrorKind::Config,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_not_found_is_image_load() {
        let e = ExtractError::FileNotFound {
            path: PathBuf::from("/nope/scan.png"),
        };
        assert_eq!(e.kind(), ErrorKind::ImageLoad);
        assert!(e.to_string().contains("/nope/scan.png"));
    }

    #[test]
    fn remote_variants_share_a_kind() {
        let errs = [
            ExtractError::RemoteAuth {
                service: "mistral".into(),
                detail: "invalid key".into(),
            },
            ExtractError::RemoteRateLimited {
                service: "mistral".into(),
                retry_after_secs: Some(30),
            },
            ExtractError::RemoteEmptyResponse {
                service: "mistral".into(),
            },
        ];
        for e in &errs {
            assert_eq!(e.kind(), ErrorKind::RemoteExtraction, "{e}");
            assert!(e.to_string().contains("mistral"));
        }
    }

    #[test]
    fn remote_api_display() {
        let e = ExtractError::RemoteApi {
            service: "mistral".into(),
            status: 500,
            message: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 500"), "got: {msg}");
        assert!(msg.contains("boom"));
    }

    #[test]
    fn local_and_encoding_kinds() {
        let local = ExtractError::LocalExtraction {
            path: PathBuf::from("a.png"),
            detail: "connection refused".into(),
        };
        assert_eq!(local.kind(), ErrorKind::LocalExtraction);

        let enc = ExtractError::Encoding {
            detail: "buffer too small".into(),
        };
        assert_eq!(enc.kind(), ErrorKind::Encoding);
    }
}
