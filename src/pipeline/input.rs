//! Input resolution: turn a user-supplied path or URL into a local image file.
//!
//! The local partitioner works on a file, not on a buffer, so URL inputs are
//! downloaded into a `TempDir` that lives as long as the returned
//! [`ResolvedInput`]. Everything that can go wrong here is an image-load
//! failure and happens before any collaborator is contacted.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the image was downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the image file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local image file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    if input.trim().is_empty() {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and readability.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, ExtractError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(ExtractError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound { path });
        }
    }

    debug!("Resolved local image: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    // Sniff the content so the file gets an extension the partitioner
    // recognises even when the URL has none.
    let format = image::guess_format(&bytes).map_err(|e| ExtractError::ImageDecode {
        path: PathBuf::from(url),
        detail: e.to_string(),
    })?;

    let filename = extract_filename(url, format);
    let temp_dir = TempDir::new().map_err(|e| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason: format!("cannot create temp dir: {e}"),
    })?;
    let file_path = temp_dir.path().join(&filename);
    write_download(url, &file_path, &bytes).await?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

async fn write_download(url: &str, path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("cannot write {}: {e}", path.display()),
        })
}

/// Pick a filename from the URL path, falling back to one derived from the format.
fn extract_filename(url: &str, format: image::ImageFormat) -> String {
    let ext = format.extensions_str().first().copied().unwrap_or("img");

    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(stem) = segments
                .next_back()
                .and_then(|last| Path::new(last).file_stem())
                .and_then(|stem| stem.to_str())
                .filter(|stem| !stem.is_empty())
            {
                return format!("{stem}.{ext}");
            }
        }
    }

    format!("downloaded.{ext}")
}
