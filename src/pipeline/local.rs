//! Local extraction: layout/table partitioning of the original image file.
//!
//! [`LocalExtractor`] is the seam; [`UnstructuredClient`] is the default
//! implementation and talks to a self-hosted Unstructured partition API
//! (`POST /general/v0/general`). The service's JSON elements are mapped into
//! [`ExtractionElement`] before they leave this module.

use crate::config::{ExtractionConfig, PartitionStrategy};
use crate::element::{ElementCategory, ExtractionElement};
use crate::error::ExtractError;
use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const PARTITION_PATH: &str = "/general/v0/general";

/// A local document partitioner.
#[async_trait]
pub trait LocalExtractor: Send + Sync {
    /// Partition the image file at `path` into ordered elements.
    async fn partition(
        &self,
        path: &Path,
        strategy: PartitionStrategy,
    ) -> Result<Vec<ExtractionElement>, ExtractError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "local"
    }
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    category: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    text_as_html: Option<String>,
}

impl From<RawElement> for ExtractionElement {
    fn from(raw: RawElement) -> Self {
        ExtractionElement {
            category: ElementCategory::from_tag(&raw.category),
            table_html: raw.metadata.text_as_html,
            text: raw.text,
        }
    }
}

/// Client for the Unstructured partition API.
#[derive(Debug, Clone)]
pub struct UnstructuredClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl UnstructuredClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.unstructured_url.trim_end_matches('/').to_string(),
            api_key: config.unstructured_api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, PARTITION_PATH)
    }
}

#[async_trait]
impl LocalExtractor for UnstructuredClient {
    async fn partition(
        &self,
        path: &Path,
        strategy: PartitionStrategy,
    ) -> Result<Vec<ExtractionElement>, ExtractError> {
        let fail = |detail: String| ExtractError::LocalExtraction {
            path: path.to_path_buf(),
            detail,
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| fail(format!("cannot read file: {e}")))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let form = multipart::Form::new()
            .part("files", multipart::Part::bytes(bytes).file_name(file_name))
            .text("strategy", strategy.as_str())
            .text("infer_table_structure", "true");

        let mut request = self
            .client
            .post(self.endpoint())
            .header("accept", "application/json")
            .multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.header("unstructured-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                fail("request timed out".to_string())
            } else {
                fail(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {status}: {}", truncate(&body, 200))));
        }

        let raw: Vec<RawElement> = response
            .json()
            .await
            .map_err(|e| ExtractError::LocalResponseMalformed {
                detail: e.to_string(),
            })?;

        debug!("{}: {} elements from {}", self.name(), raw.len(), path.display());
        Ok(raw.into_iter().map(ExtractionElement::from).collect())
    }

    fn name(&self) -> &str {
        "unstructured"
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UnstructuredClient {
        let config = ExtractionConfig::builder()
            .unstructured_url(server.uri())
            .unstructured_api_key("local-key")
            .api_timeout_secs(5)
            .build()
            .unwrap();
        UnstructuredClient::new(&config).unwrap()
    }

    fn scratch_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("scan.png");
        std::fs::write(&p, b"not really a png, the mock does not care").unwrap();
        (dir, p)
    }

    #[test]
    fn raw_element_maps_to_closed_type() {
        let raw: RawElement = serde_json::from_value(serde_json::json!({
            "type": "Table",
            "element_id": "abc",
            "text": "a b",
            "metadata": {"text_as_html": "<table></table>", "page_number": 1}
        }))
        .unwrap();
        let el = ExtractionElement::from(raw);
        assert!(el.is_table());
        assert_eq!(el.table_html.as_deref(), Some("<table></table>"));
        assert_eq!(el.text, "a b");
    }

    #[test]
    fn raw_element_without_metadata() {
        let raw: RawElement =
            serde_json::from_value(serde_json::json!({"type": "Title", "text": "Q3"})).unwrap();
        let el = ExtractionElement::from(raw);
        assert_eq!(el.category, ElementCategory::Title);
        assert!(el.table_html.is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[tokio::test]
    async fn partition_posts_file_and_parses_elements() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/general/v0/general"))
            .and(header("unstructured-api-key", "local-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"type": "Title", "text": "Sales", "metadata": {}},
                {"type": "Table", "text": "a b", "metadata": {"text_as_html": "<table><tr><td>a</td></tr></table>"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, file) = scratch_file();
        let els = client_for(&server)
            .partition(&file, PartitionStrategy::HiRes)
            .await
            .unwrap();
        assert_eq!(els.len(), 2);
        assert_eq!(els[0].category, ElementCategory::Title);
        assert!(els[1].is_table());
    }

    #[tokio::test]
    async fn partition_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let (_dir, file) = scratch_file();
        let err = client_for(&server)
            .partition(&file, PartitionStrategy::HiRes)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::LocalExtraction { .. }));
        assert!(err.to_string().contains("model not loaded"), "{err}");
    }

    #[tokio::test]
    async fn partition_rejects_non_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"detail": "?"})))
            .mount(&server)
            .await;

        let (_dir, file) = scratch_file();
        let err = client_for(&server)
            .partition(&file, PartitionStrategy::Fast)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::LocalResponseMalformed { .. }));
    }
}
