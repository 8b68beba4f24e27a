//! Remote OCR fallback: the only stage that leaves the machine.
//!
//! [`RemoteOcr`] is the seam; [`MistralOcrClient`] is the default
//! implementation (`POST /v1/ocr`). A call is made at most once per image.
//! Transient failures are reported, never retried here, so the caller
//! decides whether the whole image is worth another attempt.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode::EncodedPayload;
use crate::pipeline::local::truncate;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "mistral";

/// Pages returned by a remote OCR service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    pub pages: Vec<OcrPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub index: usize,
    pub markdown: String,
}

/// A remote OCR service.
#[async_trait]
pub trait RemoteOcr: Send + Sync {
    async fn transcribe(&self, payload: &EncodedPayload) -> Result<OcrDocument, ExtractError>;

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "remote"
    }
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrRequestDocument,
}

#[derive(Debug, Serialize)]
struct OcrRequestDocument {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: String,
}

/// Client for the Mistral OCR endpoint.
#[derive(Clone)]
pub struct MistralOcrClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MistralOcrClient {
    /// Build the client. A missing API key is not an error until the
    /// fallback actually fires.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.mistral_base_url.trim_end_matches('/').to_string(),
            model: config.mistral_model.clone(),
            api_key: config.mistral_api_key.clone(),
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn map_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> ExtractError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExtractError::RemoteAuth {
                service: SERVICE.to_string(),
                detail: truncate(body, 200).to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => ExtractError::RemoteRateLimited {
                service: SERVICE.to_string(),
                retry_after_secs: retry_after,
            },
            _ => ExtractError::RemoteApi {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                message: truncate(body, 200).to_string(),
            },
        }
    }
}

#[async_trait]
impl RemoteOcr for MistralOcrClient {
    async fn transcribe(&self, payload: &EncodedPayload) -> Result<OcrDocument, ExtractError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ExtractError::RemoteNotConfigured {
                service: SERVICE.to_string(),
                hint: "Set MISTRAL_API_KEY or pass --mistral-api-key.".to_string(),
            })?;

        let body = OcrRequest {
            model: &self.model,
            document: OcrRequestDocument {
                kind: "image_url",
                image_url: payload.to_data_url(),
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::RemoteTimeout {
                        service: SERVICE.to_string(),
                        secs: self.timeout_secs,
                    }
                } else {
                    ExtractError::RemoteTransport {
                        service: SERVICE.to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, retry_after, &text));
        }

        let doc: OcrDocument = response.json().await.map_err(|e| ExtractError::RemoteApi {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            message: format!("unreadable response body: {e}"),
        })?;

        debug!("{}: {} page(s) returned", SERVICE, doc.pages.len());
        Ok(doc)
    }

    fn name(&self) -> &str {
        SERVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> EncodedPayload {
        EncodedPayload {
            data: "aGVsbG8=".into(),
            mime_type: "image/png",
            width: 1,
            height: 1,
        }
    }

    fn client_for(server: &MockServer, key: Option<&str>) -> MistralOcrClient {
        let mut builder = ExtractionConfig::builder()
            .mistral_base_url(server.uri())
            .api_timeout_secs(5);
        if let Some(k) = key {
            builder = builder.mistral_api_key(k);
        }
        MistralOcrClient::new(&builder.build().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn sends_data_url_and_parses_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/ocr"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral-ocr-latest",
                "document": {"type": "image_url", "image_url": "data:image/png;base64,aGVsbG8="}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "pages": [{"index": 0, "markdown": "| a | b |", "images": []}],
                "model": "mistral-ocr-latest",
                "usage_info": {"pages_processed": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let doc = client_for(&server, Some("test-key"))
            .transcribe(&payload())
            .await
            .unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].markdown, "| a | b |");
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .transcribe(&payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RemoteNotConfigured { .. }));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("bad"))
            .transcribe(&payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RemoteAuth { .. }), "{err}");
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k"))
            .transcribe(&payload())
            .await
            .unwrap_err();
        match err {
            ExtractError::RemoteRateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(17)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k"))
            .transcribe(&payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RemoteApi { status: 503, .. }));
    }

    #[test]
    fn debug_redacts_key() {
        let config = ExtractionConfig::builder()
            .mistral_api_key("sk-very-secret")
            .build()
            .unwrap();
        let client = MistralOcrClient::new(&config).unwrap();
        assert!(!format!("{client:?}").contains("sk-very-secret"));
    }
}
