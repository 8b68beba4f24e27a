//! Graph extraction: one vision-model call that turns a chart image into
//! structured series data.
//!
//! This flow is independent of the table pipeline: no normalization, no
//! quality gate, no fallback. The image bytes go to the model unchanged and
//! the reply is parsed into [`GraphMetadata`].
//!
//! ## Provider resolution
//!
//! 1. **Pre-built provider** (`GraphConfig::provider`), used as-is.
//! 2. **Explicit key** (`GraphConfig::api_key`): Gemini with that key.
//! 3. **Named provider** (`GraphConfig::provider_name`) + model.
//! 4. **Gemini** when `GEMINI_API_KEY` is set.
//! 5. **Auto-detection** via `ProviderFactory::from_env`.
//!
//! Steps 3 to 5 read credentials from the environment; step 2 does not.

use crate::error::ExtractError;
use crate::prompts::{GRAPH_SYSTEM_PROMPT, GRAPH_USER_PROMPT};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{
    ChatMessage, CompletionOptions, GeminiProvider, ImageData, LLMProvider, ProviderFactory,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default vision model for graph extraction.
pub const DEFAULT_GRAPH_MODEL: &str = "gemini-2.5-flash";

/// One data point read off the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x_value: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub y_value: f64,
    #[serde(default = "default_series")]
    pub series_name: String,
}

fn default_series() -> String {
    "default".to_string()
}

/// Structured description of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub graph_type: String,
    #[serde(default)]
    pub x_axis_title: String,
    #[serde(default)]
    pub y_axis_title: String,
    #[serde(default)]
    pub x_axis_scale: String,
    #[serde(default)]
    pub y_axis_scale: String,
    #[serde(default)]
    pub legend_items: Vec<String>,
    #[serde(default)]
    pub extracted_data: Vec<DataPoint>,
}

impl GraphMetadata {
    /// Fixed-width `series | x | y` table of the extracted points.
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{:<15} | {:<10} | {:<10}\n",
            "Series", self.x_axis_title, self.y_axis_title
        );
        out.push_str(&"-".repeat(40));
        out.push('\n');
        for p in &self.extracted_data {
            out.push_str(&format!(
                "{:<15} | {:<10} | {:<10}\n",
                p.series_name, p.x_value, p.y_value
            ));
        }
        out
    }
}

/// Models occasionally quote numbers or add thousands separators.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("y_value out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("y_value is not numeric: {s:?}"))),
        other => Err(D::Error::custom(format!("y_value is not numeric: {other}"))),
    }
}

/// Configuration for [`extract_graph`].
#[derive(Clone)]
pub struct GraphConfig {
    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Gemini API key. When set, no environment lookup happens.
    pub api_key: Option<String>,
    /// Provider name (e.g. "gemini", "openai").
    pub provider_name: Option<String>,
    /// Model identifier. Default: [`DEFAULT_GRAPH_MODEL`].
    pub model: Option<String>,
    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,
    /// Maximum reply tokens. Default: 4096.
    pub max_tokens: usize,
    /// Custom system prompt. If None, uses [`GRAPH_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            provider: None,
            api_key: None,
            provider_name: None,
            model: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Extract structured series data from a chart image.
pub async fn extract_graph(
    image_path: impl AsRef<Path>,
    config: &GraphConfig,
) -> Result<GraphMetadata, ExtractError> {
    let path = image_path.as_ref();
    let start = Instant::now();
    info!("Starting graph extraction: {}", path.display());

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: PathBuf::from(path),
        },
        _ => ExtractError::ImageDecode {
            path: PathBuf::from(path),
            detail: e.to_string(),
        },
    })?;

    let mime = image::guess_format(&bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/jpeg");
    let image_data = ImageData::new(STANDARD.encode(&bytes), mime);

    let provider = resolve_provider(config)?;

    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(GRAPH_SYSTEM_PROMPT);
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(GRAPH_USER_PROMPT, vec![image_data]),
    ];
    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| ExtractError::GraphApi {
            message: e.to_string(),
        })?;

    debug!(
        "Graph reply: {} input tokens, {} output tokens, {:?}",
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );

    let graph = parse_graph_reply(&response.content)?;
    info!(
        "Graph extraction complete: {} ({} points)",
        graph.graph_type,
        graph.extracted_data.len()
    );
    Ok(graph)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

/// Parse a model reply into [`GraphMetadata`], tolerating outer code fences.
pub fn parse_graph_reply(reply: &str) -> Result<GraphMetadata, ExtractError> {
    let trimmed = reply.trim();
    let json = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    };

    serde_json::from_str(json).map_err(|e| ExtractError::GraphResponseMalformed {
        detail: e.to_string(),
    })
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &GraphConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_GRAPH_MODEL);

    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        return match config.provider_name.as_deref() {
            None | Some("gemini") => Ok(Arc::new(GeminiProvider::new(key).with_model(model))),
            Some(other) => Err(ExtractError::ProviderNotConfigured {
                provider: other.to_string(),
                hint: "An explicit api_key is only supported for the gemini provider.".to_string(),
            }),
        };
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or another provider key) or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "graph_type": "Line",
        "x_axis_title": "Year",
        "y_axis_title": "Sales",
        "x_axis_scale": "Dates",
        "y_axis_scale": "Linear",
        "legend_items": ["EV", "ICE"],
        "extracted_data": [
            {"x_value": "2020", "y_value": 3.1, "series_name": "EV"},
            {"x_value": "2021", "y_value": "6,600", "series_name": "EV"},
            {"x_value": "2020", "y_value": 60}
        ]
    }"#;

    #[test]
    fn parses_plain_reply() {
        let g = parse_graph_reply(REPLY).unwrap();
        assert_eq!(g.graph_type, "Line");
        assert_eq!(g.legend_items, vec!["EV", "ICE"]);
        assert_eq!(g.extracted_data.len(), 3);
        assert_eq!(g.extracted_data[1].y_value, 6600.0);
        assert_eq!(g.extracted_data[2].series_name, "default");
    }

    #[test]
    fn parses_fenced_reply() {
        let fenced = format!("```json\n{}\n```", REPLY.trim());
        let g = parse_graph_reply(&fenced).unwrap();
        assert_eq!(g.x_axis_title, "Year");
    }

    #[test]
    fn rejects_non_numeric_y() {
        let bad = r#"{"graph_type":"Bar","extracted_data":[{"x_value":"a","y_value":"n/a"}]}"#;
        let err = parse_graph_reply(bad).unwrap_err();
        assert!(matches!(err, ExtractError::GraphResponseMalformed { .. }));
    }

    #[test]
    fn rejects_prose() {
        let err = parse_graph_reply("Sorry, I cannot read this chart.").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::GraphExtraction);
    }

    #[test]
    fn table_has_header_rule_and_rows() {
        let g = parse_graph_reply(REPLY).unwrap();
        let table = g.render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("Series"));
        assert!(lines[0].contains("Year"));
        assert_eq!(lines[1], "-".repeat(40));
        assert_eq!(lines.len(), 2 + 3);
        assert!(lines[2].starts_with("EV"));
    }

    #[test]
    fn explicit_key_builds_gemini_without_env() {
        let config = GraphConfig {
            api_key: Some("test-key".to_string()),
            model: Some("gemini-2.5-pro".to_string()),
            ..Default::default()
        };
        let provider = resolve_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), "gemini-2.5-pro");
    }

    #[test]
    fn explicit_key_with_other_provider_is_rejected() {
        let config = GraphConfig {
            api_key: Some("test-key".to_string()),
            provider_name: Some("openai".to_string()),
            ..Default::default()
        };
        let err = resolve_provider(&config).err().unwrap();
        assert!(matches!(err, ExtractError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = GraphConfig {
            api_key: Some("secret-value".to_string()),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("secret-value"));
    }

    #[tokio::test]
    async fn missing_image_is_image_load_error() {
        let err = extract_graph("/no/such/chart.png", &GraphConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ImageLoad);
    }
}
