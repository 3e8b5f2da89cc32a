//! Replicate adapter: upscaling and OCR as hosted model predictions.
//!
//! One prediction is one `POST`. The request asks the server to hold the
//! connection until the prediction finishes (`Prefer: wait`); predictions
//! that outlive that window are polled through their `urls.get` link until
//! they reach a terminal status.
//!
//! Model references come in two forms:
//!
//! | Reference               | Endpoint                                  |
//! |-------------------------|-------------------------------------------|
//! | `owner/name`            | `POST /models/owner/name/predictions`      |
//! | `owner/name:version`    | `POST /predictions` with `"version"` body |

use crate::config::PipelineConfig;
use crate::error::ItemError;
use crate::pipeline::input::{self, SourceKind};
use crate::pipeline::encode;
use crate::remote::{Recognizer, Upscaler};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Public Replicate API root.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Replicate API client bound to one upscale model and one OCR model.
pub struct ReplicateClient {
    client: Client,
    api_token: String,
    base_url: String,
    upscale_model: String,
    ocr_model: String,
    ocr_task: String,
    ocr_resolution: String,
    poll_interval: Duration,
    download_timeout_secs: u64,
}

impl ReplicateClient {
    /// Create a client using the models and OCR options in `config`.
    pub fn new(api_token: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            upscale_model: config.upscale_model.clone(),
            ocr_model: config.ocr_model.clone(),
            ocr_task: config.ocr_task.clone(),
            ocr_resolution: config.ocr_resolution.clone(),
            poll_interval: Duration::from_secs(1),
            download_timeout_secs: config.download_timeout_secs,
        }
    }

    /// Point the client at another API root (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one prediction to completion and return its `output`.
    async fn predict(&self, capability: &str, model: &str, input: Value) -> Result<Value, ItemError> {
        let route = prediction_route(model);
        let mut body = json!({ "input": input });
        if let Some(version) = &route.version {
            body["version"] = json!(version);
        }

        let url = format!("{}/{}", self.base_url, route.path);
        debug!("{}: POST {}", capability, url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| remote(capability, format!("HTTP request failed: {e}")))?;
        let mut prediction: Prediction = read_json(capability, response).await?;

        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    return match prediction.output {
                        Some(Value::Null) | None => Err(ItemError::EmptyOutput {
                            capability: capability.to_string(),
                        }),
                        Some(output) => Ok(output),
                    };
                }
                "failed" | "canceled" => {
                    let detail = prediction
                        .error
                        .map(|e| match e {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| format!("prediction {}", prediction.status));
                    return Err(remote(capability, detail));
                }
                status => {
                    let poll_url = prediction
                        .urls
                        .and_then(|u| u.get)
                        .ok_or_else(|| remote(capability, format!("prediction is '{status}' but has no poll URL")))?;
                    debug!("{}: prediction {}, polling {}", capability, status, poll_url);
                    tokio::time::sleep(self.poll_interval).await;
                    let response = self
                        .client
                        .get(&poll_url)
                        .bearer_auth(&self.api_token)
                        .send()
                        .await
                        .map_err(|e| remote(capability, format!("HTTP request failed: {e}")))?;
                    prediction = read_json(capability, response).await?;
                }
            }
        }
    }

    /// Make a reference reachable from Replicate's side.
    ///
    /// URLs and data URIs pass through; local files are inlined.
    async fn reachable(&self, reference: &str) -> Result<String, ItemError> {
        match input::source_kind(reference) {
            SourceKind::Url | SourceKind::DataUri => Ok(reference.to_string()),
            SourceKind::FileUri | SourceKind::LocalPath => {
                let bytes = input::fetch_bytes(reference, self.download_timeout_secs).await?;
                let mime = encode::probe(&bytes)?.mime_type();
                Ok(input::to_data_uri(&bytes, mime))
            }
        }
    }
}

#[async_trait]
impl Upscaler for ReplicateClient {
    async fn upscale(&self, data_uri: &str, scale_factor: u32) -> Result<Vec<String>, ItemError> {
        let output = self
            .predict(
                "upscale",
                &self.upscale_model,
                json!({ "image": data_uri, "scale_factor": scale_factor }),
            )
            .await?;
        Ok(output_urls(&output))
    }
}

#[async_trait]
impl Recognizer for ReplicateClient {
    async fn recognize(&self, reference: &str) -> Result<String, ItemError> {
        let image = self.reachable(reference).await?;
        let output = self
            .predict(
                "ocr",
                &self.ocr_model,
                json!({
                    "image": image,
                    "task_type": self.ocr_task,
                    "resolution_size": self.ocr_resolution,
                }),
            )
            .await?;
        let text = output_text(&output);
        debug!("OCR finished: {} chars", text.chars().count());
        Ok(text)
    }
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("upscale_model", &self.upscale_model)
            .field("ocr_model", &self.ocr_model)
            .finish()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

/// Where to send a prediction for a model reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PredictionRoute {
    path: String,
    version: Option<String>,
}

fn prediction_route(model: &str) -> PredictionRoute {
    match model.split_once(':') {
        Some((_, version)) => PredictionRoute {
            path: "predictions".to_string(),
            version: Some(version.to_string()),
        },
        None => PredictionRoute {
            path: format!("models/{model}/predictions"),
            version: None,
        },
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    capability: &str,
    response: reqwest::Response,
) -> Result<T, ItemError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ItemError::Http {
            capability: capability.to_string(),
            status: status.as_u16(),
            detail,
        });
    }
    response
        .json()
        .await
        .map_err(|e| remote(capability, format!("Failed to parse response: {e}")))
}

fn remote(capability: &str, detail: impl Into<String>) -> ItemError {
    ItemError::Remote {
        capability: capability.to_string(),
        detail: detail.into(),
    }
}

/// File outputs: a single URL or a list of them.
fn output_urls(output: &Value) -> Vec<String> {
    match output {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Text outputs: a string, or streamed chunks to be joined.
fn output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_for_unversioned_model() {
        let route = prediction_route("philz1337x/crystal-upscaler");
        assert_eq!(route.path, "models/philz1337x/crystal-upscaler/predictions");
        assert_eq!(route.version, None);
    }

    #[test]
    fn route_for_pinned_version() {
        let route = prediction_route("lucataco/deepseek-ocr:cb3b47");
        assert_eq!(route.path, "predictions");
        assert_eq!(route.version.as_deref(), Some("cb3b47"));
    }

    #[test]
    fn upscale_outputs() {
        assert_eq!(output_urls(&json!("https://r/x.png")), vec!["https://r/x.png"]);
        assert_eq!(
            output_urls(&json!(["https://r/a.png", "https://r/b.png"])),
            vec!["https://r/a.png", "https://r/b.png"]
        );
        assert!(output_urls(&json!({"weird": true})).is_empty());
    }

    #[test]
    fn ocr_outputs() {
        assert_eq!(output_text(&json!("# Menu")), "# Menu");
        assert_eq!(output_text(&json!(["# Me", "nu"])), "# Menu");
        assert_eq!(output_text(&Value::Null), "");
    }

    #[test]
    fn prediction_wire_format() {
        let p: Prediction = serde_json::from_value(json!({
            "id": "abc",
            "status": "processing",
            "urls": {"get": "https://api.replicate.com/v1/predictions/abc"}
        }))
        .unwrap();
        assert_eq!(p.status, "processing");
        assert!(p.output.is_none());
        assert_eq!(
            p.urls.and_then(|u| u.get).as_deref(),
            Some("https://api.replicate.com/v1/predictions/abc")
        );
    }

    #[test]
    fn debug_redacts_token() {
        let client = ReplicateClient::new("r8_secret", &PipelineConfig::default());
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("r8_secret"));
        assert!(dbg.contains("REDACTED"));
    }

    #[tokio::test]
    async fn urls_and_data_uris_pass_through() {
        let client = ReplicateClient::new("t", &PipelineConfig::default());
        let url = "https://replicate.delivery/out.png";
        assert_eq!(client.reachable(url).await.unwrap(), url);
        let data = "data:image/png;base64,AAAA";
        assert_eq!(client.reachable(data).await.unwrap(), data);
    }
}
