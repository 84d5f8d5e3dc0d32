//! HTTP analysis gateway for a messages-style vision endpoint.
//!
//! Sends the composite as a base64 PNG image block and reads the first text
//! block of the reply. A body that is not a messages envelope is kept as
//! the raw summary. One request per call, no retries.

use super::prompts::{ANALYSIS_SYSTEM_PROMPT, ANALYSIS_USER_PROMPT};
use super::response::parse_response;
use super::{AnalysisError, AnalysisGateway, AnalysisResult};
use crate::config::AnalysisConfig;
use crate::stitch::CompositeImage;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Build a gateway. A missing key only fails at `analyze` time.
    pub fn new(config: &AnalysisConfig, api_key: Option<String>) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl AnalysisGateway for HttpGateway {
    async fn analyze(&self, composite: &CompositeImage) -> Result<AnalysisResult, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::MissingApiKey)?;

        log::info!("[ANALYSIS] Provider endpoint: {}", self.endpoint);
        log::info!("[ANALYSIS] Model: {}", self.model);

        let body = build_request_body(&self.model, self.max_tokens, composite.png());
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            log::error!("[ANALYSIS] API returned {}: {}", status, text);
            return Err(AnalysisError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        log::info!("[ANALYSIS] API latency: {}ms", start.elapsed().as_millis());

        let reply = serde_json::from_str::<Value>(&text)
            .map_err(|e| AnalysisError::MalformedEnvelope(e.to_string()))
            .and_then(|envelope| extract_reply_text(&envelope).map(str::to_string));

        let result = match reply {
            Ok(reply) => parse_response(&reply),
            Err(e) => {
                // Unreadable bodies are still shown to the user.
                log::warn!("[ANALYSIS] {}, keeping raw body as summary", e);
                parse_response(&text)
            }
        };
        log::info!(
            "[ANALYSIS] Result: summary={} text={} code={}",
            result.summary.is_some(),
            result.text.is_some(),
            result.code.is_some()
        );
        Ok(result)
    }
}

fn map_transport_error(e: reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        log::warn!("[ANALYSIS] Request timed out");
        AnalysisError::Timeout
    } else {
        log::error!("[ANALYSIS] HTTP request failed: {}", e);
        AnalysisError::Transport(e.to_string())
    }
}

/// Request payload: system prompt plus one user turn holding the image.
pub fn build_request_body(model: &str, max_tokens: u32, png: &[u8]) -> Value {
    serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": ANALYSIS_SYSTEM_PROMPT,
        "messages": [
            {
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": STANDARD.encode(png),
                        }
                    },
                    {
                        "type": "text",
                        "text": ANALYSIS_USER_PROMPT,
                    }
                ]
            }
        ]
    })
}

/// First text block of a messages response.
pub fn extract_reply_text(envelope: &Value) -> Result<&str, AnalysisError> {
    envelope["content"]
        .as_array()
        .ok_or_else(|| AnalysisError::MalformedEnvelope("missing content array".to_string()))?
        .iter()
        .filter(|block| block["type"] == "text")
        .find_map(|block| block["text"].as_str())
        .ok_or_else(|| AnalysisError::MalformedEnvelope("no text block in reply".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapConfig;

    #[test]
    fn body_carries_image_and_prompt() {
        let body = build_request_body("some-model", 512, &[1, 2, 3]);
        assert_eq!(body["model"], "some-model");
        assert_eq!(body["max_tokens"], 512);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "AQID");
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn reply_text_is_first_text_block() {
        let envelope = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "{\"summary\":\"x\"}"}
            ]
        });
        assert_eq!(extract_reply_text(&envelope).unwrap(), "{\"summary\":\"x\"}");
    }

    #[test]
    fn reply_without_text_is_malformed() {
        let envelope = serde_json::json!({"content": []});
        assert!(matches!(
            extract_reply_text(&envelope),
            Err(AnalysisError::MalformedEnvelope(_))
        ));
        let envelope = serde_json::json!({"error": "nope"});
        assert!(matches!(
            extract_reply_text(&envelope),
            Err(AnalysisError::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let config = SnapConfig::default();
        let gateway = HttpGateway::new(&config.analysis, Some("   ".to_string())).unwrap();
        assert!(!gateway.has_api_key());

        let composite = CompositeImage::new(vec![0; 4], 1, 1, 1, 0);
        let result = gateway.analyze(&composite).await;
        assert!(matches!(result, Err(AnalysisError::MissingApiKey)));
    }
}
