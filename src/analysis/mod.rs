//! Analysis gateway: the contract for handing a composite to an
//! external model and getting structured text back.
//!
//! The core only calls `AnalysisGateway::analyze` once per request. Retries
//! and user-facing retry affordances belong to the caller.

mod http;
mod prompts;
mod response;

pub use http::{build_request_body, extract_reply_text, HttpGateway};
pub use response::{parse_response, strip_code_fences};

use crate::stitch::CompositeImage;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::future::Future;

/// What the gateway derived from a composite. Every field is optional.
///
/// Deserializing goes through [`AnalysisResult::from_json`], so it accepts
/// exactly what reply parsing accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<'de> Deserialize<'de> for AnalysisResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("analysis result must be a JSON object"))
    }
}

impl AnalysisResult {
    /// Lenient read of a reply object.
    ///
    /// Non-string values are ignored, and `description` fills in for a
    /// missing `summary`. Returns `None` if `value` is not an object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            summary: field("summary").or_else(|| field("description")),
            text: field("text"),
            code: field("code"),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.text.is_none() && self.code.is_none()
    }
}

/// External service that analyzes a composite image.
pub trait AnalysisGateway {
    fn analyze(
        &self,
        composite: &CompositeImage,
    ) -> impl Future<Output = Result<AnalysisResult, AnalysisError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No analysis API key configured; set ANTHROPIC_API_KEY or store one in the keyring")]
    MissingApiKey,

    #[error("Analysis request failed: {0}")]
    Transport(String),

    #[error("Analysis request timed out")]
    Timeout,

    #[error("Analysis service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Unexpected analysis response: {0}")]
    MalformedEnvelope(String),
}

impl AnalysisError {
    /// Whether trying the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Transport(_) | AnalysisError::Timeout => true,
            AnalysisError::Status { code, .. } => *code == 429 || *code >= 500,
            AnalysisError::MissingApiKey | AnalysisError::MalformedEnvelope(_) => false,
        }
    }
}
