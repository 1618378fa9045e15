//! Content generation behind a single trait.
//!
//! The flow only talks to [`ContentGenerator`]. Concrete generators call an
//! LLM (OpenAI or a local Ollama) and tests plug in scripted ones.

pub mod manager;
pub mod ollama;
pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::guide::{GuideOutline, Section, ValidationError};

pub use manager::build_generator;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(String),
    #[error("unknown LLM provider `{0}` (expected openai or ollama)")]
    UnknownProvider(String),
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM response had no content")]
    EmptyResponse,
    #[error("LLM returned an invalid outline: {0}")]
    InvalidOutline(#[from] ValidationError),
}

/// Everything a generator needs to write one section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionRequest {
    pub guide_title: String,
    pub topic: String,
    pub audience_level: String,
    pub target_audience: String,
    pub section: Section,
    /// Sections written so far, as `(title, content)` in outline order.
    pub previous_sections: Vec<(String, String)>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_outline(&self, topic: &str, audience_level: &str) -> Result<GuideOutline, AgentError>;

    /// Returns the markdown body of the requested section.
    async fn write_section(&self, request: &SectionRequest) -> Result<String, AgentError>;
}

/// Flatten OpenAI-style content parts into one string.
pub(crate) fn content_to_string(content: serde_json::Value) -> Option<String> {
    use serde_json::Value;
    let text = match content {
        Value::String(s) => s,
        Value::Array(parts) => parts
            .into_iter()
            .filter_map(|p| match p {
                Value::Object(mut obj) => obj.remove("text"),
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            })
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => return None,
        other => other.to_string(),
    };
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_parts_are_joined() {
        let parts = json!([{"type": "text", "text": "a"}, "b", 3]);
        assert_eq!(content_to_string(parts).as_deref(), Some("a\nb"));
        assert_eq!(content_to_string(json!("  ")), None);
        assert_eq!(content_to_string(json!(null)), None);
    }
}
