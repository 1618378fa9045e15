use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::{AgentError, ContentGenerator, SectionRequest, content_to_string, prompts::{self, Prompts}};
use crate::guide::GuideOutline;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// `OpenAiGenerator` calls the OpenAI Chat Completions API.
///
/// Outlines are requested with a JSON-schema `response_format` so the reply
/// parses straight into a [`GuideOutline`]. Sections get a writer pass and,
/// unless `review` is off, a reviewer pass over the draft.
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    review: bool,
    prompts: Prompts,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, model: Option<String>, review: bool) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            review,
            prompts: Prompts::new()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn reviews(&self) -> bool {
        self.review
    }

    async fn chat(&self, system: &str, user: String, response_format: Option<Value>) -> Result<String, AgentError> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if let Some(format) = response_format {
            body["response_format"] = format;
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "openai request");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Request(format!("OpenAI request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".into());
            error!("OpenAI error: {}", text);
            return Err(AgentError::Api { status: status.as_u16(), body: text });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| AgentError::Request(format!("Invalid OpenAI response: {e}")))?;

        json.pointer("/choices/0/message/content")
            .cloned()
            .and_then(content_to_string)
            .ok_or(AgentError::EmptyResponse)
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    #[tracing::instrument(name = "openai_generate_outline", skip(self))]
    async fn generate_outline(&self, topic: &str, audience_level: &str) -> Result<GuideOutline, AgentError> {
        let schema = schemars::schema_for!(GuideOutline);
        let schema_json = serde_json::to_value(schema).unwrap_or(json!({"type": "object"}));
        let format = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "guide_outline",
                "schema": schema_json
            }
        });

        let content = self
            .chat(prompts::OUTLINE_SYSTEM, self.prompts.outline(topic, audience_level)?, Some(format))
            .await?;
        Ok(GuideOutline::from_json(&content)?)
    }

    #[tracing::instrument(name = "openai_write_section", skip(self, request), fields(section = request.section.title()))]
    async fn write_section(&self, request: &SectionRequest) -> Result<String, AgentError> {
        let draft = self
            .chat(prompts::WRITER_SYSTEM, self.prompts.writer(request)?, None)
            .await?;
        if !self.review {
            return Ok(draft);
        }
        self.chat(prompts::REVIEWER_SYSTEM, self.prompts.reviewer(request, &draft)?, None)
            .await
    }
}
