use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::{
        chat::{ChatMessage, request::ChatMessageRequest},
        parameters::{FormatType, JsonStructure},
    },
};
use tracing::{debug, error};
use url::Url;

use super::{AgentError, ContentGenerator, SectionRequest, prompts::{self, Prompts}};
use crate::guide::GuideOutline;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// `OllamaGenerator` talks to a local Ollama server through `ollama_rs`.
/// The outline schema is passed as the structured `format`.
pub struct OllamaGenerator {
    client: Ollama,
    url: Url,
    model: String,
    review: bool,
    prompts: Prompts,
}

impl OllamaGenerator {
    pub fn new(url: Option<String>, model: Option<String>, review: bool) -> Result<Self, AgentError> {
        let raw = url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let url = Url::parse(&raw).map_err(|e| AgentError::Request(format!("invalid OLLAMA_URL `{raw}`: {e}")))?;
        Ok(Self {
            client: Ollama::from_url(url.clone()),
            url,
            model: model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            review,
            prompts: Prompts::new()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system: &str, user: String, format: Option<FormatType>) -> Result<String, AgentError> {
        let history = vec![ChatMessage::system(system.to_string()), ChatMessage::user(user)];
        let mut req = ChatMessageRequest::new(self.model.clone(), history);
        if let Some(format) = format {
            req = req.format(format);
        }

        debug!(url = %self.url, model = %self.model, "ollama request");
        let resp = self.client.send_chat_messages(req).await.map_err(|e| {
            error!("LLM gave error: {:?}", e);
            AgentError::Request(format!("Ollama request failed: {e}"))
        })?;

        let content = resp.message.content;
        if content.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl ContentGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    #[tracing::instrument(name = "ollama_generate_outline", skip(self))]
    async fn generate_outline(&self, topic: &str, audience_level: &str) -> Result<GuideOutline, AgentError> {
        let schema: schemars::Schema = schemars::schema_for!(GuideOutline);
        let format = FormatType::StructuredJson(Box::new(JsonStructure::new_for_schema(schema)));
        let content = self
            .chat(prompts::OUTLINE_SYSTEM, self.prompts.outline(topic, audience_level)?, Some(format))
            .await?;
        Ok(GuideOutline::from_json(&content)?)
    }

    #[tracing::instrument(name = "ollama_write_section", skip(self, request), fields(section = request.section.title()))]
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
