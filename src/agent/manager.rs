use std::sync::Arc;

use tracing::info;

use super::{AgentError, ContentGenerator, ollama::OllamaGenerator, openai::OpenAiGenerator};
use crate::config::ConfigManager;

pub const GUIDE_LLM_PROVIDER: &str = "GUIDE_LLM_PROVIDER";
pub const GUIDE_REVIEW_SECTIONS: &str = "GUIDE_REVIEW_SECTIONS";
pub const OPENAI_KEY: &str = "OPENAI_KEY";
pub const OPENAI_URL: &str = "OPENAI_URL";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const OLLAMA_URL: &str = "OLLAMA_URL";
pub const OLLAMA_MODEL: &str = "OLLAMA_MODEL";

/// Built-in generators, selected by `GUIDE_LLM_PROVIDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl Provider {
    pub fn parse(raw: Option<&str>) -> Result<Self, AgentError> {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("openai") => Ok(Provider::OpenAi),
            Some("ollama") => Ok(Provider::Ollama),
            Some(other) => Err(AgentError::UnknownProvider(other.to_string())),
        }
    }
}

/// Reviewer pass is on unless explicitly switched off.
fn review_enabled(raw: Option<String>) -> bool {
    !matches!(
        raw.map(|s| s.trim().to_lowercase()).as_deref(),
        Some("false") | Some("0") | Some("no") | Some("off")
    )
}

/// Build the configured content generator.
pub async fn build_generator(config: &ConfigManager) -> Result<Arc<dyn ContentGenerator>, AgentError> {
    let provider = Provider::parse(config.get_non_empty(GUIDE_LLM_PROVIDER).await.as_deref())?;
    let review = review_enabled(config.get_non_empty(GUIDE_REVIEW_SECTIONS).await);

    let generator: Arc<dyn ContentGenerator> = match provider {
        Provider::OpenAi => {
            let key = config
                .get_non_empty(OPENAI_KEY)
                .await
                .ok_or_else(|| AgentError::MissingCredentials(OPENAI_KEY.to_string()))?;
            let generator = OpenAiGenerator::new(
                key,
                config.get_non_empty(OPENAI_URL).await,
                config.get_non_empty(OPENAI_MODEL).await,
                review,
            )?;
            info!(model = generator.model(), review, "using OpenAI content generator");
            Arc::new(generator)
        }
        Provider::Ollama => {
            let generator = OllamaGenerator::new(
                config.get_non_empty(OLLAMA_URL).await,
                config.get_non_empty(OLLAMA_MODEL).await,
                review,
            )?;
            info!(model = generator.model(), url = %generator.url(), review, "using Ollama content generator");
            Arc::new(generator)
        }
    };
    Ok(generator)
}
