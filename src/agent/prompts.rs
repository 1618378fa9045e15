use handlebars::Handlebars;
use serde_json::json;

use super::{AgentError, SectionRequest};

pub const OUTLINE_SYSTEM: &str = "You are an expert educational content planner. \
You design clear, well structured guides and always answer with JSON that matches the provided schema.";

pub const WRITER_SYSTEM: &str = "You are an educational content writer. \
You write engaging, accurate guide sections in markdown for the stated audience level. \
Answer with the section body only.";

pub const REVIEWER_SYSTEM: &str = "You are an educational content reviewer and editor. \
You check sections for accuracy, clarity and consistency with earlier sections, fix any problems \
and answer with the improved markdown only.";

const OUTLINE_USER: &str = r#"Create a detailed outline for a comprehensive guide on "{{topic}}" for {{audience_level}} level learners.

The outline should include:
1. A compelling title for the guide
2. An introduction to the topic
3. A description of the target audience
4. 4-6 main sections that cover the most important aspects of the topic
5. A conclusion or summary

For each section, provide a clear title and a brief description of what it should cover."#;

const WRITER_USER: &str = r###"Write the section "{{section.title}}" of the guide "{{guide_title}}" about {{topic}}.

Section description: {{section.description}}
Target audience: {{target_audience}} ({{audience_level}} level)
{{#if previous_sections}}
Previously written sections, for context and continuity:
{{#each previous_sections}}
## {{this.[0]}}

{{this.[1]}}

{{/each}}
{{/if}}
Start with "## {{section.title}}" and use markdown formatting: subheadings, lists and code blocks where useful. Include examples."###;

const REVIEWER_USER: &str = r#"Review and improve the following section of the guide "{{guide_title}}" about {{topic}} for {{audience_level}} level learners.

Section description: {{section.description}}
{{#if previous_sections}}
Earlier sections covered: {{#each previous_sections}}{{#if @index}}, {{/if}}"{{this.[0]}}"{{/each}}.
{{/if}}
Draft:

{{draft}}"#;

/// The fixed prompt set, rendered with Handlebars.
pub struct Prompts {
    registry: Handlebars<'static>,
}

impl Prompts {
    pub fn new() -> Result<Self, AgentError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for (name, template) in [
            ("outline", OUTLINE_USER),
            ("writer", WRITER_USER),
            ("reviewer", REVIEWER_USER),
        ] {
            registry
                .register_template_string(name, template)
                .map_err(|e| AgentError::Request(format!("prompt template `{name}`: {e}")))?;
        }
        Ok(Self { registry })
    }

    pub fn outline(&self, topic: &str, audience_level: &str) -> Result<String, AgentError> {
        self.render("outline", &json!({ "topic": topic, "audience_level": audience_level }))
    }

    pub fn writer(&self, request: &SectionRequest) -> Result<String, AgentError> {
        self.render("writer", &json!(request))
    }

    pub fn reviewer(&self, request: &SectionRequest, draft: &str) -> Result<String, AgentError> {
        let mut data = json!(request);
        data["draft"] = json!(draft);
        self.render("reviewer", &data)
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String, AgentError> {
        self.registry
            .render(name, data)
            .map_err(|e| AgentError::Request(format!("rendering prompt `{name}`: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::Section;

    fn request(previous: Vec<(String, String)>) -> SectionRequest {
        SectionRequest {
            guide_title: "Async Rust".into(),
            topic: "tokio".into(),
            audience_level: "beginner".into(),
            target_audience: "Rust newcomers".into(),
            section: Section::new("Tasks", "Spawning & joining <tasks>").unwrap(),
            previous_sections: previous,
        }
    }

    #[test]
    fn outline_prompt_mentions_topic_and_level() {
        let prompts = Prompts::new().unwrap();
        let text = prompts.outline("Rust traits", "advanced").unwrap();
        assert!(text.contains("\"Rust traits\""));
        assert!(text.contains("advanced level learners"));
    }

    #[test]
    fn writer_prompt_includes_previous_sections_unescaped() {
        let prompts = Prompts::new().unwrap();
        let text = prompts
            .writer(&request(vec![("Intro".into(), "Hello & welcome".into())]))
            .unwrap();
        assert!(text.contains("## Intro\n\nHello & welcome"));
        assert!(text.contains("Spawning & joining <tasks>"));
    }

    #[test]
    fn writer_prompt_without_context_skips_block() {
        let prompts = Prompts::new().unwrap();
        let text = prompts.writer(&request(vec![])).unwrap();
        assert!(!text.contains("Previously written sections"));
        assert!(text.ends_with("Start with \"## Tasks\" and use markdown formatting: subheadings, lists and code blocks where useful. Include examples."));
    }

    #[test]
    fn reviewer_prompt_carries_draft() {
        let prompts = Prompts::new().unwrap();
        let text = prompts
            .reviewer(&request(vec![("Intro".into(), "x".into()), ("Setup".into(), "y".into())]), "## Tasks\n\ndraft")
            .unwrap();
        assert!(text.ends_with("## Tasks\n\ndraft"));
        assert!(text.contains("\"Intro\", \"Setup\""));
    }
}
