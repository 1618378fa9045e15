//! The guide creator flow.
//!
//! `begin` seeds the state; the remaining steps ask the
//! [`ContentGenerator`] for an outline and for every section, then compile
//! the markdown guide into the output directory.

pub mod plot;
pub mod state;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    agent::{AgentError, ContentGenerator, SectionRequest},
    guide::{AudienceLevel, GuideOutline, UnknownAudienceLevel},
    logger::FileTelemetry,
};
use plot::FlowStep;
use state::{GuideCreatorState, StateError};

pub const OUTLINE_FILE: &str = "guide_outline.json";
pub const GUIDE_FILE: &str = "complete_guide.md";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error(transparent)]
    InvalidAudienceLevel(#[from] UnknownAudienceLevel),
    #[error("no content generator is configured")]
    GeneratorUnavailable,
    #[error("step `{0}` needs an outline, run create_outline first")]
    NoOutline(&'static str),
    #[error("cannot compile the guide, sections not written yet: {}", .0.join(", "))]
    Incomplete(Vec<String>),
    #[error("content generation failed in `{step}`")]
    Generation {
        step: &'static str,
        #[source]
        source: AgentError,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error("could not write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize the outline")]
    Serialize(#[from] serde_json::Error),
    #[error("could not render the flow plot: {0}")]
    Plot(String),
}

/// What the flow is started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInput {
    pub topic: String,
    pub audience_level: String,
}

impl FlowInput {
    pub fn new(topic: impl Into<String>, audience_level: impl Into<String>) -> Self {
        Self { topic: topic.into(), audience_level: audience_level.into() }
    }
}

/// Result of a full `kickoff`.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub state: GuideCreatorState,
    /// `None` when the flow had nothing to generate.
    pub guide_path: Option<PathBuf>,
}

pub struct GuideCreatorFlow {
    generator: Option<Arc<dyn ContentGenerator>>,
    output_dir: PathBuf,
    state: GuideCreatorState,
    telemetry: FileTelemetry,
}

impl GuideCreatorFlow {
    pub fn new(generator: Option<Arc<dyn ContentGenerator>>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            output_dir: output_dir.into(),
            state: GuideCreatorState::new(),
            telemetry: FileTelemetry::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: FileTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> &GuideCreatorState {
        &self.state
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Entry step. Without input the empty state comes back unchanged.
    pub fn begin(&mut self, input: Option<FlowInput>) -> Result<GuideCreatorState, FlowError> {
        let Some(input) = input else {
            info!("flow started without input");
            return Ok(self.state.clone());
        };
        let topic = input.topic.trim();
        if topic.is_empty() {
            return Err(FlowError::EmptyTopic);
        }
        let level: AudienceLevel = input.audience_level.parse()?;

        self.state.topic = topic.to_string();
        self.state.audience_level = level.to_string();
        info!(topic = %self.state.topic, audience_level = %self.state.audience_level, "flow started");
        Ok(self.state.clone())
    }

    fn generator(&self) -> Result<Arc<dyn ContentGenerator>, FlowError> {
        self.generator.clone().ok_or(FlowError::GeneratorUnavailable)
    }

    /// Ask the generator for an outline and save it as `guide_outline.json`.
    pub async fn create_outline(&mut self) -> Result<GuideOutline, FlowError> {
        let telemetry = self.telemetry.clone();
        telemetry
            .instrument_step(FlowStep::CreateOutline.name(), self.create_outline_step())
            .await
    }

    async fn create_outline_step(&mut self) -> Result<GuideOutline, FlowError> {
        let generator = self.generator()?;
        if self.state.topic.is_empty() {
            return Err(FlowError::EmptyTopic);
        }
        info!(generator = generator.name(), topic = %self.state.topic, "creating guide outline");

        let outline = generator
            .generate_outline(&self.state.topic, &self.state.audience_level)
            .await
            .map_err(|source| FlowError::Generation { step: FlowStep::CreateOutline.name(), source })?;
        info!(title = outline.title(), sections = outline.sections().len(), "outline created");

        let json = serde_json::to_string_pretty(&outline)?;
        self.write_output(OUTLINE_FILE, json).await?;
        self.state.set_outline(outline.clone());
        Ok(outline)
    }

    /// Write every section that has no content yet, in outline order.
    pub async fn write_sections(&mut self) -> Result<(), FlowError> {
        let telemetry = self.telemetry.clone();
        telemetry
            .instrument_step(FlowStep::WriteSections.name(), self.write_sections_step())
            .await
    }

    async fn write_sections_step(&mut self) -> Result<(), FlowError> {
        let generator = self.generator()?;
        let outline = self
            .state
            .outline()
            .cloned()
            .ok_or(FlowError::NoOutline(FlowStep::WriteSections.name()))?;

        for section in outline.sections() {
            if self.state.sections_content().contains_key(section.title()) {
                continue;
            }
            let request = SectionRequest {
                guide_title: outline.title().to_string(),
                topic: self.state.topic.clone(),
                audience_level: self.state.audience_level.clone(),
                target_audience: outline.target_audience().to_string(),
                section: section.clone(),
                previous_sections: self
                    .state
                    .ordered_sections()
                    .into_iter()
                    .map(|(s, content)| (s.title().to_string(), content.to_string()))
                    .collect(),
            };
            info!(section = section.title(), "writing section");
            let content = generator
                .write_section(&request)
                .await
                .map_err(|source| FlowError::Generation { step: FlowStep::WriteSections.name(), source })?;
            self.state.record_section(section.title(), content)?;
        }
        Ok(())
    }

    /// Assemble `complete_guide.md` and return its path.
    pub async fn compile_guide(&mut self) -> Result<PathBuf, FlowError> {
        let telemetry = self.telemetry.clone();
        telemetry
            .instrument_step(FlowStep::CompileGuide.name(), self.compile_guide_step())
            .await
    }

    async fn compile_guide_step(&mut self) -> Result<PathBuf, FlowError> {
        let guide = render_guide(&self.state)?;
        let path = self.write_output(GUIDE_FILE, guide).await?;
        info!(path = %path.display(), "guide compiled");
        Ok(path)
    }

    /// Run every step. Without input only `begin` runs.
    pub async fn kickoff(&mut self, input: Option<FlowInput>) -> Result<FlowOutcome, FlowError> {
        let has_input = input.is_some();
        self.begin(input)?;
        if !has_input {
            warn!("no topic given, nothing to generate");
            return Ok(FlowOutcome { state: self.state.clone(), guide_path: None });
        }
        self.generator()?;

        self.create_outline().await?;
        self.write_sections().await?;
        let path = self.compile_guide().await?;
        Ok(FlowOutcome { state: self.state.clone(), guide_path: Some(path) })
    }

    /// Write the step graph as HTML.
    pub async fn plot(&self, path: impl AsRef<Path>) -> Result<PathBuf, FlowError> {
        let path = path.as_ref().to_path_buf();
        let html = plot::render_html("GuideCreatorFlow").map_err(|e| FlowError::Plot(e.to_string()))?;
        write_file(&path, html).await?;
        Ok(path)
    }

    async fn write_output(&self, name: &str, contents: String) -> Result<PathBuf, FlowError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| FlowError::Io { path: self.output_dir.clone(), source })?;
        let path = self.output_dir.join(name);
        write_file(&path, contents).await?;
        Ok(path)
    }
}

async fn write_file(path: &Path, contents: String) -> Result<(), FlowError> {
    fs::write(path, contents)
        .await
        .map_err(|source| FlowError::Io { path: path.to_path_buf(), source })
}

/// The markdown guide: title, introduction, each section body, conclusion.
pub fn render_guide(state: &GuideCreatorState) -> Result<String, FlowError> {
    let outline = state.outline().ok_or(FlowError::NoOutline(FlowStep::CompileGuide.name()))?;
    let missing = state.missing_sections();
    if !missing.is_empty() {
        return Err(FlowError::Incomplete(missing.iter().map(|s| s.title().to_string()).collect()));
    }

    let mut guide = format!("# {}\n\n## Introduction\n\n{}\n\n", outline.title(), outline.introduction());
    for (_, content) in state.ordered_sections() {
        guide.push_str(content);
        guide.push_str("\n\n");
    }
    guide.push_str(&format!("## Conclusion\n\n{}\n\n", outline.conclusion()));
    Ok(guide)
}
