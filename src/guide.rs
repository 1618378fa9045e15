//! Structured guide outline returned by the content generator.
//!
//! Every way of building a [`GuideOutline`] or [`Section`] goes through the
//! same validation, so a value of either type is always well formed: all
//! text fields are non-blank, there is at least one section and section
//! titles are unique (they key the written content).

use std::{collections::HashSet, fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{0}` must not be empty")]
    EmptyField(String),
    #[error("section {index} has a missing or empty `{field}`")]
    InvalidSection { index: usize, field: String },
    #[error("a guide outline needs at least one section")]
    NoSections,
    #[error("section title `{0}` appears more than once")]
    DuplicateSectionTitle(String),
    #[error("malformed outline: {0}")]
    Malformed(String),
}

/// One section of a guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Section {
    /// Title of the section
    title: String,
    /// Brief description of what the section should cover
    description: String,
}

impl Section {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Result<Self, ValidationError> {
        let title = title.into();
        let description = description.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title".into()));
        }
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyField("description".into()));
        }
        Ok(Self { title, description })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn from_entry(index: usize, entry: &Value) -> Result<Self, ValidationError> {
        let obj = entry
            .as_object()
            .ok_or_else(|| ValidationError::Malformed(format!("sections[{index}] must be an object")))?;
        let field = |name: &str| -> Result<String, ValidationError> {
            match obj.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(Value::String(_)) | Some(Value::Null) | None => Err(ValidationError::InvalidSection {
                    index,
                    field: name.to_string(),
                }),
                Some(_) => Err(ValidationError::Malformed(format!(
                    "sections[{index}].{name} must be a string"
                ))),
            }
        };
        Ok(Self { title: field("title")?, description: field("description")? })
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Section::from_entry(0, &value).map_err(serde::de::Error::custom)
    }
}

/// A complete guide outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct GuideOutline {
    /// Title of the guide
    title: String,
    /// Introduction to the topic
    introduction: String,
    /// Description of the target audience
    target_audience: String,
    /// List of sections in the guide
    sections: Vec<Section>,
    /// Conclusion or summary of the guide
    conclusion: String,
}

impl GuideOutline {
    pub fn new(
        title: impl Into<String>,
        introduction: impl Into<String>,
        target_audience: impl Into<String>,
        sections: Vec<Section>,
        conclusion: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let outline = Self {
            title: title.into(),
            introduction: introduction.into(),
            target_audience: target_audience.into(),
            sections,
            conclusion: conclusion.into(),
        };
        for (name, value) in [
            ("title", &outline.title),
            ("introduction", &outline.introduction),
            ("target_audience", &outline.target_audience),
            ("conclusion", &outline.conclusion),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField(name.into()));
            }
        }
        check_sections(&outline.sections)?;
        Ok(outline)
    }

    /// Validate an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(obj) = value else {
            return Err(ValidationError::Malformed("expected a JSON object".into()));
        };
        let title = required_string(&obj, "title")?;
        let introduction = required_string(&obj, "introduction")?;
        let target_audience = required_string(&obj, "target_audience")?;
        let sections = match obj.get("sections") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("sections".into())),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| Section::from_entry(index, entry))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ValidationError::Malformed("`sections` must be a list".into())),
        };
        check_sections(&sections)?;
        let conclusion = required_string(&obj, "conclusion")?;

        Ok(Self { title, introduction, target_audience, sections, conclusion })
    }

    /// Parse and validate JSON text, e.g. an LLM reply.
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn introduction(&self) -> &str {
        &self.introduction
    }

    pub fn target_audience(&self) -> &str {
        &self.target_audience
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn conclusion(&self) -> &str {
        &self.conclusion
    }

    pub fn has_section(&self, title: &str) -> bool {
        self.sections.iter().any(|s| s.title == title)
    }
}

impl<'de> Deserialize<'de> for GuideOutline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        GuideOutline::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn required_string(obj: &Map<String, Value>, name: &str) -> Result<String, ValidationError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(name.into())),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::EmptyField(name.into())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::Malformed(format!("`{name}` must be a string"))),
    }
}

fn check_sections(sections: &[Section]) -> Result<(), ValidationError> {
    if sections.is_empty() {
        return Err(ValidationError::NoSections);
    }
    let mut seen = HashSet::new();
    for section in sections {
        if !seen.insert(section.title.as_str()) {
            return Err(ValidationError::DuplicateSectionTitle(section.title.clone()));
        }
    }
    Ok(())
}

/// Reader level the guide is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown audience level `{0}` (expected beginner, intermediate or advanced)")]
pub struct UnknownAudienceLevel(pub String);

impl AudienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceLevel::Beginner => "beginner",
            AudienceLevel::Intermediate => "intermediate",
            AudienceLevel::Advanced => "advanced",
        }
    }
}

impl FromStr for AudienceLevel {
    type Err = UnknownAudienceLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(AudienceLevel::Beginner),
            "intermediate" => Ok(AudienceLevel::Intermediate),
            "advanced" => Ok(AudienceLevel::Advanced),
            _ => Err(UnknownAudienceLevel(s.to_string())),
        }
    }
}

impl fmt::Display for AudienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn outline_json() -> Value {
        json!({
            "title": "Rust for Beginners",
            "introduction": "Why Rust matters.",
            "target_audience": "New programmers",
            "sections": [
                {"title": "Setup", "description": "Install the toolchain"},
                {"title": "Ownership", "description": "Moves and borrows"}
            ],
            "conclusion": "Keep practicing."
        })
    }

    #[test]
    fn valid_outline_roundtrips_through_json() {
        let outline = GuideOutline::from_value(outline_json()).unwrap();
        assert_eq!(outline.sections().len(), 2);
        assert_eq!(outline.sections()[1].title(), "Ownership");

        let text = serde_json::to_string(&outline).unwrap();
        let back: GuideOutline = serde_json::from_str(&text).unwrap();
        assert_eq!(back, outline);
        assert_eq!(serde_json::to_value(&back).unwrap(), outline_json());
    }

    #[test]
    fn missing_title_is_rejected() {
        let mut value = outline_json();
        value.as_object_mut().unwrap().remove("title");
        assert_eq!(
            GuideOutline::from_value(value).unwrap_err(),
            ValidationError::MissingField("title".into())
        );
    }

    #[test]
    fn blank_conclusion_is_rejected() {
        let mut value = outline_json();
        value["conclusion"] = json!("   ");
        assert_eq!(
            GuideOutline::from_value(value).unwrap_err(),
            ValidationError::EmptyField("conclusion".into())
        );
    }

    #[test]
    fn empty_sections_are_rejected() {
        let mut value = outline_json();
        value["sections"] = json!([]);
        assert_eq!(GuideOutline::from_value(value).unwrap_err(), ValidationError::NoSections);
    }

    #[test]
    fn section_without_description_reports_its_index() {
        let mut value = outline_json();
        value["sections"][1] = json!({"title": "Ownership"});
        assert_eq!(
            GuideOutline::from_value(value).unwrap_err(),
            ValidationError::InvalidSection { index: 1, field: "description".into() }
        );
    }

    #[test]
    fn duplicate_titles_are_rejected() {
        let mut value = outline_json();
        value["sections"][1]["title"] = json!("Setup");
        assert_eq!(
            GuideOutline::from_value(value).unwrap_err(),
            ValidationError::DuplicateSectionTitle("Setup".into())
        );
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        assert!(matches!(GuideOutline::from_json("[1,2]"), Err(ValidationError::Malformed(_))));
        assert!(matches!(GuideOutline::from_json("not json"), Err(ValidationError::Malformed(_))));
        let mut value = outline_json();
        value["sections"] = json!("Setup");
        assert!(matches!(GuideOutline::from_value(value), Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn serde_deserialize_validates_too() {
        let err = serde_json::from_value::<GuideOutline>(json!({"title": "x"})).unwrap_err();
        assert!(err.to_string().contains("introduction"));
        assert!(serde_json::from_value::<Section>(json!({"title": "", "description": "d"})).is_err());
    }

    #[test]
    fn constructor_applies_same_rules() {
        let setup = Section::new("Setup", "Install").unwrap();
        assert_eq!(Section::new(" ", "x").unwrap_err(), ValidationError::EmptyField("title".into()));
        assert_eq!(
            GuideOutline::new("T", "I", "A", vec![], "C").unwrap_err(),
            ValidationError::NoSections
        );
        assert_eq!(
            GuideOutline::new("T", "", "A", vec![setup.clone()], "C").unwrap_err(),
            ValidationError::EmptyField("introduction".into())
        );
        let outline = GuideOutline::new("T", "I", "A", vec![setup], "C").unwrap();
        assert!(outline.has_section("Setup"));
        assert!(!outline.has_section("Other"));
    }

    #[test]
    fn audience_level_parses_case_insensitively() {
        assert_eq!("Beginner".parse::<AudienceLevel>().unwrap(), AudienceLevel::Beginner);
        assert_eq!(" ADVANCED ".parse::<AudienceLevel>().unwrap(), AudienceLevel::Advanced);
        assert_eq!(AudienceLevel::Intermediate.to_string(), "intermediate");
        assert!("expert".parse::<AudienceLevel>().is_err());
    }

    fn text() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 .,]{0,24}"
    }

    /// Outlines with one to six sections and unique titles.
    fn outline_strategy() -> impl Strategy<Value = GuideOutline> {
        (text(), text(), text(), prop::collection::btree_map(text(), text(), 1..6), text()).prop_map(
            |(title, introduction, audience, sections, conclusion)| {
                let sections = sections
                    .into_iter()
                    .map(|(t, d)| Section::new(t, d).unwrap())
                    .collect();
                GuideOutline::new(title, introduction, audience, sections, conclusion).unwrap()
            },
        )
    }

    proptest! {
        #[test]
        fn any_valid_outline_roundtrips(outline in outline_strategy()) {
            let text = serde_json::to_string(&outline).unwrap();
            prop_assert_eq!(&GuideOutline::from_json(&text).unwrap(), &outline);
            let back: GuideOutline = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(back, outline);
        }

        #[test]
        fn any_missing_top_level_field_is_reported(
            outline in outline_strategy(),
            field in prop::sample::select(vec!["title", "introduction", "target_audience", "sections", "conclusion"]),
        ) {
            let mut value = serde_json::to_value(&outline).unwrap();
            value.as_object_mut().unwrap().remove(field);
            prop_assert_eq!(
                GuideOutline::from_value(value.clone()).unwrap_err(),
                ValidationError::MissingField(field.to_string())
            );
            prop_assert!(serde_json::from_value::<GuideOutline>(value).is_err());
        }

        #[test]
        fn any_missing_section_field_is_reported(
            outline in outline_strategy(),
            pick in any::<prop::sample::Index>(),
            field in prop::sample::select(vec!["title", "description"]),
        ) {
            let index = pick.index(outline.sections().len());
            let mut value = serde_json::to_value(&outline).unwrap();
            value["sections"][index].as_object_mut().unwrap().remove(field);
            prop_assert_eq!(
                GuideOutline::from_value(value).unwrap_err(),
                ValidationError::InvalidSection { index, field: field.to_string() }
            );
        }
    }
}
