use std::collections::HashMap;

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

use crate::guide::{GuideOutline, Section};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("no outline has been created yet")]
    NoOutline,
    #[error("`{0}` is not a section of the current outline")]
    UnknownSection(String),
    #[error("section `{0}` has already been written")]
    AlreadyWritten(String),
}

/// Everything the guide creator flow knows so far.
///
/// Starts empty and is filled in one step at a time. Keys of
/// `sections_content` are always titles of the current outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct GuideCreatorState {
    pub topic: String,
    pub audience_level: String,
    outline: Option<GuideOutline>,
    sections_content: HashMap<String, String>,
}

impl GuideCreatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outline(&self) -> Option<&GuideOutline> {
        self.outline.as_ref()
    }

    pub fn sections_content(&self) -> &HashMap<String, String> {
        &self.sections_content
    }

    /// Replace the outline. Content written for the previous outline is dropped.
    pub fn set_outline(&mut self, outline: GuideOutline) {
        self.outline = Some(outline);
        self.sections_content.clear();
    }

    pub fn record_section(&mut self, title: &str, content: impl Into<String>) -> Result<(), StateError> {
        let outline = self.outline.as_ref().ok_or(StateError::NoOutline)?;
        if !outline.has_section(title) {
            return Err(StateError::UnknownSection(title.to_string()));
        }
        if self.sections_content.contains_key(title) {
            return Err(StateError::AlreadyWritten(title.to_string()));
        }
        self.sections_content.insert(title.to_string(), content.into());
        Ok(())
    }

    /// Outline titles that have no content yet, in outline order.
    pub fn missing_sections(&self) -> Vec<&Section> {
        match &self.outline {
            Some(outline) => outline
                .sections()
                .iter()
                .filter(|s| !self.sections_content.contains_key(s.title()))
                .collect(),
            None => vec![],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outline.is_some() && self.missing_sections().is_empty()
    }

    /// Written sections paired with their content, in outline order.
    pub fn ordered_sections(&self) -> Vec<(&Section, &str)> {
        match &self.outline {
            Some(outline) => outline
                .sections()
                .iter()
                .filter_map(|s| self.sections_content.get(s.title()).map(|c| (s, c.as_str())))
                .collect(),
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn outline() -> GuideOutline {
        GuideOutline::new(
            "Guide",
            "Intro",
            "Everyone",
            vec![Section::new("One", "first").unwrap(), Section::new("Two", "second").unwrap()],
            "Done",
        )
        .unwrap()
    }

    #[test]
    fn new_state_is_empty() {
        let state = GuideCreatorState::new();
        assert!(state.topic.is_empty());
        assert!(state.audience_level.is_empty());
        assert!(state.outline().is_none());
        assert!(state.sections_content().is_empty());
        assert!(!state.is_complete());
    }

    #[test]
    fn record_requires_outline() {
        let mut state = GuideCreatorState::new();
        assert_eq!(state.record_section("One", "x"), Err(StateError::NoOutline));
    }

    #[test]
    fn record_rejects_unknown_and_duplicate_titles() {
        let mut state = GuideCreatorState::new();
        state.set_outline(outline());
        assert_eq!(state.record_section("Three", "x"), Err(StateError::UnknownSection("Three".into())));
        state.record_section("One", "body one").unwrap();
        assert_eq!(state.record_section("One", "again"), Err(StateError::AlreadyWritten("One".into())));
        assert_eq!(state.sections_content()["One"], "body one");
    }

    #[test]
    fn tracks_missing_and_ordered_sections() {
        let mut state = GuideCreatorState::new();
        state.set_outline(outline());
        state.record_section("Two", "body two").unwrap();
        let missing: Vec<_> = state.missing_sections().iter().map(|s| s.title()).collect();
        assert_eq!(missing, vec!["One"]);
        assert!(!state.is_complete());

        state.record_section("One", "body one").unwrap();
        assert!(state.is_complete());
        let ordered: Vec<_> = state.ordered_sections().iter().map(|(s, c)| (s.title(), *c)).collect();
        assert_eq!(ordered, vec![("One", "body one"), ("Two", "body two")]);
    }

    #[test]
    fn new_outline_clears_stale_content() {
        let mut state = GuideCreatorState::new();
        state.set_outline(outline());
        state.record_section("One", "body").unwrap();
        state.set_outline(outline());
        assert!(state.sections_content().is_empty());
    }

    proptest! {
        #[test]
        fn recorded_keys_always_match_outline_titles_once(
            titles in prop::collection::btree_set("[A-Z][a-z]{0,8}", 1..6),
            ops in prop::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 0..24),
        ) {
            let titles: Vec<String> = titles.into_iter().collect();
            let sections = titles.iter().map(|t| Section::new(t.clone(), "about it").unwrap()).collect();
            let mut state = GuideCreatorState::new();
            state.set_outline(GuideOutline::new("Guide", "Intro", "Everyone", sections, "Done").unwrap());

            let mut written: HashSet<String> = HashSet::new();
            for (pick, unknown) in ops {
                let title = if unknown {
                    format!("unknown {}", pick.index(100))
                } else {
                    titles[pick.index(titles.len())].clone()
                };
                let result = state.record_section(&title, format!("body of {title}"));
                if unknown {
                    prop_assert_eq!(result, Err(StateError::UnknownSection(title)));
                } else if written.insert(title.clone()) {
                    prop_assert_eq!(result, Ok(()));
                } else {
                    prop_assert_eq!(result, Err(StateError::AlreadyWritten(title)));
                }
            }

            let keys: HashSet<String> = state.sections_content().keys().cloned().collect();
            prop_assert_eq!(&keys, &written);
            prop_assert!(keys.iter().all(|k| titles.contains(k)));
            prop_assert_eq!(state.missing_sections().len() + keys.len(), titles.len());
            prop_assert_eq!(state.is_complete(), keys.len() == titles.len());

            let ordered: Vec<&str> = state.ordered_sections().iter().map(|(s, _)| s.title()).collect();
            let expected: Vec<&str> = titles.iter().map(String::as_str).filter(|t| keys.contains(*t)).collect();
            prop_assert_eq!(ordered, expected);
        }
    }
}
