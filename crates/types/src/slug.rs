//! Hierarchical identifiers for stories, scenarios, and theses.
//!
//! A slug is a value type: two slugs are equal when their kind and every
//! component match. Empty components act as wildcards and render as `*`,
//! which lets callers express "any scenario of story X" when filtering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rendering of an empty slug component.
pub const WILDCARD: &str = "*";

/// Depth of a slug in the story → scenario → thesis hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugKind {
    /// Zero value; never attached to a real tree node.
    #[default]
    NoSlug,
    Story,
    Scenario,
    Thesis,
}

/// Identifier of a node in the specification tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slug {
    kind: SlugKind,
    story: String,
    scenario: String,
    thesis: String,
}

impl Slug {
    /// Creates a story slug.
    pub fn new_story(story: impl Into<String>) -> Self {
        Self {
            kind: SlugKind::Story,
            story: story.into(),
            ..Self::default()
        }
    }

    /// Creates a scenario slug nested under `story`.
    pub fn new_scenario(story: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            kind: SlugKind::Scenario,
            story: story.into(),
            scenario: scenario.into(),
            thesis: String::new(),
        }
    }

    /// Creates a thesis slug nested under `story.scenario`.
    pub fn new_thesis(story: impl Into<String>, scenario: impl Into<String>, thesis: impl Into<String>) -> Self {
        Self {
            kind: SlugKind::Thesis,
            story: story.into(),
            scenario: scenario.into(),
            thesis: thesis.into(),
        }
    }

    pub fn kind(&self) -> SlugKind {
        self.kind
    }

    pub fn story(&self) -> &str {
        &self.story
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn thesis(&self) -> &str {
        &self.thesis
    }

    /// Returns true for the zero value.
    pub fn is_zero(&self) -> bool {
        self.kind == SlugKind::NoSlug
    }

    /// Parent story slug. Returns the zero slug for [`SlugKind::NoSlug`].
    pub fn story_slug(&self) -> Slug {
        match self.kind {
            SlugKind::NoSlug => Slug::default(),
            _ => Slug::new_story(self.story.clone()),
        }
    }

    /// Parent scenario slug of a thesis, or the slug itself for a scenario.
    /// Story and zero slugs have no scenario and yield the zero slug.
    pub fn scenario_slug(&self) -> Slug {
        match self.kind {
            SlugKind::Scenario | SlugKind::Thesis => Slug::new_scenario(self.story.clone(), self.scenario.clone()),
            SlugKind::Story | SlugKind::NoSlug => Slug::default(),
        }
    }

    /// Components up to the slug's depth, in hierarchy order.
    pub fn components(&self) -> Vec<&str> {
        match self.kind {
            SlugKind::NoSlug => Vec::new(),
            SlugKind::Story => vec![&self.story],
            SlugKind::Scenario => vec![&self.story, &self.scenario],
            SlugKind::Thesis => vec![&self.story, &self.scenario, &self.thesis],
        }
    }

    /// Wildcard-aware comparison: kinds must match and each component must be
    /// equal unless either side leaves it empty.
    pub fn matches(&self, other: &Slug) -> bool {
        if self.kind != other.kind {
            return false;
        }
        self.components()
            .iter()
            .zip(other.components())
            .all(|(left, right)| left.is_empty() || right.is_empty() || *left == right)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self
            .components()
            .into_iter()
            .map(|component| if component.is_empty() { WILDCARD } else { component })
            .collect();
        f.write_str(&rendered.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_components() {
        assert_eq!(Slug::new_story("auth").to_string(), "auth");
        assert_eq!(Slug::new_scenario("auth", "login").to_string(), "auth.login");
        assert_eq!(Slug::new_thesis("auth", "login", "token").to_string(), "auth.login.token");
        assert_eq!(Slug::default().to_string(), "");
    }

    #[test]
    fn display_renders_wildcards() {
        assert_eq!(Slug::new_scenario("", "login").to_string(), "*.login");
        assert_eq!(Slug::new_thesis("auth", "", "").to_string(), "auth.*.*");
    }

    #[test]
    fn equality_considers_kind() {
        let scenario = Slug::new_scenario("auth", "login");
        assert_eq!(scenario, Slug::new_scenario("auth", "login"));
        assert_ne!(Slug::new_story("auth"), Slug::new_scenario("auth", ""));
    }

    #[test]
    fn parents_are_derived_from_components() {
        let thesis = Slug::new_thesis("auth", "login", "token");
        assert_eq!(thesis.scenario_slug(), Slug::new_scenario("auth", "login"));
        assert_eq!(thesis.story_slug(), Slug::new_story("auth"));
        assert!(Slug::new_story("auth").scenario_slug().is_zero());
    }

    #[test]
    fn wildcard_components_match_anything() {
        let any_scenario = Slug::new_scenario("auth", "");
        assert!(any_scenario.matches(&Slug::new_scenario("auth", "login")));
        assert!(any_scenario.matches(&Slug::new_scenario("auth", "logout")));
        assert!(!any_scenario.matches(&Slug::new_scenario("billing", "login")));
        assert!(!any_scenario.matches(&Slug::new_thesis("auth", "login", "token")));
    }
}
