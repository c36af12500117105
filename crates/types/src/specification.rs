//! Validated, immutable specification tree consumed by the engine.
//!
//! The tree is built once from a [`SpecificationDocument`] and shared read-only
//! across any number of performances. Constructors enforce the structural
//! invariants: every node carries a slug of the right kind, every thesis has
//! exactly one performable payload, and explicit dependencies stay inside the
//! thesis's own scenario.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{ScenarioDocument, SpecificationDocument, StoryDocument, ThesisDocument};
use crate::{Slug, SlugKind, SpecificationError};

/// Given/When/Then stage of a thesis. Stages order theses implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Given,
    When,
    Then,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Given, Stage::When, Stage::Then];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Given => "given",
            Stage::When => "when",
            Stage::Then => "then",
        }
    }

    /// Stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Given => Some(Stage::When),
            Stage::When => Some(Stage::Then),
            Stage::Then => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// HTTP call performed by a thesis together with the expected response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpSpec {
    pub request: HttpRequestSpec,
    #[serde(default)]
    pub response: HttpResponseSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestSpec {
    #[serde(default)]
    pub method: HttpMethod,
    /// Target URL; may contain `${{ ... }}` templates resolved at run time.
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseSpec {
    /// Accepted status codes. Empty accepts any 2xx status.
    #[serde(default)]
    pub allowed_codes: Vec<u16>,
    /// Accepted media type (parameters such as `charset` are ignored).
    #[serde(default)]
    pub allowed_content_type: Option<String>,
}

/// How `actual` expressions of an assertion are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionMethod {
    #[default]
    JsonPath,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionSpec {
    #[serde(rename = "with", default)]
    pub method: AssertionMethod,
    #[serde(rename = "assert", default)]
    pub asserts: Vec<AssertSpec>,
}

/// Single check: the value at `actual` must equal `expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertSpec {
    pub actual: String,
    pub expected: Value,
}

/// The one thing a thesis does when performed.
#[derive(Debug, Clone, PartialEq)]
pub enum Performable {
    Http(HttpSpec),
    Assertion(AssertionSpec),
}

impl Performable {
    pub fn http(&self) -> Option<&HttpSpec> {
        match self {
            Performable::Http(spec) => Some(spec),
            Performable::Assertion(_) => None,
        }
    }

    pub fn assertion(&self) -> Option<&AssertionSpec> {
        match self {
            Performable::Assertion(spec) => Some(spec),
            Performable::Http(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thesis {
    slug: Slug,
    stage: Stage,
    behavior: String,
    after: Vec<Slug>,
    performable: Performable,
}

impl Thesis {
    /// Creates a thesis. `slug` must be a thesis slug and every dependency a
    /// thesis slug of the same scenario.
    pub fn new(
        slug: Slug,
        stage: Stage,
        behavior: impl Into<String>,
        after: Vec<Slug>,
        performable: Performable,
    ) -> Result<Self, SpecificationError> {
        expect_kind(&slug, SlugKind::Thesis)?;
        for dependency in &after {
            if dependency.kind() != SlugKind::Thesis || dependency.scenario_slug() != slug.scenario_slug() {
                return Err(SpecificationError::UnknownDependency {
                    slug: slug.to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }
        if let Performable::Assertion(assertion) = &performable
            && assertion.asserts.is_empty()
        {
            return Err(SpecificationError::EmptyAssertion { slug: slug.to_string() });
        }
        if let Performable::Http(http) = &performable {
            validate_url(&slug, &http.request.url)?;
        }

        Ok(Self {
            slug,
            stage,
            behavior: behavior.into(),
            after,
            performable,
        })
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    /// Explicit "after" dependencies.
    pub fn after(&self) -> &[Slug] {
        &self.after
    }

    pub fn performable(&self) -> &Performable {
        &self.performable
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    slug: Slug,
    description: Option<String>,
    theses: Vec<Thesis>,
}

impl Scenario {
    /// Creates a scenario, checking that theses are unique, belong to it, and
    /// only depend on siblings.
    pub fn new(slug: Slug, description: Option<String>, theses: Vec<Thesis>) -> Result<Self, SpecificationError> {
        expect_kind(&slug, SlugKind::Scenario)?;

        let mut seen = HashSet::new();
        for thesis in &theses {
            if thesis.slug().scenario_slug() != slug {
                return Err(SpecificationError::ForeignThesis {
                    slug: thesis.slug().to_string(),
                    scenario: slug.to_string(),
                });
            }
            if !seen.insert(thesis.slug().clone()) {
                return Err(SpecificationError::DuplicateSlug {
                    slug: thesis.slug().to_string(),
                });
            }
        }
        for thesis in &theses {
            if let Some(dependency) = thesis.after().iter().find(|dependency| !seen.contains(*dependency)) {
                return Err(SpecificationError::UnknownDependency {
                    slug: thesis.slug().to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }

        Ok(Self {
            slug,
            description,
            theses,
        })
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn theses(&self) -> &[Thesis] {
        &self.theses
    }

    pub fn thesis(&self, slug: &Slug) -> Option<&Thesis> {
        self.theses.iter().find(|thesis| thesis.slug() == slug)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    slug: Slug,
    description: Option<String>,
    as_a: Option<String>,
    in_order_to: Option<String>,
    want_to: Option<String>,
    scenarios: Vec<Scenario>,
}

impl Story {
    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn as_a(&self) -> Option<&str> {
        self.as_a.as_deref()
    }

    pub fn in_order_to(&self) -> Option<&str> {
        self.in_order_to.as_deref()
    }

    pub fn want_to(&self) -> Option<&str> {
        self.want_to.as_deref()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }
}

/// Root of the validated tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    id: String,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    stories: Vec<Story>,
}

impl Specification {
    /// Validates an authored document and converts it into the runtime tree.
    pub fn from_document(id: impl Into<String>, document: &SpecificationDocument) -> Result<Self, SpecificationError> {
        let id = id.into();
        let mut stories = Vec::with_capacity(document.stories.len());
        for (name, story) in &document.stories {
            ensure_name(name, &id)?;
            stories.push(story_from_document(name, story)?);
        }

        Ok(Self {
            id,
            author: document.author.clone(),
            title: document.title.clone(),
            description: document.description.clone(),
            stories,
        })
    }

    /// Assembles a specification from already validated scenarios, grouping
    /// them into stories by slug.
    pub fn from_scenarios(id: impl Into<String>, scenarios: Vec<Scenario>) -> Self {
        let mut stories: Vec<Story> = Vec::new();
        for scenario in scenarios {
            let story_slug = scenario.slug().story_slug();
            match stories.iter_mut().find(|story| story.slug == story_slug) {
                Some(story) => story.scenarios.push(scenario),
                None => stories.push(Story {
                    slug: story_slug,
                    description: None,
                    as_a: None,
                    in_order_to: None,
                    want_to: None,
                    scenarios: vec![scenario],
                }),
            }
        }

        Self {
            id: id.into(),
            author: None,
            title: None,
            description: None,
            stories,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.stories.iter().flat_map(|story| story.scenarios.iter())
    }

    pub fn theses(&self) -> impl Iterator<Item = &Thesis> {
        self.scenarios().flat_map(|scenario| scenario.theses.iter())
    }

    pub fn thesis(&self, slug: &Slug) -> Option<&Thesis> {
        self.theses().find(|thesis| thesis.slug() == slug)
    }
}

fn story_from_document(name: &str, document: &StoryDocument) -> Result<Story, SpecificationError> {
    let slug = Slug::new_story(name);
    let mut scenarios = Vec::with_capacity(document.scenarios.len());
    for (scenario_name, scenario) in &document.scenarios {
        ensure_name(scenario_name, name)?;
        scenarios.push(scenario_from_document(Slug::new_scenario(name, scenario_name.as_str()), scenario)?);
    }

    Ok(Story {
        slug,
        description: document.description.clone(),
        as_a: document.as_a.clone(),
        in_order_to: document.in_order_to.clone(),
        want_to: document.want_to.clone(),
        scenarios,
    })
}

fn scenario_from_document(slug: Slug, document: &ScenarioDocument) -> Result<Scenario, SpecificationError> {
    let mut theses = Vec::with_capacity(document.theses.len());
    for (thesis_name, thesis) in &document.theses {
        ensure_name(thesis_name, &slug.to_string())?;
        let thesis_slug = Slug::new_thesis(slug.story(), slug.scenario(), thesis_name.as_str());
        theses.push(thesis_from_document(thesis_slug, thesis)?);
    }
    Scenario::new(slug, document.description.clone(), theses)
}

fn thesis_from_document(slug: Slug, document: &ThesisDocument) -> Result<Thesis, SpecificationError> {
    let performable = match (&document.http, &document.assertion) {
        (Some(http), None) => Performable::Http(http.clone()),
        (None, Some(assertion)) => Performable::Assertion(assertion.clone()),
        (None, None) => return Err(SpecificationError::MissingPerformable { slug: slug.to_string() }),
        (Some(_), Some(_)) => return Err(SpecificationError::AmbiguousPerformable { slug: slug.to_string() }),
    };
    let after = document
        .after
        .iter()
        .map(|name| Slug::new_thesis(slug.story(), slug.scenario(), name.trim()))
        .collect();

    Thesis::new(slug, document.statement.stage, document.statement.behavior.clone(), after, performable)
}

fn expect_kind(slug: &Slug, expected: SlugKind) -> Result<(), SpecificationError> {
    if slug.kind() != expected {
        return Err(SpecificationError::SlugKindMismatch {
            slug: slug.to_string(),
            expected,
            actual: slug.kind(),
        });
    }
    if slug.components().iter().any(|component| component.is_empty()) {
        return Err(SpecificationError::EmptyName { parent: slug.to_string() });
    }
    Ok(())
}

fn ensure_name(name: &str, parent: &str) -> Result<(), SpecificationError> {
    if name.trim().is_empty() || name.contains('.') {
        return Err(SpecificationError::EmptyName {
            parent: parent.to_string(),
        });
    }
    Ok(())
}

// Templated URLs are only checked once interpolated.
fn validate_url(slug: &Slug, raw: &str) -> Result<(), SpecificationError> {
    if raw.contains("${{") {
        return Ok(());
    }
    url::Url::parse(raw).map(|_| ()).map_err(|error| SpecificationError::InvalidUrl {
        slug: slug.to_string(),
        url: raw.to_string(),
        reason: error.to_string(),
    })
}
