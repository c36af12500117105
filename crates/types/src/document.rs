//! Authoring model for declarative specification files.
//!
//! These structures mirror what authors write in YAML or JSON. Names are the
//! map keys and authoring order is preserved through `IndexMap`, so the
//! runtime tree built by [`Specification::from_document`](crate::Specification::from_document)
//! keeps stories, scenarios, and theses in the order they were declared.
//!
//! ```yaml
//! title: Users API
//! stories:
//!   users:
//!     asA: client
//!     inOrderTo: manage accounts
//!     wantTo: create users
//!     scenarios:
//!       create:
//!         theses:
//!           request:
//!             statement: { stage: when, behavior: a user is created }
//!             http:
//!               request: { method: POST, url: "http://localhost:8080/users" }
//!               response: { allowedCodes: [201] }
//!           check:
//!             after: [request]
//!             statement: { stage: then, behavior: the id is returned }
//!             assertion:
//!               with: jsonpath
//!               assert:
//!                 - actual: $.request.response.body.name
//!                   expected: alice
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{AssertionSpec, HttpSpec, Stage};

/// Root of an authored specification file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationDocument {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Stories keyed by name.
    #[serde(default)]
    pub stories: IndexMap<String, StoryDocument>,
}

/// A user story grouping related scenarios.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoryDocument {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub as_a: Option<String>,
    #[serde(default)]
    pub in_order_to: Option<String>,
    #[serde(default)]
    pub want_to: Option<String>,
    /// Scenarios keyed by name.
    #[serde(default)]
    pub scenarios: IndexMap<String, ScenarioDocument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDocument {
    #[serde(default)]
    pub description: Option<String>,
    /// Theses keyed by name.
    #[serde(default)]
    pub theses: IndexMap<String, ThesisDocument>,
}

/// One Given/When/Then statement with its performable payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThesisDocument {
    /// Names of theses in the same scenario that must finish first.
    #[serde(default)]
    pub after: Vec<String>,
    pub statement: StatementDocument,
    #[serde(default)]
    pub http: Option<HttpSpec>,
    #[serde(default)]
    pub assertion: Option<AssertionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementDocument {
    pub stage: Stage,
    #[serde(default)]
    pub behavior: String,
}
