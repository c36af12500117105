//! Shared type definitions for thesis specifications.
//!
//! A specification is a tree of stories, scenarios, and theses. Authors write
//! it as a [`SpecificationDocument`]; the engine consumes the validated
//! [`Specification`] built from it.

pub mod document;
mod error;
mod slug;
mod specification;

pub use document::{ScenarioDocument, SpecificationDocument, StatementDocument, StoryDocument, ThesisDocument};
pub use error::SpecificationError;
pub use slug::{Slug, SlugKind, WILDCARD};
pub use specification::{
    AssertSpec, AssertionMethod, AssertionSpec, HttpMethod, HttpRequestSpec, HttpResponseSpec, HttpSpec, Performable, Scenario,
    Specification, Stage, Story, Thesis,
};
