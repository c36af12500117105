//! Build-time errors raised while assembling a specification tree.

use thiserror::Error;

use crate::SlugKind;

/// Reasons a specification tree is rejected before anything runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecificationError {
    #[error("slug `{slug}` is a {actual:?} slug, expected {expected:?}")]
    SlugKindMismatch {
        slug: String,
        expected: SlugKind,
        actual: SlugKind,
    },

    #[error("thesis `{slug}` has no performable definition, expected `http` or `assertion`")]
    MissingPerformable { slug: String },

    #[error("thesis `{slug}` declares both `http` and `assertion`, expected exactly one")]
    AmbiguousPerformable { slug: String },

    #[error("thesis `{slug}` depends on `{dependency}`, which is not a thesis of the same scenario")]
    UnknownDependency { slug: String, dependency: String },

    #[error("thesis `{slug}` does not belong to scenario `{scenario}`")]
    ForeignThesis { slug: String, scenario: String },

    #[error("duplicate slug `{slug}`")]
    DuplicateSlug { slug: String },

    #[error("empty name under `{parent}`")]
    EmptyName { parent: String },

    #[error("thesis `{slug}` has an invalid request url `{url}`: {reason}")]
    InvalidUrl { slug: String, url: String, reason: String },

    #[error("thesis `{slug}` asserts nothing")]
    EmptyAssertion { slug: String },
}
