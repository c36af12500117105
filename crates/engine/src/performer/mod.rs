//! Performer contract and the built-in roles.
//!
//! A [`Performer`] executes one thesis against the run's [`Environment`] and
//! classifies the outcome as a [`PerformResult`]. The bindings are a closed
//! set keyed by [`PerformerType`], fixed when a performance is constructed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thesis_types::{Performable, Thesis};

use crate::cancel::CancelScope;
use crate::environment::Environment;
use crate::errors::{CancelCause, StepError};
use crate::performance::Event;

pub mod assertion;
pub mod http;

pub use assertion::AssertionPerformer;
pub use http::HttpPerformer;

/// Role of the performer bound to a thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformerType {
    /// Scenario-level steps carry no performer.
    #[default]
    NoPerformer,
    Http,
    Assertion,
}

impl PerformerType {
    pub fn of(thesis: &Thesis) -> Self {
        match thesis.performable() {
            Performable::Http(_) => PerformerType::Http,
            Performable::Assertion(_) => PerformerType::Assertion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    #[default]
    NotPerformed,
    Passed,
    Failed,
    Crashed,
}

/// Classified outcome of one performer call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerformResult {
    pub state: ResultState,
    pub error: Option<StepError>,
}

impl PerformResult {
    pub fn passed() -> Self {
        Self {
            state: ResultState::Passed,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: ResultState::Failed,
            error: Some(StepError::Failed(reason.into())),
        }
    }

    pub fn crashed(reason: impl Into<String>) -> Self {
        Self {
            state: ResultState::Crashed,
            error: Some(StepError::Crashed(reason.into())),
        }
    }

    /// The performer gave up because its scope was cancelled.
    pub fn canceled(cause: CancelCause) -> Self {
        Self {
            state: ResultState::NotPerformed,
            error: Some(StepError::Canceled(cause)),
        }
    }

    /// Terminal event for this result. Anything not performed counts as
    /// cancelled.
    pub fn event(&self) -> Event {
        match self.state {
            ResultState::Passed => Event::FiredPass,
            ResultState::Failed => Event::FiredFail,
            ResultState::Crashed => Event::FiredCrash,
            ResultState::NotPerformed => Event::FiredCancel,
        }
    }
}

/// Executes a single thesis.
///
/// Implementations should return promptly with [`PerformResult::canceled`]
/// once `scope` is cancelled; the engine does not abort them.
#[async_trait]
pub trait Performer: Send + Sync {
    async fn perform(&self, scope: &CancelScope, environment: &Environment, thesis: &Thesis) -> PerformResult;
}

/// Performer bound to each role for one performance.
#[derive(Clone, Default)]
pub struct Performers {
    http: Option<Arc<dyn Performer>>,
    assertion: Option<Arc<dyn Performer>>,
}

impl Performers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, performer: Arc<dyn Performer>) -> Self {
        self.http = Some(performer);
        self
    }

    pub fn with_assertion(mut self, performer: Arc<dyn Performer>) -> Self {
        self.assertion = Some(performer);
        self
    }

    pub fn get(&self, performer_type: PerformerType) -> Option<&Arc<dyn Performer>> {
        match performer_type {
            PerformerType::Http => self.http.as_ref(),
            PerformerType::Assertion => self.assertion.as_ref(),
            PerformerType::NoPerformer => None,
        }
    }
}

impl std::fmt::Debug for Performers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Performers")
            .field("http", &self.http.is_some())
            .field("assertion", &self.assertion.is_some())
            .finish()
    }
}
