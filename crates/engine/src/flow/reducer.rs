use indexmap::IndexMap;
use thesis_types::{Slug, Specification};
use tracing::error;

use super::{Flow, FlowError, State, Status};
use crate::performance::Step;

/// Folds a step stream into flow snapshots.
///
/// Seeded with every scenario and thesis of a specification in authoring
/// order, all [`State::NotPerformed`].
#[derive(Debug, Clone)]
pub struct Reducer {
    id: String,
    performance_id: String,
    statuses: IndexMap<Slug, Status>,
}

impl Reducer {
    pub fn new(id: impl Into<String>, performance_id: impl Into<String>, specification: &Specification) -> Self {
        let mut statuses = IndexMap::new();
        for scenario in specification.scenarios() {
            let slugs = std::iter::once(scenario.slug()).chain(scenario.theses().iter().map(|thesis| thesis.slug()));
            for slug in slugs {
                statuses.insert(
                    slug.clone(),
                    Status {
                        slug: slug.clone(),
                        state: State::NotPerformed,
                        occurred_errors: Vec::new(),
                    },
                );
            }
        }
        Self {
            id: id.into(),
            performance_id: performance_id.into(),
            statuses,
        }
    }

    /// Applies `step` to the status of its slug.
    ///
    /// Steps for untracked slugs are ignored. An undefined transition leaves
    /// the status untouched and is reported as an error.
    pub fn with_step(&mut self, step: &Step) -> Result<(), FlowError> {
        let Some(status) = self.statuses.get_mut(step.slug()) else {
            return Ok(());
        };

        let next = status.state.next(step.event());
        if next == State::NoState {
            error!(slug = %step.slug(), state = %status.state, event = %step.event(), "undefined flow transition");
            return Err(FlowError::InvalidTransition {
                slug: step.slug().clone(),
                state: status.state,
                event: step.event(),
            });
        }

        status.state = next;
        if let Some(step_error) = step.error() {
            status.occurred_errors.push(step_error.to_string());
        }
        Ok(())
    }

    /// Snapshot of the current statuses. Repeatable and non-destructive.
    pub fn reduce(&self) -> Flow {
        Flow {
            id: self.id.clone(),
            performance_id: self.performance_id.clone(),
            statuses: self.statuses.values().cloned().collect(),
        }
    }
}
