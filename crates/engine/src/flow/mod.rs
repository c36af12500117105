//! Flow snapshots: per-slug progress of one performance run.

use serde::{Deserialize, Serialize};
use thesis_types::Slug;
use thiserror::Error;

use crate::performance::Event;

mod reducer;
mod state;
mod store;

pub use reducer::Reducer;
pub use state::State;
pub use store::{FlowStore, InMemoryFlowStore};

/// Immutable snapshot handed to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub performance_id: String,
    pub statuses: Vec<Status>,
}

impl Flow {
    pub fn status(&self, slug: &Slug) -> Option<&Status> {
        self.statuses.iter().find(|status| &status.slug == slug)
    }

    /// State of `slug`, or [`State::NoState`] when it is not tracked.
    pub fn state(&self, slug: &Slug) -> State {
        self.status(slug).map(|status| status.state).unwrap_or_default()
    }

    /// Statuses whose slug matches `pattern`; empty pattern components match
    /// anything, so `Slug::new_scenario("", "")` selects every scenario.
    pub fn matching<'a>(&'a self, pattern: &'a Slug) -> impl Iterator<Item = &'a Status> + 'a {
        self.statuses.iter().filter(move |status| pattern.matches(&status.slug))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub slug: Slug,
    pub state: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurred_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("no transition from {state} on {event} for `{slug}`")]
    InvalidTransition { slug: Slug, state: State, event: Event },
}
