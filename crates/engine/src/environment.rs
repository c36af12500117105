//! Run-wide key/value store shared by the performers of one performance.
//!
//! Thesis outputs are stored under `story → scenario → thesis`, so theses
//! read their siblings by name through [`Environment::scenario_view`].

use std::sync::Arc;

use serde_json::{Map, Value};
use thesis_types::{Slug, SlugKind};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    data: Arc<RwLock<Map<String, Value>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the output of a thesis, replacing any earlier value.
    /// Non-thesis slugs are ignored.
    pub async fn store(&self, thesis: &Slug, value: Value) {
        if thesis.kind() != SlugKind::Thesis {
            return;
        }
        let mut data = self.data.write().await;
        let scenario = data
            .entry(thesis.story().to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .and_then(|story| {
                story
                    .entry(thesis.scenario().to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
            });
        if let Some(scenario) = scenario {
            scenario.insert(thesis.thesis().to_string(), value);
        }
    }

    pub async fn load(&self, thesis: &Slug) -> Option<Value> {
        let data = self.data.read().await;
        data.get(thesis.story())?.get(thesis.scenario())?.get(thesis.thesis()).cloned()
    }

    /// Copy of everything stored for the scenario of `slug`, keyed by thesis
    /// name.
    pub async fn scenario_view(&self, slug: &Slug) -> Map<String, Value> {
        let data = self.data.read().await;
        data.get(slug.story())
            .and_then(|story| story.get(slug.scenario()))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}
