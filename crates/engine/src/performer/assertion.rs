use async_trait::async_trait;
use serde_json::Value;
use thesis_types::{AssertionMethod, Thesis};
use tracing::debug;

use super::{PerformResult, Performer};
use crate::cancel::CancelScope;
use crate::environment::Environment;
use crate::resolve::{JsonPath, json_values_match};

/// Checks values recorded by sibling theses.
///
/// Each `actual` is a `$`-rooted path into the scenario's environment view,
/// so `$.login.response.status` reads the status stored by thesis `login`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionPerformer;

impl AssertionPerformer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Performer for AssertionPerformer {
    async fn perform(&self, scope: &CancelScope, environment: &Environment, thesis: &Thesis) -> PerformResult {
        if let Some(cause) = scope.cause() {
            return PerformResult::canceled(cause);
        }
        let Some(assertion) = thesis.performable().assertion() else {
            return PerformResult::crashed(format!("thesis `{}` has no assertion", thesis.slug()));
        };

        let mut checks = Vec::with_capacity(assertion.asserts.len());
        for assert in &assertion.asserts {
            let path = match assertion.method {
                AssertionMethod::JsonPath => match JsonPath::parse(&assert.actual) {
                    Ok(path) => path,
                    Err(error) => return PerformResult::crashed(error.to_string()),
                },
            };
            checks.push((path, &assert.expected));
        }

        let root = Value::Object(environment.scenario_view(thesis.slug()).await);
        for (path, expected) in checks {
            let Some(actual) = path.select(&root) else {
                return PerformResult::failed(format!("`{path}` is not set"));
            };
            if !json_values_match(expected, actual) {
                return PerformResult::failed(format!("`{path}` is {actual}, expected {expected}"));
            }
            debug!(thesis = %thesis.slug(), path = %path, "assertion holds");
        }
        PerformResult::passed()
    }
}
