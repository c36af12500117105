//! Fixtures shared by the unit and integration tests of this crate.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thesis_engine::{CancelScope, Environment, PerformResult, Performer};
use thesis_types::{AssertSpec, AssertionMethod, AssertionSpec, Performable, Scenario, Slug, Specification, Stage, Thesis};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum Script {
    Pass,
    Fail,
    Crash,
    /// Passes after the delay unless cancelled first.
    Delay(Duration),
    /// Only returns once cancelled.
    Block,
    Panic,
}

/// Performer answering from a per-thesis script. Unscripted theses pass.
#[derive(Debug, Default)]
pub struct ScriptedPerformer {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPerformer {
    pub fn with(mut self, thesis: &str, script: Script) -> Self {
        self.scripts.insert(thesis.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Performer for ScriptedPerformer {
    async fn perform(&self, scope: &CancelScope, _environment: &Environment, thesis: &Thesis) -> PerformResult {
        let name = thesis.slug().thesis().to_string();
        self.calls.lock().expect("calls lock").push(name.clone());
        match self.scripts.get(&name).cloned().unwrap_or(Script::Pass) {
            Script::Pass => PerformResult::passed(),
            Script::Fail => PerformResult::failed(format!("{name} did not hold")),
            Script::Crash => PerformResult::crashed(format!("{name} broke")),
            Script::Delay(delay) => tokio::select! {
                _ = tokio::time::sleep(delay) => PerformResult::passed(),
                cause = scope.cancelled() => PerformResult::canceled(cause),
            },
            Script::Block => PerformResult::canceled(scope.cancelled().await),
            Script::Panic => panic!("{name} exploded"),
        }
    }
}

/// Assertion thesis `story.scenario.name` depending on siblings `after`.
pub fn assertion_thesis(story: &str, scenario: &str, name: &str, stage: Stage, after: &[&str]) -> Thesis {
    Thesis::new(
        Slug::new_thesis(story, scenario, name),
        stage,
        format!("{name} holds"),
        after.iter().map(|dependency| Slug::new_thesis(story, scenario, *dependency)).collect(),
        Performable::Assertion(AssertionSpec {
            method: AssertionMethod::JsonPath,
            asserts: vec![AssertSpec {
                actual: "$".to_string(),
                expected: json!({}),
            }],
        }),
    )
    .expect("valid thesis fixture")
}

pub fn scenario(story: &str, name: &str, theses: Vec<Thesis>) -> Scenario {
    Scenario::new(Slug::new_scenario(story, name), None, theses).expect("valid scenario fixture")
}

pub fn thesis(name: &str, stage: Stage, after: &[&str]) -> Thesis {
    assertion_thesis("story", "scenario", name, stage, after)
}

pub fn slug(name: &str) -> Slug {
    Slug::new_thesis("story", "scenario", name)
}

pub fn scenario_slug() -> Slug {
    Slug::new_scenario("story", "scenario")
}

pub fn specification(theses: Vec<Thesis>) -> Arc<Specification> {
    Arc::new(Specification::from_scenarios("spec", vec![scenario("story", "scenario", theses)]))
}

/// Drains `receiver` until it closes; fails the test after `limit`.
pub async fn collect<T>(mut receiver: mpsc::Receiver<T>, limit: Duration) -> Vec<T> {
    tokio::time::timeout(limit, async move {
        let mut collected = Vec::new();
        while let Some(item) = receiver.recv().await {
            collected.push(item);
        }
        collected
    })
    .await
    .expect("stream closes in time")
}
