//! Per-scenario dependency coordinator.
//!
//! Each thesis owns a write-once completion gate and a wait-set: its explicit
//! `after` dependencies plus every thesis of a strictly earlier stage. A
//! thesis may start once every gate in its wait-set is closed. The group is
//! built for one scenario run and dropped with it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use thesis_types::{Scenario, Slug};
use tokio::sync::watch;
use tracing::trace;

use crate::cancel::CancelScope;
use crate::errors::StepError;

#[derive(Debug)]
struct ThesisGate {
    done: watch::Sender<bool>,
    wait_set: Vec<Slug>,
}

#[derive(Debug)]
pub struct ScenarioSyncGroup {
    gates: HashMap<Slug, ThesisGate>,
    signaled: AtomicUsize,
}

impl ScenarioSyncGroup {
    pub fn new(scenario: &Scenario) -> Self {
        let theses = scenario.theses();
        let gates = theses
            .iter()
            .map(|thesis| {
                let mut wait_set: Vec<Slug> = Vec::new();
                let mut seen = HashSet::new();
                let earlier = theses
                    .iter()
                    .filter(|other| other.stage() < thesis.stage())
                    .map(|other| other.slug());
                for slug in thesis.after().iter().chain(earlier) {
                    if seen.insert(slug.clone()) {
                        wait_set.push(slug.clone());
                    }
                }
                let (done, _) = watch::channel(false);
                (thesis.slug().clone(), ThesisGate { done, wait_set })
            })
            .collect();

        Self {
            gates,
            signaled: AtomicUsize::new(0),
        }
    }

    /// Slugs `slug` waits for. Empty for unknown slugs.
    pub fn wait_set(&self, slug: &Slug) -> &[Slug] {
        self.gates.get(slug).map(|gate| gate.wait_set.as_slice()).unwrap_or_default()
    }

    /// Blocks until every prerequisite of `slug` has signalled completion.
    ///
    /// Fails with [`StepError::Canceled`] as soon as `scope` is cancelled,
    /// including when it already was on entry.
    pub async fn wait_thesis_dependencies(&self, scope: &CancelScope, slug: &Slug) -> Result<(), StepError> {
        if let Some(cause) = scope.cause() {
            return Err(StepError::Canceled(cause));
        }

        for dependency in self.wait_set(slug) {
            let Some(gate) = self.gates.get(dependency) else {
                continue;
            };
            let mut receiver = gate.done.subscribe();
            trace!(thesis = %slug, dependency = %dependency, "waiting for dependency");
            tokio::select! {
                // a closed channel cannot signal any more, treat it as done
                _ = async { let _ = receiver.wait_for(|done| *done).await; } => {}
                cause = scope.cancelled() => return Err(StepError::Canceled(cause)),
            }
        }
        Ok(())
    }

    /// Closes the gate of `slug`. Repeated or unknown signals are ignored.
    /// Returns true when this call closed the gate.
    pub fn thesis_done(&self, slug: &Slug) -> bool {
        let Some(gate) = self.gates.get(slug) else {
            return false;
        };
        let closed = gate.done.send_if_modified(|done| !std::mem::replace(done, true));
        if closed {
            self.signaled.fetch_add(1, Ordering::AcqRel);
            trace!(thesis = %slug, "thesis done");
        }
        closed
    }

    /// Number of gates closed so far.
    pub fn signaled(&self) -> usize {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Closes a thesis gate when dropped, so every exit path of a thesis task
/// signals exactly once, including panics and aborted tasks.
pub(crate) struct DoneGuard<'a> {
    group: &'a ScenarioSyncGroup,
    slug: &'a Slug,
}

impl<'a> DoneGuard<'a> {
    pub(crate) fn new(group: &'a ScenarioSyncGroup, slug: &'a Slug) -> Self {
        Self { group, slug }
    }
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.group.thesis_done(self.slug);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::errors::CancelCause;
    use crate::testing::{assertion_thesis, scenario};
    use thesis_types::Stage;

    fn slug(name: &str) -> Slug {
        Slug::new_thesis("s", "c", name)
    }

    fn sample() -> Scenario {
        scenario(
            "s",
            "c",
            vec![
                assertion_thesis("s", "c", "a", Stage::Given, &[]),
                assertion_thesis("s", "c", "b", Stage::Given, &["a"]),
                assertion_thesis("s", "c", "act", Stage::When, &[]),
                assertion_thesis("s", "c", "check", Stage::Then, &["act"]),
            ],
        )
    }

    #[test]
    fn wait_set_includes_explicit_and_earlier_stages() {
        let group = ScenarioSyncGroup::new(&sample());

        assert!(group.wait_set(&slug("a")).is_empty());
        assert_eq!(group.wait_set(&slug("b")), &[slug("a")]);
        assert_eq!(group.wait_set(&slug("act")), &[slug("a"), slug("b")]);
        // explicit dependency first, earlier stages after, without duplicates
        assert_eq!(group.wait_set(&slug("check")), &[slug("act"), slug("a"), slug("b")]);
    }

    #[tokio::test]
    async fn empty_wait_set_returns_immediately() {
        let group = ScenarioSyncGroup::new(&sample());
        let scope = CancelScope::new();

        group
            .wait_thesis_dependencies(&scope, &slug("a"))
            .await
            .expect("no prerequisites");
    }

    #[tokio::test]
    async fn waits_until_all_prerequisites_are_done() {
        let group = Arc::new(ScenarioSyncGroup::new(&sample()));
        let scope = CancelScope::new();

        let waiter = {
            let group = group.clone();
            let scope = scope.clone();
            tokio::spawn(async move { group.wait_thesis_dependencies(&scope, &slug("act")).await })
        };

        group.thesis_done(&slug("a"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished(), "act must still wait for b");

        group.thesis_done(&slug("b"));
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .expect("task joins");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiters_with_cause() {
        let group = Arc::new(ScenarioSyncGroup::new(&sample()));
        let scope = CancelScope::new();

        let waiter = {
            let group = group.clone();
            let scope = scope.clone();
            tokio::spawn(async move { group.wait_thesis_dependencies(&scope, &slug("check")).await })
        };
        scope.cancel(CancelCause::DeadlineExceeded);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .expect("task joins");
        assert_eq!(result, Err(StepError::Canceled(CancelCause::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn already_cancelled_scope_fails_fast() {
        let group = ScenarioSyncGroup::new(&sample());
        let scope = CancelScope::new();
        scope.cancel(CancelCause::Requested);

        let result = group.wait_thesis_dependencies(&scope, &slug("a")).await;
        assert_eq!(result, Err(StepError::Canceled(CancelCause::Requested)));
    }

    #[test]
    fn thesis_done_is_idempotent() {
        let group = ScenarioSyncGroup::new(&sample());

        assert!(group.thesis_done(&slug("a")));
        assert!(!group.thesis_done(&slug("a")));
        assert!(!group.thesis_done(&slug("ghost")));
        assert_eq!(group.signaled(), 1);
    }

    #[test]
    fn done_guard_signals_on_drop() {
        let group = ScenarioSyncGroup::new(&sample());
        let a = slug("a");
        {
            let _guard = DoneGuard::new(&group, &a);
        }
        assert_eq!(group.signaled(), 1);
        assert!(!group.thesis_done(&a));
    }
}
