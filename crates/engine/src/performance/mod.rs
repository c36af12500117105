//! Execution core.
//!
//! A [`Performance`] binds a validated specification to its performers and
//! runs it once. Every scenario runs as its own task and every thesis inside
//! it as another; theses gate each other through a [`ScenarioSyncGroup`].
//! Progress is reported as a single stream of [`Step`]s.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use thesis_types::{Scenario, Slug, Specification, Thesis};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::cancel::CancelScope;
use crate::environment::Environment;
use crate::errors::{PerformanceError, StepError};
use crate::graph::ActionGraph;
use crate::performer::{PerformResult, Performer, PerformerType, Performers};
use crate::sync_group::{DoneGuard, ScenarioSyncGroup};

mod step;

pub use step::{Event, InvalidStepSlug, Step};

/// Default capacity of the step channel.
pub const DEFAULT_STEP_BUFFER: usize = 16;

#[derive(Debug)]
pub struct Performance {
    id: String,
    specification: Arc<Specification>,
    performers: Performers,
    environment: Environment,
    step_buffer: usize,
    started: AtomicBool,
}

impl Performance {
    /// Binds `performers` to `specification`.
    ///
    /// Fails when a scenario's dependencies form a cycle or when a thesis
    /// needs a performer role that is not bound. Nothing runs on failure.
    pub fn new(
        id: impl Into<String>,
        specification: Arc<Specification>,
        performers: Performers,
    ) -> Result<Self, PerformanceError> {
        for scenario in specification.scenarios() {
            ActionGraph::build(scenario)?;
            for thesis in scenario.theses() {
                let performer_type = PerformerType::of(thesis);
                if performers.get(performer_type).is_none() {
                    return Err(PerformanceError::PerformerNotBound(performer_type));
                }
            }
        }

        Ok(Self {
            id: id.into(),
            specification,
            performers,
            environment: Environment::new(),
            step_buffer: DEFAULT_STEP_BUFFER,
            started: AtomicBool::new(false),
        })
    }

    /// Uses `environment` instead of an empty one, e.g. to seed values.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_step_buffer(mut self, step_buffer: usize) -> Self {
        self.step_buffer = step_buffer.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn specification(&self) -> &Arc<Specification> {
        &self.specification
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Starts every scenario and returns the step stream.
    ///
    /// The work proceeds in the background. The stream ends once every
    /// scenario has emitted its terminal step, which after cancellation of
    /// `scope` happens as soon as the running tasks have unwound. A
    /// performance runs at most once.
    pub fn start(&self, scope: &CancelScope) -> Result<mpsc::Receiver<Step>, PerformanceError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PerformanceError::AlreadyStarted);
        }

        let (sender, receiver) = mpsc::channel(self.step_buffer);
        let mut scenarios = 0usize;
        for scenario in self.specification.scenarios() {
            scenarios += 1;
            tokio::spawn(run_scenario(
                scenario.clone(),
                self.performers.clone(),
                self.environment.clone(),
                scope.clone(),
                sender.clone(),
            ));
        }
        info!(performance = %self.id, scenarios, "performance started");
        Ok(receiver)
    }
}

async fn run_scenario(
    scenario: Scenario,
    performers: Performers,
    environment: Environment,
    scope: CancelScope,
    steps: mpsc::Sender<Step>,
) {
    let slug = scenario.slug().clone();
    emit(&steps, &slug, PerformerType::NoPerformer, Event::FiredPerform, None).await;

    let group = Arc::new(ScenarioSyncGroup::new(&scenario));
    let mut tasks = JoinSet::new();
    for thesis in scenario.theses() {
        let performer = performers.get(PerformerType::of(thesis)).cloned();
        tasks.spawn(run_thesis(
            thesis.clone(),
            performer,
            environment.clone(),
            scope.clone(),
            group.clone(),
            steps.clone(),
        ));
    }

    let mut outcome = ScenarioOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((event, step_error)) => outcome.record(event, step_error),
            Err(join_error) => {
                error!(scenario = %slug, error = %join_error, "thesis task aborted");
                outcome.record(Event::FiredCrash, Some(StepError::Crashed(join_error.to_string())));
            }
        }
    }

    let (event, step_error) = outcome.finish();
    debug!(scenario = %slug, event = %event, "scenario finished");
    emit(&steps, &slug, PerformerType::NoPerformer, event, step_error).await;
}

async fn run_thesis(
    thesis: Thesis,
    performer: Option<Arc<dyn Performer>>,
    environment: Environment,
    scope: CancelScope,
    group: Arc<ScenarioSyncGroup>,
    steps: mpsc::Sender<Step>,
) -> (Event, Option<StepError>) {
    let slug = thesis.slug();
    let _done = DoneGuard::new(&group, slug);
    let performer_type = PerformerType::of(&thesis);

    if let Err(step_error) = group.wait_thesis_dependencies(&scope, slug).await {
        debug!(thesis = %slug, error = %step_error, "thesis canceled before performing");
        emit(&steps, slug, performer_type, Event::FiredCancel, Some(step_error.clone())).await;
        return (Event::FiredCancel, Some(step_error));
    }

    emit(&steps, slug, performer_type, Event::FiredPerform, None).await;
    let result = match performer {
        Some(performer) => AssertUnwindSafe(performer.perform(&scope, &environment, &thesis))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let reason = panic_message(panic.as_ref());
                error!(thesis = %slug, reason = %reason, "performer panicked");
                PerformResult::crashed(format!("performer panicked: {reason}"))
            }),
        None => PerformResult::crashed(format!("no performer bound for {performer_type:?} theses")),
    };
    let event = result.event();
    debug!(thesis = %slug, event = %event, "thesis performed");
    emit(&steps, slug, performer_type, event, result.error.clone()).await;
    (event, result.error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn emit(
    steps: &mpsc::Sender<Step>,
    slug: &Slug,
    performer_type: PerformerType,
    event: Event,
    step_error: Option<StepError>,
) {
    match Step::new(slug.clone(), performer_type, event, step_error) {
        Ok(step) => {
            if steps.send(step).await.is_err() {
                debug!(slug = %slug, event = %event, "step stream closed, dropping step");
            }
        }
        Err(invalid) => error!(error = %invalid, "refusing to emit step"),
    }
}

/// Folds thesis outcomes into the scenario's terminal event: crash over fail
/// over cancel, and pass only when every thesis passed.
#[derive(Debug, Default)]
struct ScenarioOutcome {
    worst: Option<(Event, Option<StepError>)>,
}

impl ScenarioOutcome {
    fn record(&mut self, event: Event, step_error: Option<StepError>) {
        let replace = match &self.worst {
            Some((worst, _)) => severity(event) > severity(*worst),
            None => true,
        };
        if replace {
            self.worst = Some((event, step_error));
        }
    }

    fn finish(self) -> (Event, Option<StepError>) {
        match self.worst {
            Some((Event::FiredPass, _)) | None => (Event::FiredPass, None),
            Some(worst) => worst,
        }
    }
}

fn severity(event: Event) -> u8 {
    match event {
        Event::FiredCrash => 3,
        Event::FiredFail => 2,
        Event::FiredCancel => 1,
        Event::FiredPass | Event::FiredPerform | Event::NoEvent => 0,
    }
}
