mod support;

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use support::{Script, ScriptedPerformer, collect, scenario_slug, slug, specification, thesis};
use thesis_engine::{
    CancelCause, CancelScope, EngineConfig, Event, FlowStore, ForwardPolicy, InMemoryCancelBus, InMemoryFlowStore,
    InMemoryPerformanceGuard, Maintainer, Message, MessageError, Performance, PerformanceError, PerformanceGuard, Performers,
    Reducer, SaveEveryStepPolicy, State, StepError,
};
use thesis_types::Stage;

const LIMIT: Duration = Duration::from_secs(5);

struct Harness {
    guard: Arc<InMemoryPerformanceGuard>,
    maintainer: Maintainer,
}

fn harness(config: &EngineConfig) -> Harness {
    let guard = Arc::new(InMemoryPerformanceGuard::new());
    let maintainer = Maintainer::new(guard.clone(), Arc::new(InMemoryCancelBus::new()), config);
    Harness { guard, maintainer }
}

fn blocking_performance(id: &str) -> Arc<Performance> {
    let spec = specification(vec![thesis("hang", Stage::When, &[])]);
    let performer = Arc::new(ScriptedPerformer::default().with("hang", Script::Block));
    Arc::new(Performance::new(id, spec, Performers::new().with_assertion(performer)).expect("valid"))
}

fn step_message<'a>(messages: &'a [Message], name: &str, event: Event) -> &'a Message {
    messages
        .iter()
        .find(|message| message.slug.as_ref() == Some(&slug(name)) && message.event == event)
        .unwrap_or_else(|| panic!("no {event} message for {name}: {messages:#?}"))
}

#[tokio::test]
async fn cancelling_the_parent_scope_cancels_and_releases_once() {
    let Harness { guard, maintainer } = harness(&EngineConfig::default());
    let parent = CancelScope::new();

    let messages = maintainer
        .maintain(&parent, blocking_performance("p"), Box::new(ForwardPolicy))
        .await
        .expect("maintained");
    assert!(guard.is_held("p").await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    parent.cancel(CancelCause::Requested);
    let messages = collect(messages, LIMIT).await;

    let canceled = step_message(&messages, "hang", Event::FiredCancel);
    assert_eq!(canceled.error, Some(MessageError::Step(StepError::Canceled(CancelCause::Requested))));
    assert_eq!(messages.last().map(|message| message.text.as_str()), Some("performance p canceled"));
    assert_eq!(guard.releases(), 1);
    assert!(!guard.is_held("p").await);
}

#[tokio::test]
async fn cancel_request_on_the_bus_stops_the_run() {
    let Harness { guard, maintainer } = harness(&EngineConfig::default());

    let messages = maintainer
        .maintain(&CancelScope::new(), blocking_performance("p"), Box::new(ForwardPolicy))
        .await
        .expect("maintained");
    tokio::time::sleep(Duration::from_millis(20)).await;
    maintainer.cancel_performance("p").await.expect("published");
    let messages = collect(messages, LIMIT).await;

    step_message(&messages, "hang", Event::FiredCancel);
    assert_eq!(messages.last().map(|message| message.text.as_str()), Some("performance p canceled"));
    assert_eq!(guard.releases(), 1);
}

#[tokio::test]
async fn flow_timeout_cancels_with_deadline_exceeded() {
    let config = EngineConfig {
        flow_timeout: Duration::from_millis(5),
        ..EngineConfig::default()
    };
    let Harness { guard, maintainer } = harness(&config);

    let messages = maintainer
        .maintain(&CancelScope::new(), blocking_performance("p"), Box::new(ForwardPolicy))
        .await
        .expect("maintained");
    let messages = collect(messages, LIMIT).await;

    let canceled = step_message(&messages, "hang", Event::FiredCancel);
    let Some(MessageError::Step(step_error)) = &canceled.error else {
        panic!("expected a step error, got {:?}", canceled.error);
    };
    assert_eq!(step_error.cancel_cause(), Some(CancelCause::DeadlineExceeded));
    let source = step_error.source().expect("cancel cause is the source");
    assert_eq!(source.to_string(), CancelCause::DeadlineExceeded.to_string());
    assert_eq!(messages.last().map(|message| message.text.as_str()), Some("performance p timed out"));
    assert_eq!(guard.releases(), 1);
}

#[tokio::test]
async fn concurrent_maintain_of_same_id_is_rejected() {
    let Harness { guard, maintainer } = harness(&EngineConfig::default());
    let scope = CancelScope::new();

    let first = maintainer
        .maintain(&scope, blocking_performance("p"), Box::new(ForwardPolicy))
        .await
        .expect("first run");
    let second = maintainer
        .maintain(&scope, blocking_performance("p"), Box::new(ForwardPolicy))
        .await;
    assert!(matches!(second, Err(PerformanceError::AlreadyStarted)));

    scope.cancel(CancelCause::Requested);
    collect(first, LIMIT).await;
    assert_eq!(guard.releases(), 1);
}

#[tokio::test]
async fn save_every_step_persists_final_flow() {
    let Harness { guard, maintainer } = harness(&EngineConfig::default());
    let spec = specification(vec![
        thesis("setup", Stage::Given, &[]),
        thesis("act", Stage::When, &[]),
        thesis("check", Stage::Then, &["act"]),
    ]);
    let performer = Arc::new(ScriptedPerformer::default().with("check", Script::Fail));
    let performance = Arc::new(Performance::new("p", spec.clone(), Performers::new().with_assertion(performer)).expect("valid"));
    let store = Arc::new(InMemoryFlowStore::new());
    let policy = SaveEveryStepPolicy::new(Reducer::new("flow-1", "p", &spec), store.clone(), Duration::from_secs(1));

    let messages = maintainer
        .maintain(&CancelScope::new(), performance, Box::new(policy))
        .await
        .expect("maintained");
    let messages = collect(messages, LIMIT).await;

    assert!(messages.iter().all(|message| !matches!(message.error, Some(MessageError::Store(_)))));
    let flow = store.get_flow("flow-1").await.expect("persisted");
    assert_eq!(flow.performance_id, "p");
    assert_eq!(flow.state(&slug("setup")), State::Passed);
    assert_eq!(flow.state(&slug("act")), State::Passed);
    assert_eq!(flow.state(&slug("check")), State::Failed);
    assert_eq!(flow.state(&scenario_slug()), State::Failed);
    assert_eq!(guard.releases(), 1);
}

#[tokio::test]
async fn release_failure_is_reported_as_message() {
    struct ForgetfulGuard;

    #[async_trait::async_trait]
    impl PerformanceGuard for ForgetfulGuard {
        async fn acquire_performance(&self, _id: &str) -> Result<(), thesis_engine::GuardError> {
            Ok(())
        }

        async fn release_performance(&self, _id: &str) -> Result<(), thesis_engine::GuardError> {
            Err(thesis_engine::GuardError::Backend("lock store unreachable".into()))
        }
    }

    let maintainer = Maintainer::new(Arc::new(ForgetfulGuard), Arc::new(InMemoryCancelBus::new()), &EngineConfig::default());
    let spec = specification(vec![thesis("only", Stage::When, &[])]);
    let performer = Arc::new(ScriptedPerformer::default());
    let performance = Arc::new(Performance::new("p", spec, Performers::new().with_assertion(performer)).expect("valid"));

    let messages = maintainer
        .maintain(&CancelScope::new(), performance, Box::new(ForwardPolicy))
        .await
        .expect("maintained");
    let messages = collect(messages, LIMIT).await;

    let last = messages.last().expect("messages");
    assert!(matches!(last.error, Some(MessageError::Guard(_))));
    // the run itself still completed
    assert!(messages.iter().any(|message| message.text == "performance p completed"));
}
