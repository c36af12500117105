//! Performance maintainer.
//!
//! Drives one performance run end to end: takes the performance lock,
//! listens for cancel requests and the flow deadline, feeds every step into
//! a [`StepsPolicy`], and releases the lock once the step stream is drained.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cancel::CancelScope;
use crate::cancel_bus::{CancelBus, CancelSubscription};
use crate::config::EngineConfig;
use crate::errors::{CancelBusError, CancelCause, PerformanceError};
use crate::guard::PerformanceGuard;
use crate::performance::{Performance, Step};

mod message;
mod policy;

pub use message::{Message, MessageError};
pub use policy::{ForwardPolicy, SaveEveryStepPolicy, StepsPolicy};

/// How a maintained run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTermination {
    Completed,
    Canceled,
    TimedOut,
}

impl fmt::Display for RunTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunTermination::Completed => "completed",
            RunTermination::Canceled => "canceled",
            RunTermination::TimedOut => "timed out",
        })
    }
}

#[derive(Clone)]
pub struct Maintainer {
    guard: Arc<dyn PerformanceGuard>,
    bus: Arc<dyn CancelBus>,
    flow_timeout: Duration,
    message_buffer: usize,
}

impl Maintainer {
    pub fn new(guard: Arc<dyn PerformanceGuard>, bus: Arc<dyn CancelBus>, config: &EngineConfig) -> Self {
        Self {
            guard,
            bus,
            flow_timeout: config.flow_timeout,
            message_buffer: config.message_buffer.max(1),
        }
    }

    /// Runs `performance` under the lock and returns the message stream.
    ///
    /// Lock, subscription, and start failures are returned directly, with the
    /// lock released again if it was taken. Afterwards everything is
    /// reported through the stream, which ends after the lock is released.
    pub async fn maintain(
        &self,
        parent: &CancelScope,
        performance: Arc<Performance>,
        policy: Box<dyn StepsPolicy>,
    ) -> Result<mpsc::Receiver<Message>, PerformanceError> {
        let id = performance.id().to_string();
        self.guard.acquire_performance(&id).await?;
        info!(performance = %id, "performance lock acquired");

        let scope = parent.child();
        let started = match self.bus.subscribe_cancel(&id).await {
            Ok(subscription) => performance
                .start(&scope)
                .map(|steps| (subscription, steps)),
            Err(error) => Err(PerformanceError::from(error)),
        };
        let (subscription, steps) = match started {
            Ok(started) => started,
            Err(start_error) => {
                if let Err(release_error) = self.guard.release_performance(&id).await {
                    warn!(performance = %id, error = %release_error, "releasing performance lock failed");
                }
                return Err(start_error);
            }
        };

        let (messages, receiver) = mpsc::channel(self.message_buffer);
        let run = Run {
            id: id.clone(),
            scope,
            deadline: self.flow_timeout,
            messages: messages.clone(),
        };
        let guard = self.guard.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(run.drive(steps, subscription, policy)).await;
            let termination = match outcome {
                Ok(termination) => termination,
                Err(join_error) => {
                    error!(performance = %id, error = %join_error, "performance run aborted");
                    send(&messages, Message::notice(format!("performance {id} aborted: {join_error}"))).await;
                    RunTermination::Canceled
                }
            };
            info!(performance = %id, termination = %termination, "performance finished");
            send(&messages, Message::notice(format!("performance {id} {termination}"))).await;

            match guard.release_performance(&id).await {
                Ok(()) => info!(performance = %id, "performance lock released"),
                Err(release_error) => {
                    warn!(performance = %id, error = %release_error, "releasing performance lock failed");
                    send(&messages, Message::from_error("releasing performance lock", release_error)).await;
                }
            }
        });

        Ok(receiver)
    }

    /// Asks whoever maintains `id` to cancel it.
    pub async fn cancel_performance(&self, id: &str) -> Result<(), CancelBusError> {
        info!(performance = %id, "cancel requested");
        self.bus.publish_cancel(id).await
    }
}

impl fmt::Debug for Maintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maintainer")
            .field("flow_timeout", &self.flow_timeout)
            .field("message_buffer", &self.message_buffer)
            .finish_non_exhaustive()
    }
}

struct Run {
    id: String,
    scope: CancelScope,
    deadline: Duration,
    messages: mpsc::Sender<Message>,
}

impl Run {
    async fn drive(
        self,
        mut steps: mpsc::Receiver<Step>,
        subscription: CancelSubscription,
        mut policy: Box<dyn StepsPolicy>,
    ) -> RunTermination {
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        let mut subscription = Some(subscription);

        loop {
            tokio::select! {
                step = steps.recv() => {
                    let Some(step) = step else { break };
                    for message in policy.handle_step(&step).await {
                        send(&self.messages, message).await;
                    }
                }
                _ = &mut deadline, if !self.scope.is_cancelled() => {
                    warn!(performance = %self.id, timeout_ms = self.deadline.as_millis(), "flow timeout elapsed");
                    self.scope.cancel(CancelCause::DeadlineExceeded);
                }
                signal = next_signal(&mut subscription), if !self.scope.is_cancelled() => match signal {
                    Some(()) => {
                        warn!(performance = %self.id, "performance canceled");
                        self.scope.cancel(CancelCause::Requested);
                    }
                    None => subscription = None,
                },
            }
        }

        for message in policy.finish().await {
            send(&self.messages, message).await;
        }
        match self.scope.cause() {
            None => RunTermination::Completed,
            Some(CancelCause::Requested) => RunTermination::Canceled,
            Some(CancelCause::DeadlineExceeded) => RunTermination::TimedOut,
        }
    }
}

async fn next_signal(subscription: &mut Option<CancelSubscription>) -> Option<()> {
    match subscription {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn send(messages: &mpsc::Sender<Message>, message: Message) {
    // the caller may stop listening, the run carries on regardless
    let _ = messages.send(message).await;
}
