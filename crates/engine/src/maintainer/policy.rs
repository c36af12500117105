use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::message::{Message, MessageError};
use crate::flow::{Flow, FlowStore, Reducer};
use crate::performance::Step;

/// Turns the steps of one run into outward messages, with whatever side
/// effects the policy needs.
#[async_trait::async_trait]
pub trait StepsPolicy: Send {
    async fn handle_step(&mut self, step: &Step) -> Vec<Message>;

    /// Called once after the last step.
    async fn finish(&mut self) -> Vec<Message> {
        Vec::new()
    }
}

/// Forwards every step as a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardPolicy;

#[async_trait::async_trait]
impl StepsPolicy for ForwardPolicy {
    async fn handle_step(&mut self, step: &Step) -> Vec<Message> {
        vec![Message::from_step(step)]
    }
}

/// Forwards every step, folds it into a [`Reducer`] and persists the
/// snapshot. Persistence is best effort: a failed or slow save becomes an
/// error message and the run continues.
pub struct SaveEveryStepPolicy {
    reducer: Reducer,
    store: Arc<dyn FlowStore>,
    save_timeout: Duration,
}

impl SaveEveryStepPolicy {
    pub fn new(reducer: Reducer, store: Arc<dyn FlowStore>, save_timeout: Duration) -> Self {
        Self {
            reducer,
            store,
            save_timeout,
        }
    }

    async fn save(&self, flow: &Flow) -> Option<Message> {
        match tokio::time::timeout(self.save_timeout, self.store.upsert_flow(flow)).await {
            Ok(Ok(())) => None,
            Ok(Err(error)) => {
                warn!(flow = %flow.id, error = %error, "saving flow failed");
                Some(Message::from_error(format!("saving flow {}", flow.id), error))
            }
            Err(_) => {
                warn!(flow = %flow.id, timeout_ms = self.save_timeout.as_millis(), "saving flow timed out");
                Some(Message::from_error(
                    format!("saving flow {}", flow.id),
                    MessageError::Other(format!("timed out after {}ms", self.save_timeout.as_millis())),
                ))
            }
        }
    }
}

#[async_trait::async_trait]
impl StepsPolicy for SaveEveryStepPolicy {
    async fn handle_step(&mut self, step: &Step) -> Vec<Message> {
        let mut messages = vec![Message::from_step(step)];
        if let Err(error) = self.reducer.with_step(step) {
            messages.push(Message::from_error(format!("reducing {}", step.slug()), error));
            return messages;
        }
        let flow = self.reducer.reduce();
        messages.extend(self.save(&flow).await);
        messages
    }

    async fn finish(&mut self) -> Vec<Message> {
        let flow = self.reducer.reduce();
        self.save(&flow).await.into_iter().collect()
    }
}
