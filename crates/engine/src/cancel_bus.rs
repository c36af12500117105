//! Cancellation publish/subscribe keyed by performance id.

use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::errors::CancelBusError;

/// Signals arriving on a subscription. Each received unit is one cancel
/// request.
pub type CancelSubscription = mpsc::Receiver<()>;

#[async_trait::async_trait]
pub trait CancelBus: Send + Sync {
    async fn publish_cancel(&self, id: &str) -> Result<(), CancelBusError>;

    async fn subscribe_cancel(&self, id: &str) -> Result<CancelSubscription, CancelBusError>;
}

/// Fans each publish out to the live subscribers of the id.
#[derive(Debug, Default)]
pub struct InMemoryCancelBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<()>>>>,
}

impl InMemoryCancelBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CancelBus for InMemoryCancelBus {
    async fn publish_cancel(&self, id: &str) -> Result<(), CancelBusError> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(senders) = subscribers.get_mut(id) else {
            debug!(performance = %id, "cancel published without subscribers");
            return Ok(());
        };
        senders.retain(|sender| !sender.is_closed());
        for sender in senders.iter() {
            // a full buffer already holds a pending cancel
            let _ = sender.try_send(());
        }
        debug!(performance = %id, subscribers = senders.len(), "cancel published");
        if senders.is_empty() {
            subscribers.remove(id);
        }
        Ok(())
    }

    async fn subscribe_cancel(&self, id: &str) -> Result<CancelSubscription, CancelBusError> {
        let (sender, receiver) = mpsc::channel(1);
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|_, senders| {
            senders.retain(|sender| !sender.is_closed());
            !senders.is_empty()
        });
        subscribers.entry(id.to_string()).or_default().push(sender);
        Ok(receiver)
    }
}
