use std::collections::HashMap;

use tokio::sync::RwLock;

use super::Flow;
use crate::errors::FlowStoreError;

/// Persistence sink for flow snapshots.
#[async_trait::async_trait]
pub trait FlowStore: Send + Sync {
    /// Inserts or replaces the flow with the same id.
    async fn upsert_flow(&self, flow: &Flow) -> Result<(), FlowStoreError>;

    async fn get_flow(&self, id: &str) -> Result<Flow, FlowStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<String, Flow>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.flows.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn upsert_flow(&self, flow: &Flow) -> Result<(), FlowStoreError> {
        self.flows.write().await.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn get_flow(&self, id: &str) -> Result<Flow, FlowStoreError> {
        self.flows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FlowStoreError::NotFound { id: id.to_string() })
    }
}
