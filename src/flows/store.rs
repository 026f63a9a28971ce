use super::FlowDescriptor;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait FlowStore: Send + Sync {
    /// With a workspace id, only flows owned by that workspace are visible.
    async fn get_flow_by_id(
        &self,
        id: &str,
        workspace_id: Option<&str>,
    ) -> Result<Option<FlowDescriptor>>;

    async fn is_streaming_capable(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<String, FlowDescriptor>>,
}

impl InMemoryFlowStore {
    pub fn new(flows: impl IntoIterator<Item = FlowDescriptor>) -> Self {
        let flows = flows.into_iter().map(|f| (f.id.clone(), f)).collect();
        Self {
            flows: RwLock::new(flows),
        }
    }

    pub fn insert(&self, flow: FlowDescriptor) {
        if let Ok(mut flows) = self.flows.write() {
            flows.insert(flow.id.clone(), flow);
        }
    }

    pub fn len(&self) -> usize {
        self.flows.read().map(|f| f.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &str) -> Result<Option<FlowDescriptor>> {
        let flows = self
            .flows
            .read()
            .map_err(|e| crate::Error::internal(format!("Flow store lock poisoned: {e}")))?;
        Ok(flows.get(id).cloned())
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get_flow_by_id(
        &self,
        id: &str,
        workspace_id: Option<&str>,
    ) -> Result<Option<FlowDescriptor>> {
        let flow = self.lookup(id)?.filter(|flow| match workspace_id {
            Some(ws) => flow.workspace_id.as_deref() == Some(ws),
            None => true,
        });

        debug!(
            "Flow lookup {} (workspace {:?}): {}",
            id,
            workspace_id,
            if flow.is_some() { "found" } else { "missing" }
        );
        Ok(flow)
    }

    async fn is_streaming_capable(&self, id: &str) -> Result<bool> {
        Ok(self.lookup(id)?.is_some_and(|flow| flow.streaming))
    }
}
