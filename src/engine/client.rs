use crate::{
    Error, Result,
    config::EngineConfig,
    prediction::{ExecutionRequest, PredictionOutput},
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<PredictionOutput>;
}

/// Runs flows on a remote engine over HTTP.
pub struct HttpExecutionEngine {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpExecutionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|k| !k.is_empty()),
        })
    }

    fn execute_url(&self, flow_id: &str) -> String {
        format!("{}/api/v1/execute/{}", self.base_url, flow_id)
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecutionEngine {
    async fn execute(&self, request: ExecutionRequest) -> Result<PredictionOutput> {
        let url = self.execute_url(&request.flow_id);
        debug!("Executing flow {} via {}", request.flow_id, url);

        let mut req_builder = self.client.post(&url).json(&request.body);
        if let Some(ref key) = self.api_key {
            req_builder = req_builder.bearer_auth(key);
        }
        if let Some(ref workspace) = request.workspace_id {
            req_builder = req_builder.header("x-workspace-id", workspace);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| Error::execution(format!("Failed to reach execution engine: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::execution(format!(
                "Execution engine returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let mut output: PredictionOutput = response
            .json()
            .await
            .map_err(|e| Error::execution(format!("Invalid execution engine response: {e}")))?;

        if output.chat_id.is_empty() {
            if let Some(id) = request.body.session_id() {
                output.chat_id = id.to_string();
            }
        }

        debug!("Flow {} finished for chat {}", request.flow_id, output.chat_id);
        Ok(output)
    }
}
