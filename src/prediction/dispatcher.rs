use super::state::{CompletionFlags, PredictionEvent, PredictionStateMachine};
use super::types::{ExecutionRequest, FailureBody, PredictionRequest};
use crate::{
    Error, Result,
    config::{Config, DeploymentMode},
    deadline::{DEFAULT_PREDICTION_TIMEOUT, with_deadline},
    engine::ExecutionEngine,
    flows::FlowStore,
    origin::is_origin_allowed,
    stream::{SessionRelay, SinkGuard, SinkSender, StreamEvent, StreamRegistry},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Data of the `end` event that closes a successful stream.
pub const STREAM_DONE: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub timeout: Duration,
    pub mode: DeploymentMode,
    pub development: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PREDICTION_TIMEOUT,
            mode: DeploymentMode::Direct,
            development: false,
        }
    }
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.prediction.timeout_ms),
            mode: config.prediction.mode,
            development: config.server.development,
        }
    }
}

/// How a prediction request is to be answered.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Synchronous result.
    Json(Value),
    /// Event stream for a session; execution continues in the background.
    Stream(StreamResponse),
    /// Streaming request from a rejected origin, answered with plain text.
    Forbidden(String),
    Failure(Error),
}

#[derive(Debug)]
pub struct StreamResponse {
    pub session_id: String,
    pub events: mpsc::UnboundedReceiver<StreamEvent>,
}

pub struct PredictionDispatcher {
    flows: Arc<dyn FlowStore>,
    engine: Arc<dyn ExecutionEngine>,
    registry: Arc<StreamRegistry>,
    relay: Arc<dyn SessionRelay>,
    settings: DispatcherSettings,
}

impl PredictionDispatcher {
    pub fn new(
        flows: Arc<dyn FlowStore>,
        engine: Arc<dyn ExecutionEngine>,
        registry: Arc<StreamRegistry>,
        relay: Arc<dyn SessionRelay>,
        settings: DispatcherSettings,
    ) -> Self {
        info!(
            "Prediction dispatcher ready (mode {:?}, timeout {}ms)",
            settings.mode,
            settings.timeout.as_millis()
        );
        Self {
            flows,
            engine,
            registry,
            relay,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Never fails: every error is folded into [`DispatchOutcome::Failure`].
    pub async fn dispatch(&self, request: PredictionRequest) -> DispatchOutcome {
        let mut fsm = PredictionStateMachine::new(request.flow_id.clone());

        let (outcome, event) = match self.route(&mut fsm, request).await {
            Ok(outcome) => (outcome, PredictionEvent::Respond),
            Err(e) => {
                error!("Prediction failed: {}", e);
                (DispatchOutcome::Failure(e), PredictionEvent::Fail)
            }
        };

        if let Err(e) = fsm.transition(event) {
            warn!("Prediction finished outside the expected state: {}", e);
        }
        outcome
    }

    async fn route(
        &self,
        fsm: &mut PredictionStateMachine,
        request: PredictionRequest,
    ) -> Result<DispatchOutcome> {
        let PredictionRequest {
            flow_id,
            workspace_id,
            origin,
            body,
        } = request;

        if flow_id.trim().is_empty() {
            return Err(Error::bad_request("Flow id not provided"));
        }
        let body = body.ok_or_else(|| Error::bad_request("Request body not provided"))?;
        fsm.transition(PredictionEvent::Validate)?;

        let flow = self
            .flows
            .get_flow_by_id(&flow_id, workspace_id.as_deref())
            .await?
            .ok_or_else(|| Error::not_found(format!("Chatflow {flow_id} not found")))?;
        fsm.transition(PredictionEvent::ResolveFlow)?;

        info!(
            "Request originated from {}",
            origin.as_deref().unwrap_or("UNKNOWN ORIGIN")
        );
        let decision = is_origin_allowed(&flow, origin.as_deref())?;
        fsm.transition(PredictionEvent::CheckAuthorization)?;

        let streaming_requested = body.is_streaming_requested();
        if !decision.allowed {
            if streaming_requested {
                return Ok(DispatchOutcome::Forbidden(decision.rejection_message));
            }
            return Err(Error::forbidden(decision.rejection_message));
        }

        let streamable = self.flows.is_streaming_capable(&flow_id).await?;
        let request = ExecutionRequest {
            flow_id,
            workspace_id,
            body,
        };

        if streamable && streaming_requested {
            fsm.transition(PredictionEvent::StartStreaming)?;
            self.start_stream(request).await
        } else {
            fsm.transition(PredictionEvent::StartSynchronous)?;
            debug!("Running flow {} synchronously", request.flow_id);
            let output =
                with_deadline(self.engine.execute(request), self.settings.timeout).await?;
            Ok(DispatchOutcome::Json(serde_json::to_value(output)?))
        }
    }

    async fn start_stream(&self, mut request: ExecutionRequest) -> Result<DispatchOutcome> {
        let session_id = request
            .body
            .session_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request.body.chat_id = Some(session_id.clone());

        // Registered before execution starts so no early event is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = self.registry.register(session_id.clone(), tx.clone());

        let relay = match self.settings.mode {
            DeploymentMode::Queue => {
                self.relay.subscribe(&session_id).await?;
                Some(Arc::clone(&self.relay))
            }
            DeploymentMode::Direct => None,
        };

        info!(
            "Streaming flow {} for session {}",
            request.flow_id, session_id
        );

        let task = StreamTask {
            engine: Arc::clone(&self.engine),
            registry: Arc::clone(&self.registry),
            relay,
            timeout: self.settings.timeout,
            development: self.settings.development,
            session_id: session_id.clone(),
            tx,
            guard,
        };
        tokio::spawn(task.run(request));

        Ok(DispatchOutcome::Stream(StreamResponse {
            session_id,
            events: rx,
        }))
    }
}

/// Background half of a streamed prediction. Owns the sink registration;
/// dropping the task, even by panic, releases it.
struct StreamTask {
    engine: Arc<dyn ExecutionEngine>,
    registry: Arc<StreamRegistry>,
    relay: Option<Arc<dyn SessionRelay>>,
    timeout: Duration,
    development: bool,
    session_id: String,
    tx: SinkSender,
    guard: SinkGuard,
}

impl StreamTask {
    async fn run(self, request: ExecutionRequest) {
        let flags = CompletionFlags::new();
        let execution = with_deadline(self.engine.execute(request), self.timeout);

        let result = tokio::select! {
            result = execution => Some(result),
            _ = self.tx.closed() => None,
        };

        match result {
            Some(Ok(output)) => {
                let chat_id = if output.chat_id.is_empty() {
                    self.session_id.clone()
                } else {
                    output.chat_id.clone()
                };
                match serde_json::to_value(&output) {
                    Ok(payload) => {
                        if flags.resolve_stream() {
                            self.registry.emit_metadata(&chat_id, payload);
                        }
                        if flags.resolve_http() {
                            let _ = self.tx.send(StreamEvent::End(STREAM_DONE.to_string()));
                        }
                    }
                    Err(e) => self.fail(&flags, &Error::from(e)),
                }
            }
            Some(Err(e)) => self.fail(&flags, &e),
            None => {
                info!(
                    "Stream client for session {} disconnected, cancelling execution",
                    self.session_id
                );
                flags.resolve_stream();
                flags.resolve_http();
            }
        }

        self.cleanup().await;
    }

    /// Notifies the session's listener, then answers this request's own
    /// stream with the failure body.
    fn fail(&self, flags: &CompletionFlags, e: &Error) {
        error!("Prediction failed for session {}: {}", self.session_id, e);

        if flags.resolve_stream() {
            self.registry.emit_error(&self.session_id, e.to_string());
        }
        if flags.resolve_http() {
            let body = FailureBody::from_error(e, self.development);
            let data = serde_json::to_string(&body).unwrap_or_else(|_| e.to_string());
            let _ = self.tx.send(StreamEvent::End(data));
        }
    }

    async fn cleanup(self) {
        if let Some(relay) = &self.relay {
            if let Err(e) = relay.unsubscribe(&self.session_id).await {
                warn!("Failed to unsubscribe relay channel {}: {}", self.session_id, e);
            }
        }
        debug!("Releasing stream client for session {}", self.guard.session_id());
        drop(self.guard);
    }
}
