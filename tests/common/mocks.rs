use async_trait::async_trait;
use flow_gateway::{
    Error, Result,
    engine::ExecutionEngine,
    prediction::{ExecutionRequest, PredictionOutput},
    stream::{SessionRelay, StreamEvent, StreamRegistry},
};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock engine does when asked to execute a flow.
#[derive(Debug, Clone)]
pub enum EngineBehavior {
    /// Answer with `{"text": ...}` under the request's session id.
    Respond(String),
    /// Answer under a chat id of the engine's choosing.
    RespondAs { chat_id: String, text: String },
    Fail(String),
    /// Never finish.
    Hang,
    /// Finish after a delay.
    Delay(Duration, String),
}

/// Sets a flag when dropped, so tests can tell an execution was cancelled.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Mock execution engine for testing
pub struct MockExecutionEngine {
    pub behavior: Mutex<EngineBehavior>,
    pub requests: Arc<Mutex<Vec<ExecutionRequest>>>,
    /// Emits a token on the session's stream before answering.
    pub token_registry: Option<Arc<StreamRegistry>>,
    pub dropped: Arc<AtomicBool>,
}

impl MockExecutionEngine {
    pub fn new(behavior: EngineBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            requests: Arc::new(Mutex::new(Vec::new())),
            token_registry: None,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn responding(text: &str) -> Self {
        Self::new(EngineBehavior::Respond(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::new(EngineBehavior::Fail(message.to_string()))
    }

    pub fn hanging() -> Self {
        Self::new(EngineBehavior::Hang)
    }

    pub fn with_tokens(mut self, registry: Arc<StreamRegistry>) -> Self {
        self.token_registry = Some(registry);
        self
    }

    pub fn get_requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

fn output(chat_id: String, text: String) -> PredictionOutput {
    let mut payload = Map::new();
    payload.insert("text".to_string(), Value::String(text));
    PredictionOutput { chat_id, payload }
}

#[async_trait]
impl ExecutionEngine for MockExecutionEngine {
    async fn execute(&self, request: ExecutionRequest) -> Result<PredictionOutput> {
        self.requests.lock().unwrap().push(request.clone());
        let behavior = self.behavior.lock().unwrap().clone();
        let chat_id = request.body.session_id().unwrap_or_default().to_string();

        if let Some(registry) = &self.token_registry {
            registry.emit(&chat_id, StreamEvent::Token("partial".to_string()));
        }

        match behavior {
            EngineBehavior::Respond(text) => Ok(output(chat_id, text)),
            EngineBehavior::RespondAs { chat_id, text } => Ok(output(chat_id, text)),
            EngineBehavior::Fail(message) => Err(Error::execution(message)),
            EngineBehavior::Hang => {
                let _flag = DropFlag(self.dropped.clone());
                std::future::pending().await
            }
            EngineBehavior::Delay(delay, text) => {
                let _flag = DropFlag(self.dropped.clone());
                tokio::time::sleep(delay).await;
                Ok(output(chat_id, text))
            }
        }
    }
}

/// Relay that records subscription calls.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    pub calls: Mutex<Vec<String>>,
    pub fail_subscribe: bool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_subscribe: true,
        }
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRelay for RecordingRelay {
    async fn subscribe(&self, session_id: &str) -> Result<()> {
        if self.fail_subscribe {
            return Err(Error::internal("relay unavailable"));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("subscribe:{session_id}"));
        Ok(())
    }

    async fn unsubscribe(&self, session_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unsubscribe:{session_id}"));
        Ok(())
    }
}

pub fn sample_payload() -> Value {
    json!({"question": "What is the weather?", "history": []})
}
