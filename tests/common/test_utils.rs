use super::mocks::{MockExecutionEngine, RecordingRelay};
use axum::Router;
use flow_gateway::{
    Result,
    config::{Config, DeploymentMode, EngineConfig, LogsConfig, PredictionConfig, RateLimitConfig, ServerConfig},
    flows::{FlowDescriptor, InMemoryFlowStore},
    prediction::{DispatcherSettings, PredictionBody, PredictionDispatcher, PredictionRequest},
    ratelimit::RateLimiterManager,
    server::{self, handlers::AppState},
    stream::{StreamEvent, StreamRegistry},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::{fs, sync::mpsc};

/// Create a test configuration with sensible defaults
pub fn create_test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            logs: LogsConfig {
                level: "debug".to_string(),
            },
            development: false,
        },
        prediction: PredictionConfig {
            timeout_ms: 60_000,
            mode: DeploymentMode::Direct,
        },
        engine: EngineConfig {
            base_url: "http://localhost:4000".to_string(),
            api_key: Some("test-api-key".to_string()),
            request_timeout_ms: 5_000,
        },
        rate_limit: RateLimitConfig::default(),
        flows: vec![],
    }
}

pub fn flow(id: &str) -> FlowDescriptor {
    FlowDescriptor {
        id: id.to_string(),
        name: format!("{id} flow"),
        workspace_id: None,
        streaming: false,
        chatbot_config: None,
    }
}

pub fn streaming_flow(id: &str) -> FlowDescriptor {
    FlowDescriptor {
        streaming: true,
        ..flow(id)
    }
}

pub fn with_origins(mut flow: FlowDescriptor, origins: &[&str], error: Option<&str>) -> FlowDescriptor {
    let config = serde_json::json!({
        "allowedOrigins": origins,
        "allowedOriginsError": error,
    });
    flow.chatbot_config = Some(config.to_string());
    flow
}

pub fn settings(mode: DeploymentMode) -> DispatcherSettings {
    DispatcherSettings {
        mode,
        ..DispatcherSettings::default()
    }
}

pub struct TestHarness {
    pub dispatcher: Arc<PredictionDispatcher>,
    pub engine: Arc<MockExecutionEngine>,
    pub registry: Arc<StreamRegistry>,
    pub relay: Arc<RecordingRelay>,
    pub flow_ids: Vec<String>,
}

pub fn build_harness(
    flows: Vec<FlowDescriptor>,
    engine: MockExecutionEngine,
    settings: DispatcherSettings,
) -> TestHarness {
    assemble(Arc::new(StreamRegistry::new()), flows, engine, settings, RecordingRelay::new())
}

/// The registry is passed in so a mock engine can emit tokens through it.
pub fn build_harness_on(
    registry: Arc<StreamRegistry>,
    flows: Vec<FlowDescriptor>,
    engine: MockExecutionEngine,
    settings: DispatcherSettings,
) -> TestHarness {
    assemble(registry, flows, engine, settings, RecordingRelay::new())
}

pub fn build_harness_with_relay(
    flows: Vec<FlowDescriptor>,
    engine: MockExecutionEngine,
    settings: DispatcherSettings,
    relay: RecordingRelay,
) -> TestHarness {
    assemble(Arc::new(StreamRegistry::new()), flows, engine, settings, relay)
}

fn assemble(
    registry: Arc<StreamRegistry>,
    flows: Vec<FlowDescriptor>,
    engine: MockExecutionEngine,
    settings: DispatcherSettings,
    relay: RecordingRelay,
) -> TestHarness {
    let engine = Arc::new(engine);
    let relay = Arc::new(relay);
    let flow_ids = flows.iter().map(|f| f.id.clone()).collect();
    let dispatcher = PredictionDispatcher::new(
        Arc::new(InMemoryFlowStore::new(flows)),
        engine.clone(),
        registry.clone(),
        relay.clone(),
        settings,
    );

    TestHarness {
        dispatcher: Arc::new(dispatcher),
        engine,
        registry,
        relay,
        flow_ids,
    }
}

impl TestHarness {
    pub fn app(&self, rate_limit: RateLimitConfig) -> Router {
        self.app_with_limiter(self.rate_limiter(rate_limit))
    }

    /// Limiter that knows every flow in the harness, as `build_state` does.
    pub fn rate_limiter(&self, rate_limit: RateLimitConfig) -> Arc<RateLimiterManager> {
        let limiter = RateLimiterManager::new(rate_limit);
        for id in &self.flow_ids {
            limiter.register_flow(id, None);
        }
        Arc::new(limiter)
    }

    pub fn app_with_limiter(&self, rate_limiter: Arc<RateLimiterManager>) -> Router {
        server::router(AppState {
            dispatcher: self.dispatcher.clone(),
            rate_limiter,
        })
    }

    /// Polls until every stream registration has been released.
    pub async fn wait_for_streams_released(&self) {
        for _ in 0..200 {
            if self.registry.is_empty() {
                let stats = self.registry.stats();
                if stats.registered == stats.released {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("stream registrations were not released: {:?}", self.registry.stats());
    }
}

pub fn request(flow_id: &str, body: Value) -> PredictionRequest {
    PredictionRequest {
        flow_id: flow_id.to_string(),
        workspace_id: None,
        origin: None,
        body: Some(body_from(body)),
    }
}

pub fn body_from(value: Value) -> PredictionBody {
    serde_json::from_value(value).expect("valid prediction body")
}

/// Drains a stream until the sender side closes.
pub async fn collect_events(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Splits a raw `text/event-stream` body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, String)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut event = None;
            let mut data = Vec::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }
            event.map(|e| (e, data.join("\n")))
        })
        .collect()
}

/// Create a temporary directory for test files
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test config YAML file
pub async fn create_test_config_file(dir: &TempDir, content: &str) -> Result<String> {
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, content).await?;
    Ok(config_path.to_string_lossy().to_string())
}
