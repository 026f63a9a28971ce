pub mod handlers;
pub mod middleware;
pub mod types;

use crate::{
    Result,
    config::Config,
    engine::HttpExecutionEngine,
    flows::{FlowDescriptor, InMemoryFlowStore},
    prediction::{DispatcherSettings, PredictionDispatcher},
    ratelimit::RateLimiterManager,
    stream::{LocalRelay, StreamRegistry},
};
use axum::{
    Router,
    routing::{get, post},
};
use handlers::AppState;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub fn router(state: AppState) -> Router {
    let prediction = Router::new()
        .route("/api/v1/prediction/:flow_id", post(handlers::create_prediction))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));

    // Origin checks are per flow, so CORS itself stays open.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(prediction)
        .route("/api/v1/prediction", post(handlers::create_prediction))
        .route("/api/v1/ping", get(handlers::ping))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn build_state(config: &Config) -> Result<AppState> {
    let flows = InMemoryFlowStore::new(config.flows.iter().cloned().map(FlowDescriptor::from));
    info!("Loaded {} flows", flows.len());

    let engine = HttpExecutionEngine::new(config.engine.clone())?;
    let registry = Arc::new(StreamRegistry::new());
    let relay = LocalRelay::new(registry.clone());

    let dispatcher = PredictionDispatcher::new(
        Arc::new(flows),
        Arc::new(engine),
        registry,
        Arc::new(relay),
        DispatcherSettings::from_config(config),
    );

    Ok(AppState {
        dispatcher: Arc::new(dispatcher),
        rate_limiter: Arc::new(RateLimiterManager::from_config(config)),
    })
}

pub async fn run(config: Config) -> Result<()> {
    let app = router(build_state(&config)?);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
