use super::types::{ErrorResponse, PingResponse, WorkspaceId};
use crate::{
    Error,
    prediction::{DispatchOutcome, PredictionBody, PredictionDispatcher, PredictionRequest, StreamResponse},
    ratelimit::RateLimiterManager,
    stream::StreamEvent,
};
use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<PredictionDispatcher>,
    pub rate_limiter: Arc<RateLimiterManager>,
}

impl AppState {
    pub fn development(&self) -> bool {
        self.dispatcher.settings().development
    }
}

pub async fn create_prediction(
    State(state): State<AppState>,
    flow_id: Option<Path<String>>,
    workspace: Option<Extension<WorkspaceId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let flow_id = flow_id.map(|Path(id)| id).unwrap_or_default();
    info!("Received prediction request for flow: {}", flow_id);

    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => return failure_response(StatusCode::INTERNAL_SERVER_ERROR, &e, state.development()),
    };

    let request = PredictionRequest {
        flow_id,
        workspace_id: workspace.map(|Extension(WorkspaceId(id))| id),
        origin: headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    };

    match state.dispatcher.dispatch(request).await {
        DispatchOutcome::Json(value) => Json(value).into_response(),
        DispatchOutcome::Stream(stream) => stream_response(stream),
        DispatchOutcome::Forbidden(message) => (StatusCode::FORBIDDEN, message).into_response(),
        DispatchOutcome::Failure(e) => {
            failure_response(StatusCode::INTERNAL_SERVER_ERROR, &e, state.development())
        }
    }
}

pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse {
        status: "pong".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_streams: state.dispatcher.registry().len(),
    })
}

/// An empty body is "not provided"; anything else must be a JSON object.
fn parse_body(raw: &[u8]) -> crate::Result<Option<PredictionBody>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(raw)
        .map(Some)
        .map_err(|e| Error::bad_request(format!("Invalid request body: {e}")))
}

pub fn failure_response(status: StatusCode, error: &Error, development: bool) -> Response {
    (status, Json(ErrorResponse::from_error(error, development))).into_response()
}

fn stream_response(stream: StreamResponse) -> Response {
    debug!("Opening event stream for session {}", stream.session_id);

    let events = UnboundedReceiverStream::new(stream.events).map(|event: StreamEvent| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.data().replace('\r', "")),
        )
    });

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));

    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}
