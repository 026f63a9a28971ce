//! Per-flow origin allow-lists.
//!
//! Only the URL host component is compared; scheme and path are ignored,
//! so `http://a.com` admits `https://a.com/page`. An explicit non-default
//! port is part of the host.

use crate::{Error, Result, flows::FlowDescriptor};
use tracing::debug;
use url::Url;

pub const DEFAULT_REJECTION_MESSAGE: &str = "This site is not allowed to access this chatbot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginDecision {
    pub allowed: bool,
    pub rejection_message: String,
}

impl Default for OriginDecision {
    fn default() -> Self {
        Self {
            allowed: true,
            rejection_message: DEFAULT_REJECTION_MESSAGE.to_string(),
        }
    }
}

/// Fails when the flow's chatbot configuration is not valid JSON, or when an
/// active allow-list meets an origin header that is not a URL.
pub fn is_origin_allowed(
    flow: &FlowDescriptor,
    origin_header: Option<&str>,
) -> Result<OriginDecision> {
    let mut decision = OriginDecision::default();

    let Some(config) = flow.chatbot_config()? else {
        return Ok(decision);
    };

    if let Some(message) = config.allowed_origins_error.filter(|m| !m.is_empty()) {
        decision.rejection_message = message;
    }

    // An allow-list whose first entry is blank was set and then cleared.
    let configured = config
        .allowed_origins
        .first()
        .is_some_and(|first| !first.is_empty());

    if let (true, Some(origin)) = (configured, origin_header) {
        let origin_host = host_of(origin)
            .ok_or_else(|| Error::bad_request(format!("Invalid origin header: {origin}")))?;
        decision.allowed = config
            .allowed_origins
            .iter()
            .filter_map(|entry| host_of(entry))
            .any(|allowed| allowed == origin_host);

        debug!(
            "Origin {} {} for flow {}",
            origin,
            if decision.allowed { "allowed" } else { "rejected" },
            flow.id
        );
    }

    Ok(decision)
}

fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
