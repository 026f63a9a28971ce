use serde::{Deserialize, Serialize};

pub use crate::prediction::FailureBody as ErrorResponse;

/// Workspace of the caller, inserted into request extensions by whatever
/// authentication layer runs in front of the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceId(pub String);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: String,
    pub version: String,
    pub active_streams: usize,
}
