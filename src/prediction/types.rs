use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound prediction call as seen by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct PredictionRequest {
    pub flow_id: String,
    pub workspace_id: Option<String>,
    pub origin: Option<String>,
    pub body: Option<PredictionBody>,
}

/// Request body. Named fields are the ones the gateway reads; everything
/// else is passed through to the execution engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_config: Option<OverrideConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PredictionBody {
    /// Accepts both `true` and `"true"`.
    pub fn is_streaming_requested(&self) -> bool {
        match &self.streaming {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag == "true",
            _ => false,
        }
    }

    /// Existing chat id, then `overrideConfig.sessionId`. Empty strings
    /// count as absent.
    pub fn session_id(&self) -> Option<&str> {
        self.chat_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.override_config
                    .as_ref()
                    .and_then(|c| c.session_id.as_deref())
                    .filter(|id| !id.is_empty())
            })
    }
}

/// What the execution engine receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub flow_id: String,
    pub workspace_id: Option<String>,
    pub body: PredictionBody,
}

/// Engine result: the conversation id plus whatever the flow produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutput {
    #[serde(default)]
    pub chat_id: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Uniform failure document: `{"success": false, "message": ..., "stack"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBody {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl FailureBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stack: None,
        }
    }

    /// `stack` carries the error's debug rendering in development mode only.
    pub fn from_error(error: &Error, development: bool) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            stack: development.then(|| error.detail()),
        }
    }
}
