use serde_json::Value;

/// A typed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Metadata(Value),
    Error(String),
    End(String),
}

impl StreamEvent {
    /// Wire name, used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Metadata(_) => "metadata",
            Self::Error(_) => "error",
            Self::End(_) => "end",
        }
    }

    pub fn data(&self) -> String {
        match self {
            Self::Metadata(value) => value.to_string(),
            Self::Token(data) | Self::Error(data) | Self::End(data) => data.clone(),
        }
    }
}
