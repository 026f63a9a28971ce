use crate::{Error, Result, config::FlowConfig};
use serde::{Deserialize, Serialize};

/// A stored flow as seen by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDescriptor {
    pub id: String,
    pub name: String,
    pub workspace_id: Option<String>,
    pub streaming: bool,
    pub chatbot_config: Option<String>,
}

/// The parts of a flow's chatbot configuration the gateway reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_origins_error: Option<String>,
}

impl ChatbotConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::internal(format!("Invalid chatbot configuration: {e}")))
    }
}

impl FlowDescriptor {
    pub fn chatbot_config(&self) -> Result<Option<ChatbotConfig>> {
        match self.chatbot_config.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => ChatbotConfig::parse(raw).map(Some),
        }
    }
}

impl From<FlowConfig> for FlowDescriptor {
    fn from(config: FlowConfig) -> Self {
        let name = if config.name.is_empty() {
            config.id.clone()
        } else {
            config.name
        };
        Self {
            id: config.id,
            name,
            workspace_id: config.workspace_id,
            streaming: config.streaming,
            chatbot_config: config.chatbot_config,
        }
    }
}
