mod store;
mod types;

pub use store::{FlowStore, InMemoryFlowStore};
pub use types::{ChatbotConfig, FlowDescriptor};
