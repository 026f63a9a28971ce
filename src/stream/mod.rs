mod events;
mod registry;
mod relay;

pub use events::StreamEvent;
pub use registry::{RegistryStats, SinkGuard, SinkSender, StreamRegistry};
pub use relay::{LocalRelay, SessionRelay};
