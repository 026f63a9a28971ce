mod dispatcher;
pub mod state;
mod types;

pub use dispatcher::{
    DispatchOutcome, DispatcherSettings, PredictionDispatcher, STREAM_DONE, StreamResponse,
};
pub use state::{CompletionFlags, PredictionEvent, PredictionState, PredictionStateMachine};
pub use types::{
    ExecutionRequest, FailureBody, OverrideConfig, PredictionBody, PredictionOutput,
    PredictionRequest,
};
