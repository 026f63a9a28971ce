use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

// Request states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionState {
    Received,
    Validated,
    FlowResolved,
    AuthorizationChecked,
    Streaming,
    Synchronous,
    Responded,
    Failed,
}

// Request events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionEvent {
    Validate,
    ResolveFlow,
    CheckAuthorization,
    StartStreaming,
    StartSynchronous,
    Respond,
    Fail,
}

pub struct PredictionStateMachine {
    state: PredictionState,
    flow_id: String,
}

impl PredictionStateMachine {
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            state: PredictionState::Received,
            flow_id: flow_id.into(),
        }
    }

    pub fn current_state(&self) -> PredictionState {
        self.state
    }

    pub fn transition(&mut self, event: PredictionEvent) -> Result<()> {
        use PredictionEvent as E;
        use PredictionState as S;

        let new_state = match (self.state, event) {
            (S::Received, E::Validate) => S::Validated,
            (S::Validated, E::ResolveFlow) => S::FlowResolved,
            (S::FlowResolved, E::CheckAuthorization) => S::AuthorizationChecked,
            (S::AuthorizationChecked, E::StartStreaming) => S::Streaming,
            (S::AuthorizationChecked, E::StartSynchronous) => S::Synchronous,
            // A rejected origin is answered straight from the authorization step.
            (S::AuthorizationChecked | S::Streaming | S::Synchronous, E::Respond) => S::Responded,
            (state, E::Fail) if !Self::terminal(state) => S::Failed,
            _ => {
                warn!(
                    "Invalid prediction transition from {:?} with event {:?} (flow {})",
                    self.state, event, self.flow_id
                );
                return Err(Error::InvalidTransition {
                    current: format!("{:?}", self.state),
                    requested: format!("{event:?}"),
                });
            }
        };

        debug!(
            "Prediction state transition: {:?} -> {:?} (flow {})",
            self.state, new_state, self.flow_id
        );
        self.state = new_state;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        Self::terminal(self.state)
    }

    fn terminal(state: PredictionState) -> bool {
        matches!(state, PredictionState::Responded | PredictionState::Failed)
    }
}

/// Completion bookkeeping for a streamed request, which answers on two
/// channels: the HTTP response and the session's event stream. Each flag
/// can be claimed once.
#[derive(Debug, Default)]
pub struct CompletionFlags {
    http: AtomicBool,
    stream: AtomicBool,
}

impl CompletionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the first caller only.
    pub fn resolve_http(&self) -> bool {
        !self.http.swap(true, Ordering::AcqRel)
    }

    /// Returns true for the first caller only.
    pub fn resolve_stream(&self) -> bool {
        !self.stream.swap(true, Ordering::AcqRel)
    }
}
