//! Execution deadlines.
//!
//! [`with_deadline`] races an operation against a timer. Whichever side
//! loses is dropped: a timed-out operation is cancelled at its next
//! suspension point, and a completed operation takes its timer down with
//! it, so no timeout can fire after the race is settled.
//!
//! Cancellation only reaches work owned by the future itself. Anything the
//! operation already handed off (a spawned task, a request in flight on a
//! remote engine) keeps running and its result is discarded.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Deadline applied to every flow execution.
pub const DEFAULT_PREDICTION_TIMEOUT: Duration = Duration::from_millis(60_000);

pub async fn with_deadline<F, T>(operation: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            let duration_ms = duration.as_millis() as u64;
            warn!("Operation abandoned after {}ms deadline", duration_ms);
            Err(Error::Timeout { duration_ms })
        }
    }
}
