//! Placement engine error types.

use thiserror::Error;

use berth_driver::{DriverError, ScheduleError};

/// Errors that can occur while matching and launching task requests.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No pending request fits the current offer batch. Expected and
    /// frequent; the batch is declined and the engine waits for the next.
    #[error("no pending request matches the offer batch")]
    NoMatch,

    #[error("scheduling service error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("framework driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("launch fan-out aborted: {0}")]
    LaunchAborted(String),

    /// The request hit the configured `max_schedule_failures` bound.
    #[error("request exhausted its scheduling retries")]
    RetriesExhausted,

    /// The scheduler was shut down while the request was still waiting.
    #[error("scheduler shut down before the request was placed")]
    ShutDown,

    /// The scheduler was dropped without resolving the request.
    #[error("scheduler dropped without resolving the request")]
    Abandoned,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
