//! Collaborator error taxonomies.

use thiserror::Error;

/// Why the scheduling service could not allocate a request against a batch.
///
/// Every variant except `Internal` is recoverable: the matcher moves on to
/// the next waiting request and the refused request stays pending for a
/// future batch.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The request's tasks do not fit the visible offers under its filter.
    #[error("no feasible assignment for request")]
    Unsatisfiable,

    /// A placement constraint explicitly rejected the request.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The scheduling service refused the request for its own reasons.
    #[error("scheduling rejected: {0}")]
    Rejected(String),

    /// The scheduling service itself failed. Not recoverable by retrying
    /// other requests against the same batch.
    #[error("scheduling service internal error: {0}")]
    Internal(String),
}

impl ScheduleError {
    /// Whether the matcher may discard this attempt and try the next
    /// waiting request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ScheduleError::Internal(_))
    }

    /// Short name of the variant, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::Unsatisfiable => "unsatisfiable",
            ScheduleError::Constraint(_) => "constraint",
            ScheduleError::Rejected(_) => "rejected",
            ScheduleError::Internal(_) => "internal",
        }
    }
}

/// Errors surfaced by the cluster framework driver or the event transport.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver not connected to the cluster manager")]
    NotConnected,

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("decline failed: {0}")]
    Decline(String),

    #[error("event stream unavailable: {0}")]
    Subscribe(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_refusals_are_recoverable() {
        assert!(ScheduleError::Unsatisfiable.is_recoverable());
        assert!(ScheduleError::Constraint("rack affinity".into()).is_recoverable());
        assert!(ScheduleError::Rejected("overloaded".into()).is_recoverable());
        assert!(!ScheduleError::Internal("solver crashed".into()).is_recoverable());
    }

    #[test]
    fn kind_names_match_variants() {
        assert_eq!(ScheduleError::Unsatisfiable.kind(), "unsatisfiable");
        assert_eq!(ScheduleError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn errors_render_messages() {
        let err = ScheduleError::Constraint("zone mismatch".into());
        assert_eq!(err.to_string(), "constraint violation: zone mismatch");

        let err = DriverError::Launch("host unreachable".into());
        assert_eq!(err.to_string(), "launch failed: host unreachable");
    }
}
