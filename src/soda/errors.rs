use thiserror::Error;

use super::tracker::PendingOperation;
use super::types::ResultShape;

/// Errors surfaced by workflow operations and the operation tracker
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The service refused the request as malformed (4xx). Never retried.
    #[error("request rejected with HTTP {status}: {detail}")]
    ClientRequest { status: u16, detail: String },

    /// The service returned a definitive failure (5xx). Never retried automatically.
    #[error("server rejected the operation with HTTP {status}: {detail}")]
    ServerRejection { status: u16, detail: String },

    /// Attempt budget ran out while the operation was still running. The outcome
    /// is unknown, not failed: the server may still finish it.
    #[error(
        "operation still processing after {attempts_made} polls of {poll_location}; outcome unknown"
    )]
    PollTimeout {
        poll_location: String,
        attempts_made: u32,
        pending: Box<PendingOperation>,
    },

    #[error("wait cancelled")]
    Cancelled,

    #[error("no outstanding operation to check")]
    NoOutstandingOperation,

    #[error("dataset {dataset_id} still had pending geocoding after {checks} checks")]
    GeocodingWaitExceeded { dataset_id: String, checks: u32 },

    /// The poll location is gone and the original request must not be resubmitted
    #[error("poll location for {uri} is no longer valid and the request cannot be replayed")]
    PollLocationUnavailable { uri: String },

    #[error("operation finished with an unexpected payload (expected {expected})")]
    UnexpectedPayload { expected: ResultShape },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl WorkflowError {
    /// Terminal errors end an operation for good; the outstanding slot is cleared.
    /// Non-terminal ones (cancellation, connection failures) leave it resumable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowError::Cancelled | WorkflowError::Transport(_))
    }

    /// Whether waiting and checking again could change the answer.
    /// `PollTimeout` is final; re-arm it explicitly through [`Self::pending_operation`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Cancelled
                | WorkflowError::Transport(_)
                | WorkflowError::GeocodingWaitExceeded { .. }
        )
    }

    /// The pending operation a timed out poll left behind, if any
    pub fn pending_operation(&self) -> Option<&PendingOperation> {
        match self {
            WorkflowError::PollTimeout { pending, .. } => Some(pending.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        WorkflowError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(WorkflowError::ServerRejection { status: 500, detail: "boom".into() }.is_terminal());
        assert!(WorkflowError::ClientRequest { status: 400, detail: "bad".into() }.is_terminal());
        assert!(!WorkflowError::Cancelled.is_terminal());
        assert!(!WorkflowError::Transport("reset".into()).is_terminal());
    }

    #[test]
    fn test_rejections_are_not_retryable() {
        assert!(!WorkflowError::ServerRejection { status: 503, detail: String::new() }.is_retryable());
        assert!(!WorkflowError::NoOutstandingOperation.is_retryable());
        assert!(WorkflowError::Transport("timed out".into()).is_retryable());
    }

    #[test]
    fn test_poll_timeout_is_final_but_rearmable() {
        let pending = PendingOperation::from_accepted(
            Some("/t/1".into()),
            None,
            crate::soda::WorkflowRequest::publish("abc").unwrap(),
            ResultShape::DatasetInfo,
            &Default::default(),
        );
        let err = WorkflowError::PollTimeout {
            poll_location: "/t/1".into(),
            attempts_made: 60,
            pending: Box::new(pending.clone()),
        };

        assert!(err.is_terminal());
        assert!(!err.is_retryable());
        assert_eq!(err.pending_operation(), Some(&pending));
    }
}
