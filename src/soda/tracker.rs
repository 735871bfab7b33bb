// Long-running operation tracking: one accepted request, polled to a terminal outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::WorkflowError;
use super::request::WorkflowRequest;
use super::transport::{PollPolicy, Transport, TransportResponse};
use super::types::{ResultShape, WorkflowPayload};

/// An operation the server accepted but has not finished.
///
/// This is a plain value: it can be serialized, reloaded in another process
/// and handed back to [`AsyncOperationTracker::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Where to poll. `None` means the original request is re-issued instead.
    pub poll_location: Option<String>,
    pub retry_after: Duration,
    pub attempts_remaining: u32,
    #[serde(default)]
    pub attempts_made: u32,
    pub original_request: WorkflowRequest,
    pub result_shape: ResultShape,
    pub accepted_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn from_accepted(
        poll_location: Option<String>,
        retry_after: Option<Duration>,
        original_request: WorkflowRequest,
        result_shape: ResultShape,
        policy: &PollPolicy,
    ) -> Self {
        Self {
            poll_location,
            retry_after: retry_after.unwrap_or(policy.baseline_retry_after),
            attempts_remaining: policy.max_attempts,
            attempts_made: 0,
            original_request,
            result_shape,
            accepted_at: Utc::now(),
        }
    }

    /// Copy with a new attempt budget, for re-arming an operation that timed out
    pub fn with_fresh_budget(&self, attempts: u32) -> Self {
        Self {
            attempts_remaining: attempts,
            ..self.clone()
        }
    }

    /// Same accepted request, regardless of how far polling has progressed
    pub fn is_same_operation(&self, other: &PendingOperation) -> bool {
        self.accepted_at == other.accepted_at && self.original_request == other.original_request
    }

    /// Human readable target of the next poll
    pub fn describe_location(&self) -> &str {
        self.poll_location
            .as_deref()
            .unwrap_or(&self.original_request.uri)
    }

    fn timeout_error(&self) -> WorkflowError {
        WorkflowError::PollTimeout {
            poll_location: self.describe_location().to_string(),
            attempts_made: self.attempts_made,
            pending: Box::new(self.clone()),
        }
    }
}

/// Result of driving a workflow call
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Success(T),
    Pending(PendingOperation),
    Failure(WorkflowError),
}

impl<T> OperationOutcome<T> {
    pub fn is_terminal(&self) -> bool {
        match self {
            OperationOutcome::Success(_) => true,
            OperationOutcome::Pending(_) => false,
            OperationOutcome::Failure(err) => err.is_terminal(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            OperationOutcome::Success(value) => OperationOutcome::Success(f(value)),
            OperationOutcome::Pending(pending) => OperationOutcome::Pending(pending),
            OperationOutcome::Failure(err) => OperationOutcome::Failure(err),
        }
    }
}

/// Sleep that gives up as soon as `cancel` fires
pub(crate) async fn cancellable_sleep(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), WorkflowError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Polls accepted operations until they finish, fail, or run out of attempts.
/// Holds no state of its own beyond the transport and the cancellation signal.
pub struct AsyncOperationTracker<'a> {
    transport: &'a dyn Transport,
    cancel: CancellationToken,
}

impl<'a> AsyncOperationTracker<'a> {
    pub fn new(transport: &'a dyn Transport, cancel: CancellationToken) -> Self {
        Self { transport, cancel }
    }

    /// Build the pending operation for an accepted request using the transport's policy
    pub fn create(
        &self,
        poll_location: Option<String>,
        retry_after: Option<Duration>,
        original_request: WorkflowRequest,
        result_shape: ResultShape,
    ) -> PendingOperation {
        let policy = self.transport.poll_policy();
        let pending = PendingOperation::from_accepted(
            poll_location,
            retry_after,
            original_request,
            result_shape,
            &policy,
        );
        info!(
            poll_location = %pending.describe_location(),
            retry_after_ms = pending.retry_after.as_millis() as u64,
            max_attempts = pending.attempts_remaining,
            "Operation accepted by server, tracking until complete"
        );
        pending
    }

    /// Poll until a terminal outcome. Never returns `Pending`.
    pub async fn resolve(&self, mut pending: PendingOperation) -> OperationOutcome<WorkflowPayload> {
        loop {
            match self.poll_once(&mut pending).await {
                OperationOutcome::Pending(_) => continue,
                outcome => return outcome,
            }
        }
    }

    /// Wait out `retry_after`, then check the operation once.
    ///
    /// `pending` is updated in place (attempts, location, next wait) so the
    /// caller can persist it between polls.
    pub async fn poll_once(&self, pending: &mut PendingOperation) -> OperationOutcome<WorkflowPayload> {
        if pending.attempts_remaining == 0 {
            warn!(
                poll_location = %pending.describe_location(),
                attempts_made = pending.attempts_made,
                "Poll budget exhausted"
            );
            return OperationOutcome::Failure(pending.timeout_error());
        }

        if let Err(err) = cancellable_sleep(pending.retry_after, &self.cancel).await {
            info!(poll_location = %pending.describe_location(), "Poll wait cancelled");
            return OperationOutcome::Failure(err);
        }

        pending.attempts_remaining -= 1;
        pending.attempts_made += 1;

        let request = match &pending.poll_location {
            Some(location) => WorkflowRequest::get(location.clone()),
            None if pending.original_request.replayable => pending.original_request.clone(),
            None => {
                return OperationOutcome::Failure(WorkflowError::PollLocationUnavailable {
                    uri: pending.original_request.uri.clone(),
                })
            }
        };

        debug!(
            method = %request.method,
            uri = %request.uri,
            attempt = pending.attempts_made,
            attempts_remaining = pending.attempts_remaining,
            "Polling long-running operation"
        );

        let response = match self.transport.submit(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(uri = %request.uri, error = %err, "Poll request failed");
                return OperationOutcome::Failure(err);
            }
        };

        match response {
            TransportResponse::Ok { body, .. } => match pending.result_shape.decode(&body) {
                Ok(payload) => {
                    info!(
                        attempts_made = pending.attempts_made,
                        "Long-running operation completed"
                    );
                    OperationOutcome::Success(payload)
                }
                Err(err) => OperationOutcome::Failure(err),
            },
            TransportResponse::Accepted {
                poll_location,
                retry_after,
            } => {
                if let Some(location) = poll_location {
                    pending.poll_location = Some(location);
                }
                if let Some(retry_after) = retry_after {
                    pending.retry_after = retry_after;
                }
                self.still_processing(pending)
            }
            TransportResponse::ClientError { status, .. }
                if matches!(status, 404 | 410) && pending.poll_location.is_some() =>
            {
                let expired = pending.poll_location.take().unwrap_or_default();
                if !pending.original_request.replayable {
                    return OperationOutcome::Failure(WorkflowError::PollLocationUnavailable {
                        uri: expired,
                    });
                }
                warn!(
                    expired_location = %expired,
                    "Poll location expired, next attempt re-issues the original request"
                );
                self.still_processing(pending)
            }
            TransportResponse::ClientError { status, detail } => {
                OperationOutcome::Failure(WorkflowError::ClientRequest { status, detail })
            }
            TransportResponse::ServerError { status, detail } => {
                OperationOutcome::Failure(WorkflowError::ServerRejection { status, detail })
            }
        }
    }

    fn still_processing(&self, pending: &PendingOperation) -> OperationOutcome<WorkflowPayload> {
        if pending.attempts_remaining == 0 {
            warn!(
                poll_location = %pending.describe_location(),
                attempts_made = pending.attempts_made,
                "Operation still processing after final poll"
            );
            return OperationOutcome::Failure(pending.timeout_error());
        }
        debug!(
            poll_location = %pending.describe_location(),
            retry_after_ms = pending.retry_after.as_millis() as u64,
            "Operation still processing"
        );
        OperationOutcome::Pending(pending.clone())
    }
}
