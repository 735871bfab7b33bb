use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::WorkflowError;
use super::request::{with_query_param, WorkflowRequest};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_BASELINE_RETRY_AFTER: Duration = Duration::from_secs(10);

/// How aggressively accepted operations are polled. Owned by the transport so
/// operators tune it in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub baseline_retry_after: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            baseline_retry_after: DEFAULT_BASELINE_RETRY_AFTER,
        }
    }
}

/// Classified answer to a submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    Ok {
        status: u16,
        body: String,
    },
    /// The server took the request but has not finished it
    Accepted {
        poll_location: Option<String>,
        retry_after: Option<Duration>,
    },
    ClientError {
        status: u16,
        detail: String,
    },
    ServerError {
        status: u16,
        detail: String,
    },
}

/// Request-execution facility the workflow layer runs on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request once. `Err` means no classified answer was obtained
    /// (connection refused, reset, timed out).
    async fn submit(&self, request: &WorkflowRequest) -> Result<TransportResponse, WorkflowError>;

    fn poll_policy(&self) -> PollPolicy;
}

/// Turn a raw HTTP answer into a [`TransportResponse`].
///
/// A 202 is an accepted long-running operation. Its poll location comes from the
/// `Location` header, or failing that from a `ticket` in the JSON body appended
/// to the request URI. With neither, the location is left empty and the caller
/// re-issues the original request to poll.
pub fn classify_response(
    request_uri: &str,
    status: u16,
    location: Option<&str>,
    retry_after: Option<&str>,
    body: String,
) -> TransportResponse {
    match status {
        202 => {
            let poll_location = location
                .map(str::to_string)
                .or_else(|| ticket_from_body(&body).map(|t| with_query_param(request_uri, "ticket", &t)));
            TransportResponse::Accepted {
                poll_location,
                retry_after: retry_after.and_then(parse_retry_after),
            }
        }
        200..=299 => TransportResponse::Ok { status, body },
        400..=499 => TransportResponse::ClientError {
            status,
            detail: error_detail(body),
        },
        _ => TransportResponse::ServerError {
            status,
            detail: error_detail(body),
        },
    }
}

/// Retry-After in whole seconds. HTTP dates are not sent by the service.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn ticket_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("ticket")? {
        serde_json::Value::String(ticket) => Some(ticket.clone()),
        serde_json::Value::Number(ticket) => Some(ticket.to_string()),
        _ => None,
    }
}

fn error_detail(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body)
}
