// Scripted transport for exercising workflows without a server - no network side effects

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::errors::WorkflowError;
use super::request::WorkflowRequest;
use super::transport::{PollPolicy, Transport, TransportResponse};

/// A request the scripted transport received, with the (tokio) time it arrived
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub at: Instant,
    pub request: WorkflowRequest,
}

type Scripted = Result<TransportResponse, String>;

/// Transport that answers from queued responses.
///
/// Responses are queued per route: a request is answered by the first route whose
/// pattern occurs in the request URI and still has responses left. An unmatched
/// request fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    recorded: Mutex<Vec<RecordedRequest>>,
    policy: PollPolicy,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn respond(&self, route: &str, response: TransportResponse) {
        self.push(route, Ok(response));
    }

    pub fn fail(&self, route: &str, message: &str) {
        self.push(route, Err(message.to_string()));
    }

    fn push(&self, route: &str, scripted: Scripted) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        match routes.iter_mut().find(|(pattern, _)| pattern == route) {
            Some((_, queue)) => queue.push_back(scripted),
            None => routes.push((route.to_string(), VecDeque::from([scripted]))),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests whose URI contains `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.request.uri.contains(pattern))
            .count()
    }

    pub fn ok_body(body: &str) -> TransportResponse {
        TransportResponse::Ok {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn ok_json<T: Serialize>(value: &T) -> TransportResponse {
        TransportResponse::Ok {
            status: 200,
            body: serde_json::to_string(value).unwrap_or_default(),
        }
    }

    pub fn accepted(poll_location: Option<&str>, retry_after: Option<Duration>) -> TransportResponse {
        TransportResponse::Accepted {
            poll_location: poll_location.map(str::to_string),
            retry_after,
        }
    }

    pub fn client_error(status: u16, detail: &str) -> TransportResponse {
        TransportResponse::ClientError {
            status,
            detail: detail.to_string(),
        }
    }

    pub fn server_error(status: u16, detail: &str) -> TransportResponse {
        TransportResponse::ServerError {
            status,
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, request: &WorkflowRequest) -> Result<TransportResponse, WorkflowError> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                at: Instant::now(),
                request: request.clone(),
            });

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let next = routes
            .iter_mut()
            .find(|(pattern, queue)| request.uri.contains(pattern.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(WorkflowError::Transport(message)),
            None => Err(WorkflowError::Transport(format!(
                "no scripted response for {} {}",
                request.method, request.uri
            ))),
        }
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }
}
