use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Url};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ServiceConfig, SodaWorkflowConfig};
use crate::soda::{
    classify_response, HttpMethod, PollPolicy, Transport, TransportResponse, WorkflowError,
    WorkflowRequest,
};

const APP_TOKEN_HEADER: &str = "X-App-Token";

/// Rate-limited HTTP transport for the publishing service
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    app_token: Option<String>,
    credentials: Option<(String, String)>,
    policy: PollPolicy,
}

impl HttpTransport {
    /// Create a transport against `base_url` with default connection settings
    pub fn new(base_url: &str, policy: PollPolicy) -> Result<Self, WorkflowError> {
        let service = ServiceConfig {
            base_url: base_url.to_string(),
            ..ServiceConfig::default()
        };
        Self::with_service(&service, policy)
    }

    /// Build a transport from the service and polling sections of the configuration
    pub fn from_config(config: &SodaWorkflowConfig) -> Result<Self, WorkflowError> {
        Self::with_service(&config.service, config.poll_policy())
    }

    fn with_service(service: &ServiceConfig, policy: PollPolicy) -> Result<Self, WorkflowError> {
        let mut base_url = Url::parse(&service.base_url).map_err(|e| {
            WorkflowError::InvalidRequest(format!("bad base URL {}: {e}", service.base_url))
        })?;
        // keep a path prefix like /portal when joining request paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let per_second = NonZeroU32::new(service.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(service.burst_capacity).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let client = Client::builder()
            .timeout(Duration::from_secs(service.request_timeout_seconds))
            .build()?;

        let credentials = match (&service.username, &service.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            app_token: service.app_token.clone(),
            credentials,
            policy,
        })
    }

    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request URI under the base URL, path prefix included.
    /// Absolute URIs (resolved poll locations) pass through.
    pub(crate) fn resolve(&self, uri: &str) -> Result<Url, WorkflowError> {
        self.base_url
            .join(uri.trim_start_matches('/'))
            .map_err(|e| WorkflowError::InvalidRequest(format!("bad request URI {uri}: {e}")))
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: &WorkflowRequest) -> Result<TransportResponse, WorkflowError> {
        let url = self.resolve(&request.uri)?;

        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let mut builder = self
            .client
            .request(method(request.method), url.clone())
            .header(CONTENT_TYPE, request.content_type.as_str());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(token) = &self.app_token {
            builder = builder.header(APP_TOKEN_HEADER, token.as_str());
        }
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        // a relative Location is relative to the request URL, not the base
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| url.join(v).map(String::from).unwrap_or_else(|_| v.to_string()));
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!(
            method = %request.method,
            url = %url,
            status,
            "Service responded"
        );

        Ok(classify_response(
            &request.uri,
            status,
            location.as_deref(),
            retry_after.as_deref(),
            body,
        ))
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }
}
