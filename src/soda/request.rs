// Replayable request descriptions and the endpoint builders for each workflow action

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::errors::WorkflowError;
use super::types::Visibility;

pub const JSON_CONTENT_TYPE: &str = "application/json";

const VIEWS_PATH: &str = "/api/views";
const GEOCODING_PATH: &str = "/api/geocoding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
        }
    }
}

/// One HTTP call, kept as data so it can be issued again later (after a
/// restart, or when the server drops the poll location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub method: HttpMethod,
    /// Path and query, relative to the service base URL, or an absolute URL
    pub uri: String,
    pub content_type: String,
    pub body: Option<String>,
    /// False for calls that must never be resubmitted from scratch
    pub replayable: bool,
}

impl WorkflowRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            uri: uri.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: None,
            replayable: true,
        }
    }

    pub fn post(uri: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            uri: uri.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: Some(body.into()),
            replayable: true,
        }
    }

    pub fn put(uri: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Put,
            uri: uri.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: Some(body.into()),
            replayable: true,
        }
    }

    pub fn non_replayable(mut self) -> Self {
        self.replayable = false;
        self
    }

    pub fn publish(dataset_id: &str) -> Result<Self, WorkflowError> {
        let id = checked_id(dataset_id)?;
        Ok(Self::post(
            format!("{VIEWS_PATH}/{id}/publication"),
            format!("viewId={id}"),
        ))
    }

    /// Copying is not idempotent: a resubmission would create a second copy
    pub fn create_working_copy(dataset_id: &str) -> Result<Self, WorkflowError> {
        let id = checked_id(dataset_id)?;
        Ok(Self::post(
            format!("{VIEWS_PATH}/{id}/publication.json?method=copy"),
            "method=copy",
        )
        .non_replayable())
    }

    pub fn set_visibility(dataset_id: &str, visibility: Visibility) -> Result<Self, WorkflowError> {
        let id = checked_id(dataset_id)?;
        Ok(Self::put(
            format!(
                "{VIEWS_PATH}/{id}?accessType=WEBSITE&method=setPermission&value={}",
                visibility.permission_value()
            ),
            "method=setPermission",
        ))
    }

    pub fn pending_geocoding(dataset_id: &str) -> Result<Self, WorkflowError> {
        let id = checked_id(dataset_id)?;
        Ok(Self::get(format!("{GEOCODING_PATH}/{id}?method=pending")))
    }
}

/// Append a form-encoded query parameter to a URI that may already carry a
/// query string. Any fragment on `uri` is dropped.
pub fn with_query_param(uri: &str, key: &str, value: &str) -> String {
    let base = uri.split('#').next().unwrap_or(uri);
    let pair: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{pair}")
}

fn checked_id(dataset_id: &str) -> Result<&str, WorkflowError> {
    let valid = !dataset_id.is_empty()
        && dataset_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(dataset_id)
    } else {
        Err(WorkflowError::InvalidRequest(format!(
            "'{dataset_id}' is not a valid dataset id"
        )))
    }
}
