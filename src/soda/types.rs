use serde::{Deserialize, Serialize};

use super::errors::WorkflowError;

/// Metadata the service returns for a dataset (a "view").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// "published" or "unpublished"
    #[serde(default)]
    pub publication_stage: Option<String>,
    #[serde(default)]
    pub view_type: Option<String>,
    #[serde(default)]
    pub rows_updated_at: Option<i64>,
    /// Everything else the service sent, kept so nothing is lost on re-serialization
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DatasetInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            publication_stage: None,
            view_type: None,
            rows_updated_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.publication_stage.as_deref() == Some("published")
    }
}

/// Pending geocoding counts for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodingStatus {
    /// Number of views on the dataset still waiting for geocoding
    #[serde(default)]
    pub view: u64,
    #[serde(default)]
    pub total: u64,
}

impl GeocodingStatus {
    pub fn pending_views(&self) -> u64 {
        self.view
    }

    pub fn is_drained(&self) -> bool {
        self.view == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// Permission value understood by the service
    pub fn permission_value(&self) -> &'static str {
        match self {
            Visibility::Public => "public.read",
            Visibility::Private => "private",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// What a finished operation is expected to return. Stored with every pending
/// operation so a resumed poll can decode its result without knowing which
/// call started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    DatasetInfo,
    GeocodingStatus,
    Nothing,
}

impl ResultShape {
    pub fn decode(&self, body: &str) -> Result<WorkflowPayload, WorkflowError> {
        match self {
            ResultShape::DatasetInfo => Ok(WorkflowPayload::Dataset(serde_json::from_str(body)?)),
            ResultShape::GeocodingStatus => {
                Ok(WorkflowPayload::Geocoding(serde_json::from_str(body)?))
            }
            ResultShape::Nothing => Ok(WorkflowPayload::Empty),
        }
    }
}

impl std::fmt::Display for ResultShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultShape::DatasetInfo => write!(f, "dataset info"),
            ResultShape::GeocodingStatus => write!(f, "geocoding status"),
            ResultShape::Nothing => write!(f, "empty body"),
        }
    }
}

/// Decoded result of a finished operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowPayload {
    Dataset(DatasetInfo),
    Geocoding(GeocodingStatus),
    Empty,
}

impl WorkflowPayload {
    pub fn into_dataset(self) -> Result<DatasetInfo, WorkflowError> {
        match self {
            WorkflowPayload::Dataset(info) => Ok(info),
            _ => Err(WorkflowError::UnexpectedPayload {
                expected: ResultShape::DatasetInfo,
            }),
        }
    }

    pub fn into_geocoding(self) -> Result<GeocodingStatus, WorkflowError> {
        match self {
            WorkflowPayload::Geocoding(status) => Ok(status),
            _ => Err(WorkflowError::UnexpectedPayload {
                expected: ResultShape::GeocodingStatus,
            }),
        }
    }
}
