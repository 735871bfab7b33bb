pub mod errors;
pub mod request;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracker;
pub mod transport;
pub mod types;
pub mod workflow;

pub use errors::WorkflowError;
pub use request::{HttpMethod, WorkflowRequest};
pub use tracker::{AsyncOperationTracker, OperationOutcome, PendingOperation};
pub use transport::{classify_response, PollPolicy, Transport, TransportResponse};
pub use types::{DatasetInfo, GeocodingStatus, ResultShape, Visibility, WorkflowPayload};
pub use workflow::{GeocodingDrainPolicy, OutstandingSlot, SodaWorkflow};
