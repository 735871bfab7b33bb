// soda-workflow library - long-running publishing operations against a data portal
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod http;
pub mod persistence;
pub mod shutdown;
pub mod soda;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, init_config, SodaWorkflowConfig};
pub use http::HttpTransport;
pub use persistence::{OutstandingStore, PersistenceError, SavedOperation};
pub use shutdown::ShutdownCoordinator;
pub use soda::{
    AsyncOperationTracker, DatasetInfo, GeocodingDrainPolicy, GeocodingStatus, OperationOutcome,
    PendingOperation, PollPolicy, ResultShape, SodaWorkflow, Transport, TransportResponse,
    Visibility, WorkflowError, WorkflowPayload, WorkflowRequest,
};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
