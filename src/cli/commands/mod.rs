use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SodaWorkflowConfig;
use crate::http::HttpTransport;
use crate::persistence::OutstandingStore;
use crate::soda::{
    DatasetInfo, SodaWorkflow, Transport, WorkflowError, WorkflowPayload, WorkflowRequest,
};

pub mod copy;
pub mod geocoding;
pub mod publish;
pub mod resume;
pub mod visibility;

/// Everything a command needs: the workflow and where interrupted work is saved
pub struct CommandContext<T: Transport> {
    pub workflow: SodaWorkflow<T>,
    pub store: OutstandingStore,
    /// Polls granted to a resumed operation that had already used up its own
    pub resume_budget: u32,
}

impl<T: Transport> CommandContext<T> {
    pub fn new(workflow: SodaWorkflow<T>, store: OutstandingStore, resume_budget: u32) -> Self {
        Self {
            workflow,
            store,
            resume_budget,
        }
    }

    /// Save the operation behind `err` if it can still be picked up again.
    /// With `origin` set, only an operation started by that request is saved;
    /// anything else in the slot (say, publish's geocoding check) is not the
    /// work the label describes. Returns whether anything was saved.
    pub async fn preserve(
        &self,
        err: &WorkflowError,
        label: &str,
        origin: Option<&WorkflowRequest>,
    ) -> Result<bool> {
        let pending = match err {
            WorkflowError::PollTimeout { .. } => err.pending_operation().cloned(),
            WorkflowError::Cancelled | WorkflowError::Transport(_) => {
                self.workflow.outstanding().await
            }
            _ => None,
        };

        match pending {
            Some(pending) if origin.map_or(true, |req| *req == pending.original_request) => {
                self.store.save(&pending, Some(label)).await?;
                Ok(true)
            }
            Some(pending) => {
                debug!(
                    label,
                    uri = %pending.original_request.uri,
                    "Not saving operation started by a different request"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Report a failed operation, saving it first when it is resumable
    pub async fn fail(
        &self,
        err: WorkflowError,
        label: &str,
        origin: Option<&WorkflowRequest>,
    ) -> anyhow::Error {
        println!("❌ {label} failed: {err}");
        match self.preserve(&err, label, origin).await {
            Ok(true) => {
                println!("   💾 Saved outstanding operation to {}", self.store.path().display());
                println!("   💡 Run 'soda-workflow resume' to continue polling");
            }
            Ok(false) if !err.is_terminal() => {
                println!("   💡 Nothing to resume; run 'soda-workflow {label}' again");
            }
            Ok(false) => {}
            Err(e) => warn!("Could not save outstanding operation: {}", e),
        }
        anyhow::Error::new(err).context(format!("{label} failed"))
    }

    /// Save whatever a deferred operation left in the workflow's slot
    pub async fn save_outstanding(&self, label: &str) -> Result<bool> {
        match self.workflow.outstanding().await {
            Some(pending) => {
                self.store.save(&pending, Some(label)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Build the HTTP-backed command context from configuration
pub fn connect(
    config: &SodaWorkflowConfig,
    cancel: CancellationToken,
) -> Result<CommandContext<HttpTransport>> {
    print!("🔄 Connecting to {}... ", config.service.base_url);
    std::io::Write::flush(&mut std::io::stdout())?;

    match HttpTransport::from_config(config) {
        Ok(transport) => {
            println!("✅");
            let workflow = SodaWorkflow::new(transport)
                .with_geocoding_policy(config.geocoding_policy())
                .with_cancellation(cancel);
            Ok(CommandContext::new(
                workflow,
                OutstandingStore::new(&config.persistence.state_file),
                config.polling.max_attempts,
            ))
        }
        Err(e) => {
            println!("❌ Failed to set up transport: {e}");
            Err(e.into())
        }
    }
}

pub(crate) fn print_dataset(info: &DatasetInfo) {
    println!("   📋 Dataset: {}", info.id);
    if let Some(name) = &info.name {
        println!("   🏷️  Name: {}", name);
    }
    if let Some(stage) = &info.publication_stage {
        println!("   📦 Stage: {}", stage);
    }
}

pub(crate) fn print_payload(payload: &WorkflowPayload) {
    match payload {
        WorkflowPayload::Dataset(info) => print_dataset(info),
        WorkflowPayload::Geocoding(status) => {
            println!(
                "   🌍 Geocoding: {} pending of {} total",
                status.pending_views(),
                status.total
            );
        }
        WorkflowPayload::Empty => println!("   ✅ Completed"),
    }
}

pub async fn show_how_to_use() -> Result<()> {
    println!("🗂️  soda-workflow - Dataset publishing workflow");
    println!();
    println!("Commands:");
    println!("  🚀 soda-workflow publish <id>                 # Publish once geocoding drains");
    println!("  📄 soda-workflow copy <id>                    # Create a working copy");
    println!("  🔐 soda-workflow visibility <id> --public     # Change who can see a dataset");
    println!("  🌍 soda-workflow geocoding <id> [--wait]      # Check pending geocoding");
    println!("  🔁 soda-workflow resume                       # Continue an interrupted operation");
    println!();
    println!("💡 Set SODA_WORKFLOW_SERVICE__BASE_URL or write soda-workflow.toml to pick a portal");
    Ok(())
}
