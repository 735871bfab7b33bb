use anyhow::Result;

use super::{print_payload, CommandContext};
use crate::soda::{OperationOutcome, Transport, Visibility, WorkflowRequest};

pub struct VisibilityCommand {
    pub dataset_id: String,
    pub visibility: Visibility,
    /// Poll an accepted change to completion instead of saving it for later
    pub wait: bool,
}

impl VisibilityCommand {
    pub fn new(dataset_id: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            visibility,
            wait: false,
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub async fn execute<T: Transport>(&self, ctx: &CommandContext<T>) -> Result<()> {
        let origin = WorkflowRequest::set_visibility(&self.dataset_id, self.visibility).ok();
        let label = format!("visibility {} --{}", self.dataset_id, self.visibility);
        println!("🔐 Making {} {}...", self.dataset_id, self.visibility);

        if let Err(e) = ctx.workflow.set_visibility(&self.dataset_id, self.visibility).await {
            return Err(ctx.fail(e, &label, origin.as_ref()).await);
        }

        if ctx.workflow.outstanding().await.is_none() {
            println!("✅ {} is now {}", self.dataset_id, self.visibility);
            return Ok(());
        }

        if !self.wait {
            ctx.save_outstanding(&label).await?;
            println!("⏳ Change accepted and still processing");
            println!("   💾 Saved to {}", ctx.store.path().display());
            println!("   💡 Run 'soda-workflow resume' to wait for it");
            return Ok(());
        }

        println!("⏳ Change accepted, waiting for it to finish...");
        match ctx.workflow.check_outstanding().await {
            OperationOutcome::Success(payload) => {
                println!("✅ {} is now {}", self.dataset_id, self.visibility);
                print_payload(&payload);
                Ok(())
            }
            OperationOutcome::Pending(_) => {
                ctx.save_outstanding(&label).await?;
                println!("⏳ Still processing; run 'soda-workflow resume' later");
                Ok(())
            }
            OperationOutcome::Failure(e) => Err(ctx.fail(e, &label, origin.as_ref()).await),
        }
    }
}
