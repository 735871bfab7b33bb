use anyhow::Result;

use super::{print_dataset, CommandContext};
use crate::soda::{Transport, WorkflowRequest};

pub struct PublishCommand {
    pub dataset_id: String,
}

impl PublishCommand {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
        }
    }

    pub async fn execute<T: Transport>(&self, ctx: &CommandContext<T>) -> Result<()> {
        let origin = WorkflowRequest::publish(&self.dataset_id).ok();
        let label = format!("publish {}", self.dataset_id);
        println!("🚀 Publishing {} (waits for pending geocoding first)...", self.dataset_id);

        match ctx.workflow.publish(&self.dataset_id).await {
            Ok(info) => {
                println!("✅ Published");
                print_dataset(&info);
                Ok(())
            }
            Err(e) => Err(ctx.fail(e, &label, origin.as_ref()).await),
        }
    }
}
