use anyhow::Result;

use super::{print_dataset, CommandContext};
use crate::soda::{Transport, WorkflowRequest};

pub struct CopyCommand {
    pub dataset_id: String,
}

impl CopyCommand {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
        }
    }

    pub async fn execute<T: Transport>(&self, ctx: &CommandContext<T>) -> Result<()> {
        let origin = WorkflowRequest::create_working_copy(&self.dataset_id).ok();
        let label = format!("copy {}", self.dataset_id);
        println!("📄 Creating working copy of {}...", self.dataset_id);

        match ctx.workflow.create_working_copy(&self.dataset_id).await {
            Ok(info) => {
                println!("✅ Working copy ready");
                print_dataset(&info);
                Ok(())
            }
            Err(e) => Err(ctx.fail(e, &label, origin.as_ref()).await),
        }
    }
}
