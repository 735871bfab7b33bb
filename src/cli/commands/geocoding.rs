use anyhow::Result;

use super::CommandContext;
use crate::soda::{Transport, WorkflowRequest};

pub struct GeocodingCommand {
    pub dataset_id: String,
    pub wait: bool,
}

impl GeocodingCommand {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            wait: false,
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub async fn execute<T: Transport>(&self, ctx: &CommandContext<T>) -> Result<()> {
        let origin = WorkflowRequest::pending_geocoding(&self.dataset_id).ok();
        let label = format!("geocoding {}", self.dataset_id);

        if self.wait {
            println!("🌍 Waiting for geocoding of {} to drain...", self.dataset_id);
            return match ctx.workflow.wait_for_pending_geocoding(&self.dataset_id).await {
                Ok(checks) => {
                    println!("✅ Nothing pending after {} check(s)", checks);
                    Ok(())
                }
                Err(e) => Err(ctx.fail(e, &label, origin.as_ref()).await),
            };
        }

        match ctx.workflow.find_pending_geocoding(&self.dataset_id).await {
            Ok(status) => {
                println!("🌍 Geocoding for {}:", self.dataset_id);
                println!("   ⏳ Pending: {}", status.pending_views());
                println!("   📊 Total: {}", status.total);
                if status.is_drained() {
                    println!("   ✅ Ready to publish");
                } else {
                    println!("   💡 Run with --wait to block until it drains");
                }
                Ok(())
            }
            Err(e) => Err(ctx.fail(e, &label, origin.as_ref()).await),
        }
    }
}
