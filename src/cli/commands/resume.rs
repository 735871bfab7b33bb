use anyhow::Result;
use tracing::info;

use super::{print_payload, CommandContext};
use crate::soda::{OperationOutcome, Transport};

pub struct ResumeCommand {
    /// Drop the saved operation instead of polling it
    pub discard: bool,
}

impl ResumeCommand {
    pub fn new() -> Self {
        Self { discard: false }
    }

    pub fn with_discard(mut self, discard: bool) -> Self {
        self.discard = discard;
        self
    }

    pub async fn execute<T: Transport>(&self, ctx: &CommandContext<T>) -> Result<()> {
        let Some(saved) = ctx.store.load().await? else {
            println!("📋 No saved operation to resume");
            return Ok(());
        };

        let label = saved
            .label
            .clone()
            .unwrap_or_else(|| saved.pending.original_request.uri.clone());
        println!(
            "🔁 Saved operation: {} (saved {})",
            label,
            saved.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        if self.discard {
            ctx.store.clear().await?;
            println!("🗑️  Discarded; the server may still finish it");
            return Ok(());
        }

        let origin = saved.pending.original_request.clone();
        let mut pending = saved.pending;
        if pending.attempts_remaining == 0 {
            info!(
                attempts_made = pending.attempts_made,
                budget = ctx.resume_budget,
                "Re-arming exhausted operation"
            );
            pending = pending.with_fresh_budget(ctx.resume_budget);
        }
        println!("   ⏳ Polling {}...", pending.describe_location());

        ctx.workflow.adopt(pending).await;
        match ctx.workflow.check_outstanding().await {
            OperationOutcome::Success(payload) => {
                ctx.store.clear().await?;
                println!("✅ {} finished", label);
                print_payload(&payload);
                Ok(())
            }
            OperationOutcome::Pending(_) => {
                ctx.save_outstanding(&label).await?;
                println!("⏳ Still processing; run 'soda-workflow resume' again later");
                Ok(())
            }
            OperationOutcome::Failure(e) => {
                let resumable = e.pending_operation().is_some()
                    || ctx.workflow.outstanding().await.is_some();
                if !resumable {
                    // the operation ended for good; nothing left to resume
                    ctx.store.clear().await?;
                }
                Err(ctx.fail(e, &label, Some(&origin)).await)
            }
        }
    }
}

impl Default for ResumeCommand {
    fn default() -> Self {
        Self::new()
    }
}
