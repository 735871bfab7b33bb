use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Turns Ctrl-C into cancellation of in-flight polling
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to the workflow; cancelled once a shutdown signal arrives
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that waits for Ctrl-C and cancels the token.
    /// Must be called inside a tokio runtime.
    pub fn install_signal_handlers(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            info!("Received interrupt, cancelling outstanding polls");
                            token.cancel();
                        }
                        Err(e) => warn!("Failed to listen for interrupt: {}", e),
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Cancel without waiting for a signal
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_handed_out_tokens() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.install_signal_handlers();
        let token = coordinator.token();

        assert!(!token.is_cancelled());
        coordinator.trigger();
        assert!(token.is_cancelled());
        assert!(coordinator.is_shutting_down());
    }
}
