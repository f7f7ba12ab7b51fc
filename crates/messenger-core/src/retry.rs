use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Fixed, non-adaptive delay applied after a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay_ms: u64,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY_MS: u64 = 5_000;

    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            delay_ms: delay_ms.max(1),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Sleep for the retry delay. Returns `false` if cancelled first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay()) => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Self::DEFAULT_DELAY_MS)
    }
}
