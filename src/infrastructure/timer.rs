use std::time::Duration;
use tokio::time::sleep;

/// Timer for reconnection logic with exponential backoff
///
/// The delay for attempt `n` (zero based) is `base × 2^n`, saturating
/// instead of overflowing.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    base: Duration,
}

impl Timer {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay to wait before attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Sleep for the backoff of `attempt`
    pub async fn schedule_timeout(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        sleep(delay).await;
        delay
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::types::DEFAULT_RECONNECT_INTERVAL))
    }
}
