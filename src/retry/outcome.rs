use std::time::Duration;

use tracing::Level;
use tracing::event;

use crate::telemetry::refresh::RefreshOutcome;

/// Summary of one `execute` call, logged when it finishes.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub attempts: u8,
    pub refresh: Option<RefreshOutcome>,
    pub success: bool,
    pub elapsed: Duration,
}

impl ExchangeOutcome {
    pub fn log(&self) {
        event!(
            Level::INFO,
            attempts = self.attempts,
            refresh = ?self.refresh,
            success = self.success,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "auth_retry.outcome"
        );
    }
}
