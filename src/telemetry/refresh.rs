use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller called the refresh endpoint and persisted the result.
    Refreshed,
    /// Storage already held a newer token; no network call was made.
    AlreadyRotated,
    /// Another caller owned the refresh and this one waited for it.
    Awaited,
}

/// Correlates the log events of one refresh attempt.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn emit_start(&self) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            "refresh.start"
        );
    }

    pub fn emit_success(&self, outcome: RefreshOutcome) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            outcome = ?outcome,
            "refresh.success"
        );
    }

    pub fn emit_skipped(&self, outcome: RefreshOutcome) {
        event!(
            Level::DEBUG,
            attempt_id = %self.attempt_id,
            context = %self.context,
            outcome = ?outcome,
            "refresh.skipped"
        );
    }

    pub fn emit_failure(&self, error: &Error) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            error = %error,
            "refresh.failure"
        );
    }
}
