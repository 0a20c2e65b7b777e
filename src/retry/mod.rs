mod classify;
mod middleware;
mod outcome;

pub use classify::{ErrorClassifier, ErrorKind};
pub use middleware::{AuthRetryMiddleware, AuthState};
pub use outcome::ExchangeOutcome;
