//! Client-side bearer credential lifecycle: auth headers, expiry detection and
//! a refresh that runs once no matter how many callers hit the expiry.

pub mod config;
pub mod errors;
pub mod locker;
pub mod retry;
pub mod storage;
pub mod telemetry;
pub mod token;

pub use config::Config;
pub use errors::{ApiError, Error, ErrorEntry};
pub use locker::{LocalLocker, Locker};
pub use retry::{AuthRetryMiddleware, AuthState, ErrorClassifier, ErrorKind};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use token::{RefreshResponse, TokenProxy, TokenState};

#[cfg(test)]
mod tests;
