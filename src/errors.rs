use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::retry::ErrorKind;

/// A single entry from the server's error payload.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ErrorEntry {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Failed response details: status, server-provided entries and the raw body.
#[derive(Clone, Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub errors: Vec<ErrorEntry>,
    pub body: String,
}

impl ApiError {
    pub fn new(status: StatusCode, errors: Vec<ErrorEntry>, body: impl Into<String>) -> Self {
        Self {
            status,
            errors,
            body: body.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status.as_u16())?;
        let markers: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.code.as_deref().or(e.message.as_deref()))
            .collect();
        if markers.is_empty() {
            if !self.body.is_empty() {
                write!(f, ": {}", self.body)?;
            }
        } else {
            write!(f, ": {}", markers.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("stored credentials have no refresh token")]
    MissingRefreshToken,
    #[error("invalid access token ({0})")]
    InvalidAccessToken(ApiError),
    #[error("refresh token rejected ({0})")]
    InvalidRefreshToken(ApiError),
    #[error("authorization failed ({0})")]
    Auth(ApiError),
    /// The refresh call failed without a usable server verdict: transport
    /// error, unreadable body, or an undecodable success payload.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("request failed [{kind}] ({error})")]
    Api { kind: ErrorKind, error: ApiError },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("timed out after {0:?} waiting for token refresh")]
    Timeout(Duration),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl Error {
    /// True for authorization failures, including any failure of the refresh call.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::MissingRefreshToken
                | Error::InvalidAccessToken(_)
                | Error::InvalidRefreshToken(_)
                | Error::Auth(_)
                | Error::RefreshFailed(_)
        )
    }

    /// The server response behind this error, if there was one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::InvalidAccessToken(e)
            | Error::InvalidRefreshToken(e)
            | Error::Auth(e)
            | Error::Api { error: e, .. } => Some(e),
            _ => None,
        }
    }
}
