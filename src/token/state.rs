use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Current unix time in fractional seconds.
pub fn unix_now() -> f64 {
    let now = Timestamp::now();
    now.as_second() as f64 + f64::from(now.subsec_nanosecond()) / 1_000_000_000.0
}

/// Credential pair plus the bookkeeping used to coordinate refreshes.
///
/// A state is never mutated after it is persisted; a successful refresh
/// produces a successor via [`TokenState::refreshed`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<f64>,
    #[serde(default)]
    pub last_refresh_timestamp: f64,
}

impl TokenState {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiration_timestamp: None,
            last_refresh_timestamp: 0.0,
        }
    }

    pub fn with_expiration(mut self, expiration_timestamp: f64) -> Self {
        self.expiration_timestamp = Some(expiration_timestamp);
        self
    }

    /// Advisory only: the server's 401 is what actually triggers a refresh.
    pub fn is_expired(&self, now: f64) -> bool {
        self.expiration_timestamp.is_some_and(|exp| now >= exp)
    }

    /// Builds the state that replaces `self` after the server issued `response` at `now`.
    ///
    /// The prior refresh token is kept when the server did not rotate it, and
    /// `last_refresh_timestamp` never moves backwards.
    pub fn refreshed(&self, response: RefreshResponse, now: f64) -> Self {
        let RefreshResponse {
            access_token,
            refresh_token,
            expires_in,
        } = response;
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            expiration_timestamp: expires_in.map(|secs| now + secs),
            last_refresh_timestamp: now.max(self.last_refresh_timestamp),
        }
    }
}

/// Success body of the refresh endpoint. Unknown fields are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<f64>,
}
