use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;

use crate::errors::{ApiError, Error, ErrorEntry};

const EXPIRED_MARKERS: &[&str] = &["token_expired", "token expired", "token has expired"];
const REFRESH_REJECTED_MARKERS: &[&str] = &[
    "robot_token.not_found",
    "refresh token not found",
    "refresh_token_not_found",
    "invalid refresh token",
    "invalid_grant",
];

/// What a failed response means to the auth layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Access token expired; drives the refresh protocol.
    AuthExpired,
    /// Access token rejected for any other reason; never retried.
    AuthInvalid,
    /// The refresh token itself is unknown or rejected.
    InvalidRefreshToken,
    NotFound,
    BadRequest,
    RateLimited,
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::AuthExpired => write!(f, "auth_expired"),
            ErrorKind::AuthInvalid => write!(f, "auth_invalid"),
            ErrorKind::InvalidRefreshToken => write!(f, "invalid_refresh_token"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::BadRequest => write!(f, "bad_request"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Generic => write!(f, "generic"),
        }
    }
}

impl ErrorKind {
    /// The error surfaced to callers for this classification.
    ///
    /// `AuthExpired` only reaches a caller when the retried request was
    /// rejected again, which is reported as a plain authorization failure.
    pub fn into_error(self, error: ApiError) -> Error {
        match self {
            ErrorKind::AuthExpired => Error::Auth(error),
            ErrorKind::AuthInvalid => Error::InvalidAccessToken(error),
            ErrorKind::InvalidRefreshToken => Error::InvalidRefreshToken(error),
            kind => Error::Api { kind, error },
        }
    }
}

/// Maps status plus body markers onto [`ErrorKind`].
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classifies a response from an authenticated resource endpoint.
    pub fn classify(status: StatusCode, body: &str) -> (ErrorKind, ApiError) {
        Self::classify_with(status, body, false)
    }

    /// Classifies a response from the refresh endpoint, where refresh-token
    /// rejection markers are meaningful.
    pub fn classify_refresh(status: StatusCode, body: &str) -> (ErrorKind, ApiError) {
        Self::classify_with(status, body, true)
    }

    fn classify_with(status: StatusCode, body: &str, refresh: bool) -> (ErrorKind, ApiError) {
        let errors = parse_entries(body);
        let kind = Self::kind_for(status, &errors, body, refresh);
        (kind, ApiError::new(status, errors, body))
    }

    fn kind_for(status: StatusCode, errors: &[ErrorEntry], body: &str, refresh: bool) -> ErrorKind {
        let has = |markers: &[&str]| has_marker(errors, body, markers);
        let refresh_rejected = refresh
            && matches!(
                status,
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND
            )
            && has(REFRESH_REJECTED_MARKERS);
        if refresh_rejected {
            return ErrorKind::InvalidRefreshToken;
        }
        match status {
            StatusCode::UNAUTHORIZED if has(EXPIRED_MARKERS) => ErrorKind::AuthExpired,
            StatusCode::UNAUTHORIZED => ErrorKind::AuthInvalid,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::BAD_REQUEST => ErrorKind::BadRequest,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
            _ => ErrorKind::Generic,
        }
    }
}

fn has_marker(errors: &[ErrorEntry], body: &str, markers: &[&str]) -> bool {
    let matches = |text: &str| {
        let text = text.to_lowercase();
        markers.iter().any(|m| text.contains(m))
    };
    if errors.is_empty() {
        return matches(body);
    }
    errors.iter().any(|e| {
        e.code.as_deref().is_some_and(matches) || e.message.as_deref().is_some_and(matches)
    })
}

/// Accepts `{"errors": [...]}`, `{"error": ...}` and `{"message"|"detail": ...}` shapes.
fn parse_entries(body: &str) -> Vec<ErrorEntry> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Value::Object(map) = value else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    if let Some(Value::Array(items)) = map.get("errors") {
        entries.extend(items.iter().filter_map(entry_from));
    }
    match map.get("error") {
        Some(Value::String(code)) => entries.push(ErrorEntry {
            code: Some(code.clone()),
            message: text_field(&map, "error_description"),
        }),
        Some(obj @ Value::Object(_)) => entries.extend(entry_from(obj)),
        _ => {}
    }
    if entries.is_empty() {
        let message = text_field(&map, "message").or_else(|| text_field(&map, "detail"));
        let code = text_field(&map, "code");
        if code.is_some() || message.is_some() {
            entries.push(ErrorEntry { code, message });
        }
    }
    entries
}

fn entry_from(value: &Value) -> Option<ErrorEntry> {
    match value {
        Value::String(message) => Some(ErrorEntry {
            code: None,
            message: Some(message.clone()),
        }),
        Value::Object(map) => Some(ErrorEntry {
            code: text_field(map, "code"),
            message: text_field(map, "message").or_else(|| text_field(map, "detail")),
        }),
        _ => None,
    }
}

fn text_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}
