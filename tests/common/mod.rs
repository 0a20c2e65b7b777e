#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use bearer_relay::{FileTokenStorage, TokenState, TokenStorage};
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

pub const EXPIRED_BODY: &str = r#"{"errors":[{"code":"token_expired","message":"Token expired"}]}"#;

pub async fn seed_file(path: &Path, state: &TokenState) -> FileTokenStorage {
    let storage = FileTokenStorage::new(path);
    storage.update(state).await.expect("seed token file");
    storage
}

pub fn refreshed_body(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "refresh_token": format!("{access_token}-refresh"),
        "expires_in": 3600
    })
}

#[derive(Clone, Default)]
pub struct LogLines(Arc<Mutex<Vec<String>>>);

impl LogLines {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl std::io::Write for LogLines {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Records every event on the current thread until the guard is dropped.
pub fn capture_logs() -> (LogLines, DefaultGuard) {
    let lines = LogLines::default();
    let writer = lines.clone();
    let subscriber = Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || writer.clone())
            .with_target(false)
            .with_ansi(false),
    );
    (lines, set_default(subscriber))
}

/// Value of `key=...` in a formatted log line.
pub fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(key)?.strip_prefix('='))
}
