use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{ApiError, Error};
use crate::locker::LocalLocker;
use crate::storage::FileTokenStorage;
use crate::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};
use crate::token::{RefreshResponse, TokenProxy};

use super::{ErrorClassifier, ErrorKind, ExchangeOutcome};

/// Steps of one `execute` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    Sending,
    AwaitingAuthDecision,
    Retrying,
    Propagating,
}

impl AuthState {
    /// Only an expired access token earns the single retry.
    pub fn decide(kind: ErrorKind) -> AuthState {
        match kind {
            ErrorKind::AuthExpired => AuthState::Retrying,
            _ => AuthState::Propagating,
        }
    }
}

enum Exchange {
    Success(Response),
    Failed(ErrorKind, ApiError),
}

/// Wraps outbound requests with bearer auth and the refresh-once protocol.
pub struct AuthRetryMiddleware {
    http: Client,
    proxy: Arc<TokenProxy>,
    refresh_url: String,
    wait_timeout: Option<Duration>,
}

impl AuthRetryMiddleware {
    pub fn new(http: Client, proxy: Arc<TokenProxy>, refresh_url: impl Into<String>) -> Self {
        Self {
            http,
            proxy,
            refresh_url: refresh_url.into(),
            wait_timeout: None,
        }
    }

    /// Bounds every wait on an in-flight refresh.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// File-backed storage, in-process locker and a fresh HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let storage = Arc::new(FileTokenStorage::new(&config.token_file));
        let locker = Arc::new(LocalLocker::new());
        let proxy = Arc::new(TokenProxy::new(storage, locker));
        let http = Client::builder().user_agent(config.user_agent()).build()?;
        let middleware = Self::new(http, proxy, config.refresh_url());
        Ok(match config.wait_timeout() {
            Some(timeout) => middleware.with_wait_timeout(timeout),
            None => middleware,
        })
    }

    pub fn proxy(&self) -> Arc<TokenProxy> {
        Arc::clone(&self.proxy)
    }

    pub fn http_client(&self) -> &Client {
        &self.http
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    /// Sends the request built by `build`, refreshing and retrying once on an expired token.
    ///
    /// `build` is invoked again for the retry, so it must be repeatable.
    /// Non-success responses are classified and returned as errors.
    pub async fn execute<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let start = Instant::now();
        let mut outcome = ExchangeOutcome {
            attempts: 1,
            refresh: None,
            success: false,
            elapsed: Duration::ZERO,
        };
        let result = self.run(&build, &mut outcome).await;
        outcome.success = result.is_ok();
        outcome.elapsed = start.elapsed();
        outcome.log();
        result
    }

    async fn run<F>(&self, build: &F, outcome: &mut ExchangeOutcome) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        debug!(state = ?AuthState::Sending, "auth_retry.state");
        let headers = self.fresh_header().await?;
        let sent = headers.get(AUTHORIZATION).cloned();
        let (kind, api) = match self.exchange(build, headers).await? {
            Exchange::Success(response) => return Ok(response),
            Exchange::Failed(kind, api) => (kind, api),
        };

        debug!(state = ?AuthState::AwaitingAuthDecision, kind = %kind, "auth_retry.state");
        if AuthState::decide(kind) == AuthState::Propagating {
            debug!(state = ?AuthState::Propagating, status = api.status.as_u16(), "auth_retry.state");
            return Err(kind.into_error(api));
        }

        warn!(status = api.status.as_u16(), error = %api, "auth_retry.token_expired");
        let refresh = self.coordinate_refresh(sent.as_ref()).await?;
        outcome.refresh = Some(refresh);

        debug!(state = ?AuthState::Retrying, refresh = ?refresh, "auth_retry.state");
        outcome.attempts += 1;
        let headers = self.fresh_header().await?;
        match self.exchange(build, headers).await? {
            Exchange::Success(response) => Ok(response),
            Exchange::Failed(kind, api) => {
                warn!(status = api.status.as_u16(), kind = %kind, "auth_retry.retry_failed");
                Err(kind.into_error(api))
            }
        }
    }

    async fn exchange<F>(&self, build: &F, headers: HeaderMap) -> Result<Exchange, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.http).headers(headers).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Exchange::Success(response));
        }
        let body = response.text().await?;
        let (kind, api) = ErrorClassifier::classify(status, &body);
        Ok(Exchange::Failed(kind, api))
    }

    /// Either performs the refresh or waits for whoever owns it.
    ///
    /// The refresh runs on its own task, so a caller that is cancelled while
    /// waiting on it cannot leave the lock held.
    async fn coordinate_refresh(&self, sent: Option<&HeaderValue>) -> Result<RefreshOutcome, Error> {
        if !self.proxy.lock_for_update().await? {
            self.bounded(self.proxy.wait_for_release()).await?;
            debug!("auth_retry.awaited_refresh");
            return Ok(RefreshOutcome::Awaited);
        }

        let refresher = Refresher {
            http: self.http.clone(),
            proxy: Arc::clone(&self.proxy),
            refresh_url: self.refresh_url.clone(),
        };
        let task = tokio::spawn(refresher.run(sent.cloned()));
        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                // The task panicked before it could release.
                if let Err(e) = self.proxy.release_lock().await {
                    warn!(error = %e, "auth_retry.release_failed");
                }
                Err(Error::RefreshFailed(format!("refresh task failed: {join_err}")))
            }
        }
    }

    async fn fresh_header(&self) -> Result<HeaderMap, Error> {
        self.bounded(self.proxy.get_auth_header()).await
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }
}

/// Owned pieces of one refresh attempt, so it can outlive the caller that started it.
struct Refresher {
    http: Client,
    proxy: Arc<TokenProxy>,
    refresh_url: String,
}

impl Refresher {
    /// Expects the lock to be held; releases it on every path.
    async fn run(self, sent: Option<HeaderValue>) -> Result<RefreshOutcome, Error> {
        let telemetry = RefreshTelemetry::new("auth_retry");
        let result = self.refresh_locked(sent.as_ref(), &telemetry).await;
        let released = self.proxy.release_lock().await;
        if let Err(e) = &result {
            telemetry.emit_failure(e);
        }
        match released {
            Err(e) if result.is_ok() => Err(e),
            Err(e) => {
                warn!(error = %e, "auth_retry.release_failed");
                result
            }
            Ok(()) => result,
        }
    }

    async fn refresh_locked(
        &self,
        sent: Option<&HeaderValue>,
        telemetry: &RefreshTelemetry,
    ) -> Result<RefreshOutcome, Error> {
        let current = self.proxy.current_state().await?;
        let current_header = format!("Bearer {}", current.access_token);
        if sent.is_some_and(|sent| sent.as_bytes() != current_header.as_bytes()) {
            telemetry.emit_skipped(RefreshOutcome::AlreadyRotated);
            return Ok(RefreshOutcome::AlreadyRotated);
        }

        telemetry.emit_start();
        let body = self.proxy.get_refresh_data().await?;
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RefreshFailed(format!("refresh request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                Error::RefreshFailed(format!("failed to read refresh response ({status}): {e}"))
            })?;
            let (kind, api) = ErrorClassifier::classify_refresh(status, &text);
            return Err(match kind {
                ErrorKind::InvalidRefreshToken => Error::InvalidRefreshToken(api),
                _ => Error::Auth(api),
            });
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| Error::RefreshFailed(format!("failed to decode refresh response: {e}")))?;
        self.proxy.update(refreshed).await?;
        telemetry.emit_success(RefreshOutcome::Refreshed);
        Ok(RefreshOutcome::Refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_expiry_is_retried() {
        assert_eq!(AuthState::decide(ErrorKind::AuthExpired), AuthState::Retrying);
        for kind in [
            ErrorKind::AuthInvalid,
            ErrorKind::InvalidRefreshToken,
            ErrorKind::NotFound,
            ErrorKind::BadRequest,
            ErrorKind::RateLimited,
            ErrorKind::Generic,
        ] {
            assert_eq!(AuthState::decide(kind), AuthState::Propagating);
        }
    }
}
