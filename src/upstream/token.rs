//! Bearer credential acquisition and caching.
//!
//! The cache holds at most one credential. Readers take a lock-free snapshot;
//! when the snapshot is absent or expired, callers join a single shared fetch
//! so that N concurrent requests trigger exactly one call to the token
//! endpoint. A failed fetch leaves the previous cache contents untouched and
//! every caller waiting on that fetch sees the same error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::client::{UpstreamClient, transport_error};
use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Token endpoint of the management API.
pub const TOKEN_PATH: &str = "/api/v1/auth/token";

// ─────────────────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────────────────

/// Short-lived bearer token with its expiry instant.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl BearerCredential {
    /// Create a credential.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Opaque token value.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Instant after which the token must not be used.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the credential is unusable at `now` once `skew` is subtracted
    /// from its lifetime.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        now.checked_add_signed(skew)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    expires: Expiry,
}

/// Expiry as sent by the token endpoint: an RFC 3339 timestamp, or epoch
/// milliseconds on older servers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expiry {
    Timestamp(DateTime<Utc>),
    EpochMillis(i64),
}

impl Expiry {
    fn into_datetime(self) -> Result<DateTime<Utc>> {
        match self {
            Self::Timestamp(at) => Ok(at),
            Self::EpochMillis(ms) => DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                Error::Upstream(format!("Token expiry {ms} is out of range"))
            }),
        }
    }
}

impl TokenResponse {
    fn into_credential(self) -> Result<BearerCredential> {
        if self.token.is_empty() {
            return Err(Error::Upstream(
                "Token endpoint returned an empty token".to_string(),
            ));
        }
        Ok(BearerCredential::new(self.token, self.expires.into_datetime()?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token source
// ─────────────────────────────────────────────────────────────────────────────

/// Something that can mint a fresh bearer credential.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a new credential.
    async fn fetch(&self) -> Result<BearerCredential>;
}

/// Token source that exchanges service-account credentials via HTTP Basic
/// authentication at [`TOKEN_PATH`].
pub struct BasicAuthTokenSource {
    client: UpstreamClient,
    username: String,
    password: String,
}

impl BasicAuthTokenSource {
    /// Create a token source for the given account.
    #[must_use]
    pub fn new(client: UpstreamClient, username: String, password: String) -> Self {
        Self {
            client,
            username,
            password,
        }
    }

    /// Create a token source from configuration, resolving `env:` secrets.
    #[must_use]
    pub fn from_config(client: UpstreamClient, config: &UpstreamConfig) -> Self {
        Self::new(client, config.resolve_username(), config.resolve_password())
    }
}

impl fmt::Debug for BasicAuthTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthTokenSource")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for BasicAuthTokenSource {
    async fn fetch(&self) -> Result<BearerCredential> {
        let response = self
            .client
            .request(Method::POST, TOKEN_PATH)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error("Token request", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "Token endpoint returned HTTP {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Malformed token response: {e}")))?;
        body.into_credential()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of the credential cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No credential has been fetched yet
    Empty,
    /// Cached credential is usable
    Valid,
    /// Cached credential has expired; the next caller refreshes it
    Expired,
}

/// Fetch shared by every caller that found the cache unusable. The error is
/// carried as a string so the output stays `Clone`.
type Flight = Shared<BoxFuture<'static, std::result::Result<Arc<BearerCredential>, String>>>;

/// Process-wide bearer credential cache with single-flight refresh.
pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    current: Arc<ArcSwapOption<BearerCredential>>,
    in_flight: Arc<Mutex<Option<Flight>>>,
    skew: TimeDelta,
}

impl CredentialCache {
    /// Create an empty cache over `source`.
    ///
    /// Credentials are treated as expired `skew` before their stated expiry.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, skew: Duration) -> Self {
        Self {
            source,
            current: Arc::new(ArcSwapOption::empty()),
            in_flight: Arc::new(Mutex::new(None)),
            skew: TimeDelta::from_std(skew).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Current state, evaluated against the wall clock.
    #[must_use]
    pub fn state(&self) -> CredentialState {
        match self.current.load_full() {
            None => CredentialState::Empty,
            Some(cred) if cred.is_expired_at(Utc::now(), self.skew) => CredentialState::Expired,
            Some(_) => CredentialState::Valid,
        }
    }

    /// Return a usable token, fetching a new credential when needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` if the shared fetch fails; every caller that
    /// joined that fetch receives the same error.
    pub async fn token(&self) -> Result<String> {
        if let Some(cred) = self.usable() {
            return Ok(cred.token().to_string());
        }

        let flight = {
            let mut slot = self.in_flight.lock();
            // Another caller may have finished a fetch while we waited.
            if let Some(cred) = self.usable() {
                return Ok(cred.token().to_string());
            }
            slot.get_or_insert_with(|| self.start_fetch()).clone()
        };

        flight
            .await
            .map(|cred| cred.token().to_string())
            .map_err(Error::Upstream)
    }

    fn usable(&self) -> Option<Arc<BearerCredential>> {
        self.current
            .load_full()
            .filter(|cred| !cred.is_expired_at(Utc::now(), self.skew))
    }

    /// Spawn the fetch so it completes even when every waiter goes away. The
    /// task stores the result and empties the slot before waiters resume.
    fn start_fetch(&self) -> Flight {
        let source = Arc::clone(&self.source);
        let current = Arc::clone(&self.current);
        let in_flight = Arc::clone(&self.in_flight);
        let skew = self.skew;

        let task = tokio::spawn(async move {
            let outcome = fetch_credential(source.as_ref(), skew).await;
            if let Ok(cred) = &outcome {
                current.store(Some(Arc::clone(cred)));
            }
            in_flight.lock().take();
            outcome
        });

        let in_flight = Arc::clone(&self.in_flight);
        async move {
            task.await.unwrap_or_else(|e| {
                in_flight.lock().take();
                Err(format!("Bearer credential fetch aborted: {e}"))
            })
        }
        .boxed()
        .shared()
    }
}

async fn fetch_credential(
    source: &dyn TokenSource,
    skew: TimeDelta,
) -> std::result::Result<Arc<BearerCredential>, String> {
    debug!("Fetching bearer credential");
    let cred = match source.fetch().await {
        Ok(cred) => cred,
        Err(e) => {
            warn!(error = %e, "Bearer credential fetch failed");
            return Err(e.to_string());
        }
    };
    if cred.is_expired_at(Utc::now(), skew) {
        warn!(expires_at = %cred.expires_at(), "Fetched bearer credential is already expired");
        return Err(format!(
            "Token endpoint returned a credential expiring at {}",
            cred.expires_at()
        ));
    }
    info!(expires_at = %cred.expires_at(), "Bearer credential refreshed");
    Ok(Arc::new(cred))
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("state", &self.state())
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
