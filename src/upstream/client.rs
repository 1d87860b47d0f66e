//! HTTP client for the device-management API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, redirect};
use url::Url;

use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// User agent sent on calls the proxy originates (token fetch, record lookup).
pub const USER_AGENT: &str = concat!("computer-api-proxy/", env!("CARGO_PKG_VERSION"));

/// Shared handle to the upstream API.
///
/// Cheap to clone; all clones share one connection pool. Every request built
/// through [`UpstreamClient::request`] carries the configured timeout.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Arc<str>,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build a client for `base_url`.
    ///
    /// Automatic decompression is off so encoded bodies relay verbatim, and
    /// redirects are returned to the caller rather than followed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: Arc::from(base_url.as_str().trim_end_matches('/')),
            timeout,
        })
    }

    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the base URL is invalid.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(&config.base_url()?, config.timeout)
    }

    /// Absolute URL for a path on the upstream.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Start a request with the configured timeout applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .timeout(self.timeout)
    }

    /// Configured per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Map a transport failure to `Error::Upstream` with context.
pub(crate) fn transport_error(context: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Upstream(format!("{context} timed out"))
    } else {
        Error::Upstream(format!("{context} failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let base = Url::parse("https://example.jamfcloud.com/").unwrap();
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("/JSSResource/computers/id/42"),
            "https://example.jamfcloud.com/JSSResource/computers/id/42"
        );
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let base = Url::parse("https://mdm.example.com/jss/").unwrap();
        let client = UpstreamClient::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("/api/v1/auth/token"),
            "https://mdm.example.com/jss/api/v1/auth/token"
        );
    }

    #[test]
    fn from_config_rejects_missing_base_url() {
        let result = UpstreamClient::from_config(&UpstreamConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn user_agent_names_the_proxy() {
        assert!(USER_AGENT.starts_with("computer-api-proxy/"));
    }
}
