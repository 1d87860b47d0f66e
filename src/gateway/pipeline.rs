//! Per-request admission pipeline.
//!
//! Gates run in a fixed order and the first failure ends the request:
//!
//! ```text
//! trust  → 401   client certificate absent or not issued by the anchor
//! path   → 404   no allow-listed resource matches, or a query string is present
//! method → 404   resource does not permit the method
//! body   → 413   inbound body over the configured limit
//! bind   → 401   certificate CN not registered on the addressed record
//! forward        upstream response relayed verbatim (500 on transport failure)
//! ```
//!
//! No upstream call is made before the trust, route and body gates pass.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::mtls::{PeerCertificate, TrustAnchor};
use crate::routing::{MethodAuthorizer, ResourceMatch, ResourceMatcher};
use crate::upstream::forward::carries_body;
use crate::upstream::{
    BasicAuthTokenSource, CredentialCache, ProxiedRequest, ProxiedResponse, RecordBindingChecker,
    RequestForwarder, TokenSource, UpstreamClient,
};
use crate::{Error, Result};

/// Admission decisions plus forwarding, shared by every connection.
#[derive(Debug)]
pub struct Gatekeeper {
    anchor: TrustAnchor,
    matcher: ResourceMatcher,
    authorizer: MethodAuthorizer,
    binding: RecordBindingChecker,
    forwarder: RequestForwarder,
    credentials: Arc<CredentialCache>,
    max_body_size: usize,
}

impl Gatekeeper {
    /// Assemble a gatekeeper over an upstream client and token source.
    #[must_use]
    pub fn new(
        anchor: TrustAnchor,
        client: UpstreamClient,
        credentials: Arc<CredentialCache>,
        max_body_size: usize,
    ) -> Self {
        Self {
            anchor,
            matcher: ResourceMatcher::new(),
            authorizer: MethodAuthorizer::new(),
            binding: RecordBindingChecker::new(client.clone(), Arc::clone(&credentials)),
            forwarder: RequestForwarder::new(client, Arc::clone(&credentials)),
            credentials,
            max_body_size,
        }
    }

    /// Build the production gatekeeper from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the upstream settings are invalid.
    pub fn from_config(config: &Config, anchor: TrustAnchor) -> Result<Self> {
        let client = UpstreamClient::from_config(&config.upstream)?;
        let source: Arc<dyn TokenSource> = Arc::new(BasicAuthTokenSource::from_config(
            client.clone(),
            &config.upstream,
        ));
        let credentials = Arc::new(CredentialCache::new(
            source,
            config.upstream.token_refresh_skew,
        ));
        Ok(Self::new(
            anchor,
            client,
            credentials,
            config.server.max_body_size,
        ))
    }

    /// Shared credential cache.
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Run the pipeline for one request and produce the caller's response.
    ///
    /// The peer certificate is read from the request extensions, where the
    /// TLS acceptor places it.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.admit_and_forward(request).await {
            Ok(response) => {
                info!(%method, %path, status = response.status.as_u16(), "Forwarded");
                response.into_response()
            }
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    error!(%method, %path, status = status.as_u16(), error = %e, "Request failed");
                } else {
                    warn!(%method, %path, status = status.as_u16(), reason = %e, "Request rejected");
                }
                e.into_response()
            }
        }
    }

    async fn admit_and_forward(&self, request: Request) -> Result<ProxiedResponse> {
        let (parts, body) = request.into_parts();

        let peer = self.check_trust(&parts)?;
        let matched = self.check_route(&parts)?;

        let body = if carries_body(&parts.method) {
            self.check_declared_length(&parts)?;
            self.buffer_body(body).await?
        } else {
            Bytes::new()
        };

        self.check_binding(peer, &matched).await?;

        self.forwarder
            .forward(ProxiedRequest {
                method: parts.method,
                path: parts.uri.path().to_string(),
                headers: parts.headers,
                body,
            })
            .await
    }

    fn check_trust<'a>(&self, parts: &'a Parts) -> Result<&'a PeerCertificate> {
        let peer = parts
            .extensions
            .get::<PeerCertificate>()
            .ok_or_else(|| Error::Untrusted("no client certificate presented".to_string()))?;

        if !self.anchor.is_trusted(peer.der()) {
            return Err(Error::Untrusted(format!(
                "certificate '{}' is not issued by the trust anchor",
                peer.display_name()
            )));
        }
        Ok(peer)
    }

    fn check_route(&self, parts: &Parts) -> Result<ResourceMatch> {
        let path = parts.uri.path();
        if let Some(query) = parts.uri.query() {
            return Err(Error::NoRoute(format!(
                "path '{path}' carries a query string '{query}'"
            )));
        }
        let matched = self
            .matcher
            .match_path(path)
            .ok_or_else(|| Error::NoRoute(format!("path '{path}' is not allow-listed")))?;

        if !self.authorizer.is_allowed(&parts.method, matched.resource) {
            return Err(Error::NoRoute(format!(
                "{} is not permitted on {}",
                parts.method, matched.resource
            )));
        }
        Ok(matched)
    }

    async fn check_binding(&self, peer: &PeerCertificate, matched: &ResourceMatch) -> Result<()> {
        let common_name = peer
            .common_name()
            .ok_or_else(|| Error::Unbound("certificate has no common name".to_string()))?;

        let bound = self
            .binding
            .matches(matched.lookup_type, &matched.lookup_value, common_name)
            .await?;

        if bound {
            debug!(
                common_name,
                lookup_type = %matched.lookup_type,
                lookup_value = %matched.lookup_value,
                "Certificate bound to record"
            );
            Ok(())
        } else {
            Err(Error::Unbound(format!(
                "'{common_name}' is not registered on computer {}/{}",
                matched.lookup_type, matched.lookup_value
            )))
        }
    }

    /// Reject a declared `Content-Length` over the limit without reading the body.
    fn check_declared_length(&self, parts: &Parts) -> Result<()> {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let limit = u64::try_from(self.max_body_size).unwrap_or(u64::MAX);
        match declared {
            Some(len) if len > limit => Err(Error::PayloadTooLarge {
                limit: self.max_body_size,
            }),
            _ => Ok(()),
        }
    }

    async fn buffer_body(&self, body: Body) -> Result<Bytes> {
        let limit = self.max_body_size;
        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.is::<LengthLimitError>() => Err(Error::PayloadTooLarge { limit }),
            Err(e) => Err(Error::Internal(format!("Failed to read request body: {e}"))),
        }
    }
}
