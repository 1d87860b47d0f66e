//! Shared fixtures: a throwaway PKI and a mocked device-management API.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use computer_api_proxy::gateway::Gatekeeper;
use computer_api_proxy::mtls::{PeerCertificate, TrustAnchor};
use computer_api_proxy::upstream::{BasicAuthTokenSource, CredentialCache, UpstreamClient};

pub const USERNAME: &str = "svc-proxy";
pub const PASSWORD: &str = "s3cret";
pub const TOKEN: &str = "tok-abc123";
pub const BODY_LIMIT: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// PKI
// ─────────────────────────────────────────────────────────────────────────────

/// Certificate and key issued by a [`TestCa`].
pub struct Leaf {
    pub der: Vec<u8>,
    pub cert_pem: String,
    pub key_pem: String,
    pub key_der: Vec<u8>,
}

impl Leaf {
    pub fn peer(&self) -> PeerCertificate {
        PeerCertificate::from_der(&self.der).unwrap()
    }
}

/// Single-level CA.
pub struct TestCa {
    pub der: Vec<u8>,
    pub pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = dn(Some(cn));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self {
            der: cert.der().to_vec(),
            pem: cert.pem(),
            issuer: Issuer::new(params, key),
        }
    }

    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor::from_der(self.der.clone()).unwrap()
    }

    /// Client certificate with the given subject CN (or none).
    pub fn device(&self, cn: Option<&str>) -> Leaf {
        let mut params = CertificateParams::default();
        params.distinguished_name = dn(cn);
        self.issue(params)
    }

    /// Server certificate valid for `localhost`.
    pub fn server(&self) -> Leaf {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name = dn(Some("localhost"));
        self.issue(params)
    }

    fn issue(&self, params: CertificateParams) -> Leaf {
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        Leaf {
            der: cert.der().to_vec(),
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            key_der: key.serialize_der(),
        }
    }
}

fn dn(cn: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    if let Some(cn) = cn {
        dn.push(DnType::CommonName, cn);
    }
    dn
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream double
// ─────────────────────────────────────────────────────────────────────────────

/// Token endpoint response body.
pub fn token_body() -> serde_json::Value {
    json!({ "token": TOKEN, "expires": "2099-01-01T00:00:00.000Z" })
}

/// Mock for the token endpoint, answering only the configured account.
pub fn token_mock() -> Mock {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .and(basic_auth(USERNAME, PASSWORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
}

/// Computer record body listing the given certificate CNs.
pub fn record_body(id: u32, common_names: &[&str]) -> serde_json::Value {
    let certificates: Vec<_> = common_names
        .iter()
        .map(|cn| json!({ "common_name": cn, "identity": true, "expires_utc": "2030-01-01" }))
        .collect();
    json!({
        "computer": {
            "general": { "id": id, "name": format!("mac-{id}") },
            "certificates": certificates
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Gatekeeper
// ─────────────────────────────────────────────────────────────────────────────

/// Gatekeeper trusting `ca` and talking to `upstream`.
pub fn gatekeeper(ca: &TestCa, upstream: &MockServer, timeout: Duration) -> Arc<Gatekeeper> {
    let base = Url::parse(&upstream.uri()).unwrap();
    let client = UpstreamClient::new(&base, timeout).unwrap();
    let source = Arc::new(BasicAuthTokenSource::new(
        client.clone(),
        USERNAME.to_string(),
        PASSWORD.to_string(),
    ));
    let credentials = Arc::new(CredentialCache::new(source, Duration::ZERO));
    Arc::new(Gatekeeper::new(ca.anchor(), client, credentials, BODY_LIMIT))
}

/// Inbound request as the TLS listener would hand it over.
pub fn inbound(
    method: Method,
    uri: &str,
    peer: Option<PeerCertificate>,
    body: impl Into<Body>,
) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap();
    if let Some(peer) = peer {
        request.extensions_mut().insert(peer);
    }
    request
}
