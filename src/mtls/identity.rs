//! Peer certificate identity extraction.
//!
//! Parses the DER-encoded end-entity certificate presented during the TLS
//! handshake and keeps the two things the authorization pipeline needs: the
//! raw bytes (for the issuer check) and the subject Common Name (for the
//! record binding check).

use std::sync::Arc;

use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Peer certificate
// ─────────────────────────────────────────────────────────────────────────────

/// Client certificate presented on a connection.
///
/// Created once per connection by the listener and attached to every request
/// on that connection as a request extension. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    der: Arc<[u8]>,
    common_name: Option<String>,
}

impl PeerCertificate {
    /// Parse a DER-encoded certificate and extract its subject Common Name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Untrusted` if the bytes are not an X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Untrusted(format!("Failed to parse client certificate: {e}")))?;

        Ok(Self {
            der: Arc::from(der),
            common_name: extract_cn(&cert),
        })
    }

    /// Raw DER bytes of the certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject Common Name, if the subject carries one.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Label for log lines.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.common_name().unwrap_or("<no-cn>")
    }
}

/// Extract the first CN attribute from the subject DN.
fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
