//! Client certificate trust validation.
//!
//! The deployment uses a single-level CA, so trust is a *direct issuer*
//! check: the client certificate's issuer DN must equal the anchor's subject
//! DN and its signature must verify against the anchor's public key.
//!
//! # Known limitations
//!
//! No chain walk, no validity-window check, no revocation check. A
//! certificate that has expired or been revoked by the CA is still trusted
//! here; the binding check against the upstream device record is the only
//! administrative control.

use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use tracing::debug;

use crate::mtls::cert_manager::load_certs;
use crate::{Error, Result};

/// The issuing CA certificate, loaded once at startup.
///
/// Immutable for the lifetime of the process and shared read-only by all
/// requests.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    der: Vec<u8>,
}

impl TrustAnchor {
    /// Build a trust anchor from DER bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the bytes are not an X.509 certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        X509Certificate::from_der(&der)
            .map_err(|e| Error::Config(format!("Invalid trust anchor certificate: {e}")))?;
        Ok(Self { der })
    }

    /// Load the first certificate of a PEM file as the trust anchor.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or holds no
    /// parsable certificate.
    pub fn from_pem_file(path: &str) -> Result<Self> {
        let first = load_certs(path)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Config(format!("No certificates found in '{path}'")))?;
        Self::from_der(first.as_ref())
    }

    /// Raw DER bytes of the anchor certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Check whether `client_der` was issued by this anchor.
    #[must_use]
    pub fn is_trusted(&self, client_der: &[u8]) -> bool {
        is_trusted(client_der, &self.der)
    }
}

/// Check that `client_der` was directly issued by `anchor_der`.
///
/// Malformed input on either side yields `false`; it is never an error.
#[must_use]
pub fn is_trusted(client_der: &[u8], anchor_der: &[u8]) -> bool {
    let Ok((_, anchor)) = X509Certificate::from_der(anchor_der) else {
        debug!("Trust anchor failed to parse");
        return false;
    };
    let Ok((_, client)) = X509Certificate::from_der(client_der) else {
        debug!("Client certificate failed to parse");
        return false;
    };

    if client.issuer().as_raw() != anchor.subject().as_raw() {
        debug!(
            issuer = %client.issuer(),
            anchor = %anchor.subject(),
            "Client certificate issuer does not match trust anchor"
        );
        return false;
    }

    match client.verify_signature(Some(anchor.public_key())) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Client certificate signature does not verify");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
