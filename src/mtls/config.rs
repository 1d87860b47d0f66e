//! TLS configuration types.
//!
//! Defines the YAML-deserialisable configuration for the mutual TLS listener:
//! server certificate paths and the CA certificate that acts as the trust
//! anchor for client certificates.
//!
//! # Example YAML
//!
//! ```yaml
//! tls:
//!   server_cert: "/etc/computer-api-proxy/server.crt"
//!   server_key:  "/etc/computer-api-proxy/server.key"
//!   ca_cert:     "/etc/computer-api-proxy/jamfca.crt"
//! ```

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level TLS config
// ─────────────────────────────────────────────────────────────────────────────

/// TLS listener configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the PEM-encoded server certificate chain.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key.
    pub server_key: String,

    /// Path to the PEM-encoded issuing CA certificate.
    ///
    /// Client certificates must be issued directly by this certificate.
    /// Only the first certificate in the file is used.
    pub ca_cert: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_cert: "certificates/server.crt".to_string(),
            server_key: "certificates/server.key".to_string(),
            ca_cert: "certificates/jamfca.crt".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
