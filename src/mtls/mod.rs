//! Mutual TLS client identity.
//!
//! # Architecture
//!
//! ```text
//! TCP connection
//!   → TLS handshake  (client cert requested, handshake signature verified)
//!   → PeerCertificate extracted from the end-entity certificate
//!   → Injected into request extensions
//!   → TrustAnchor::is_trusted  (direct-issuer check, first pipeline gate)
//! ```
//!
//! # Modules
//!
//! - [`config`]: YAML configuration types (`TlsConfig`)
//! - [`identity`]: X.509 field extraction (`PeerCertificate`)
//! - [`trust`]: direct-issuer validation (`TrustAnchor`)
//! - [`cert_manager`]: rustls config building and PEM loading

pub mod cert_manager;
pub mod config;
pub mod identity;
pub mod trust;

pub use cert_manager::{build_tls_config, load_certs, load_private_key};
pub use config::TlsConfig;
pub use identity::PeerCertificate;
pub use trust::{TrustAnchor, is_trusted};
