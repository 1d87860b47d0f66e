//! Device-management API access.
//!
//! Everything the proxy sends upstream goes through one [`UpstreamClient`]
//! and one process-wide [`CredentialCache`]:
//!
//! - [`token`]: bearer credential fetch and single-flight caching
//! - [`binding`]: certificate-to-record binding lookups
//! - [`forward`]: forwarding admitted requests and relaying responses

pub mod binding;
pub mod client;
pub mod forward;
pub mod token;

pub use binding::RecordBindingChecker;
pub use client::{USER_AGENT, UpstreamClient};
pub use forward::{ProxiedRequest, ProxiedResponse, RequestForwarder};
pub use token::{BasicAuthTokenSource, BearerCredential, CredentialCache, CredentialState, TokenSource};
