//! Gateway: TLS listener, router, and the admission pipeline

pub mod pipeline;
mod router;
mod server;

pub use pipeline::Gatekeeper;
pub use router::create_router;
pub use server::{ProxyServer, shutdown_signal};
