//! Computer API Proxy - mTLS gatekeeper for a device-management API
//!
//! Admits a request only when the client certificate is issued by the
//! configured CA, the path and method are allow-listed, and the certificate
//! is registered on the computer record the request addresses.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use computer_api_proxy::{
    cli::{Cli, Command},
    config::Config,
    gateway::ProxyServer,
    mtls::{PeerCertificate, TrustAnchor, load_certs},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::VerifyCert { ref cert }) => run_verify_cert(cli.config.as_deref(), cert),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Report the CN of a certificate and whether the configured CA issued it
fn run_verify_cert(config_path: Option<&Path>, cert_path: &Path) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let anchor = match TrustAnchor::from_pem_file(&config.tls.ca_cert) {
        Ok(anchor) => anchor,
        Err(e) => {
            eprintln!("❌ Failed to load CA: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cert_path = cert_path.to_string_lossy();
    let peer = match load_certs(&cert_path).and_then(|certs| {
        certs
            .first()
            .ok_or_else(|| {
                computer_api_proxy::Error::Config(format!("No certificates found in '{cert_path}'"))
            })
            .and_then(|der| PeerCertificate::from_der(der))
    }) {
        Ok(peer) => peer,
        Err(e) => {
            eprintln!("❌ Failed to load certificate: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Certificate: {cert_path}");
    println!("   Common name: {}", peer.display_name());
    println!("   Issuer CA:   {}", config.tls.ca_cert);

    if anchor.is_trusted(peer.der()) {
        println!("✅ Trusted");
        ExitCode::SUCCESS
    } else {
        println!("❌ Not issued by the configured CA");
        ExitCode::FAILURE
    }
}

/// Run the proxy server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        upstream = %config.upstream.base_url,
        "Starting Computer API Proxy"
    );

    let server = match ProxyServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
