//! TLS listener and connection serving

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use super::pipeline::Gatekeeper;
use super::router::create_router;
use crate::config::Config;
use crate::mtls::{PeerCertificate, TrustAnchor, build_tls_config};
use crate::{Error, Result};

/// Proxy server: TLS termination plus the gatekeeper router.
pub struct ProxyServer {
    config: Config,
    gatekeeper: Arc<Gatekeeper>,
    acceptor: TlsAcceptor,
}

impl ProxyServer {
    /// Load key material and build the server.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid or any PEM
    /// file cannot be loaded.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let anchor = TrustAnchor::from_pem_file(&config.tls.ca_cert)?;
        let tls = build_tls_config(&config.tls, &anchor)?;
        let gatekeeper = Arc::new(Gatekeeper::from_config(&config, anchor)?);
        Ok(Self::with_parts(config, gatekeeper, Arc::new(tls)))
    }

    /// Assemble a server from already-built parts.
    #[must_use]
    pub fn with_parts(
        config: Config,
        gatekeeper: Arc<Gatekeeper>,
        tls: Arc<rustls::ServerConfig>,
    ) -> Self {
        Self {
            config,
            gatekeeper,
            acceptor: TlsAcceptor::from(tls),
        }
    }

    /// Bind the configured address and serve until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("COMPUTER API PROXY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening (mTLS)");
        info!(upstream = %self.config.upstream.base_url, "Forwarding to");
        info!(ca = %self.config.tls.ca_cert, "Client certificates must be issued by");
        info!("============================================================");

        self.serve(listener, shutdown_signal()).await
    }

    /// Accept TLS connections on `listener` until `shutdown` resolves, then
    /// drain open connections for up to the configured shutdown timeout.
    ///
    /// Accept errors and failed handshakes are logged and do not stop the
    /// loop.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let app = create_router(Arc::clone(&self.gatekeeper));
        let handshake_timeout = self.config.server.handshake_timeout;
        let (close_tx, close_rx) = watch::channel(());
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(
                        stream,
                        remote,
                        self.acceptor.clone(),
                        app.clone(),
                        handshake_timeout,
                        close_rx.clone(),
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        info!(open = connections.len(), "Shutting down, draining connections");
        let _ = close_tx.send(());

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.server.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                remaining = connections.len(),
                "Shutdown timeout elapsed, aborting connections"
            );
            connections.abort_all();
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Handshake, extract the peer certificate, then serve HTTP/1.1 or HTTP/2
/// on the connection.
async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: Duration,
    mut close_rx: watch::Receiver<()>,
) {
    let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            debug!(%remote, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            debug!(%remote, "TLS handshake timed out");
            return;
        }
    };

    let peer = peer_certificate(tls.get_ref().1.peer_certificates().unwrap_or_default());
    debug!(
        %remote,
        client = peer.as_ref().map_or("<none>", PeerCertificate::display_name),
        "TLS session established"
    );

    let service = app.map_request(move |mut request: Request<Incoming>| {
        if let Some(peer) = &peer {
            request.extensions_mut().insert(peer.clone());
        }
        request
    });

    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(tls), TowerToHyperService::new(service));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = close_rx.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(%remote, error = %e, "Connection closed with error");
    }
}

/// First certificate of the presented chain, if it parses.
fn peer_certificate(chain: &[rustls::pki_types::CertificateDer<'_>]) -> Option<PeerCertificate> {
    let first = chain.first()?;
    match PeerCertificate::from_der(first) {
        Ok(peer) => Some(peer),
        Err(e) => {
            debug!(error = %e, "Ignoring unparsable client certificate");
            None
        }
    }
}

/// Shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
