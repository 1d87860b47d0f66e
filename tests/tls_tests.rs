//! Listener tests over real mutual TLS
//!
//! The proxy is started on an ephemeral port with PEM files on disk; clients
//! connect with tokio-rustls and speak raw HTTP/1.1.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Leaf, TestCa, record_body, token_mock};
use computer_api_proxy::config::Config;
use computer_api_proxy::gateway::ProxyServer;

struct RunningProxy {
    addr: SocketAddr,
    server_ca: TestCa,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<computer_api_proxy::Result<()>>,
    _dir: tempfile::TempDir,
}

impl RunningProxy {
    async fn start(device_ca: &TestCa, upstream: &MockServer) -> Self {
        let server_ca = TestCa::new("Proxy Server CA");
        let server = server_ca.server();

        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, contents).unwrap();
            p.to_string_lossy().into_owned()
        };

        let mut config = Config::default();
        config.tls.server_cert = write("server.crt", &server.cert_pem);
        config.tls.server_key = write("server.key", &server.key_pem);
        config.tls.ca_cert = write("jamfca.crt", &device_ca.pem);
        config.upstream.base_url = upstream.uri();
        config.upstream.username = common::USERNAME.to_string();
        config.upstream.password = common::PASSWORD.to_string();
        config.upstream.timeout = Duration::from_secs(5);
        config.upstream.token_refresh_skew = Duration::ZERO;
        config.server.shutdown_timeout = Duration::from_secs(2);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = ProxyServer::new(config).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(proxy.serve(listener, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            server_ca,
            stop,
            handle,
            _dir: dir,
        }
    }

    fn connector(&self, identity: Option<&Leaf>) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(self.server_ca.der.clone()))
            .unwrap();

        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);

        let config = match identity {
            Some(leaf) => builder
                .with_client_auth_cert(
                    vec![CertificateDer::from(leaf.der.clone())],
                    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf.key_der.clone())),
                )
                .unwrap(),
            None => builder.with_no_client_auth(),
        };
        TlsConnector::from(Arc::new(config))
    }

    /// Send one HTTP/1.1 request and return the raw response text.
    async fn get(&self, identity: Option<&Leaf>, target: &str) -> String {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let mut tls = self
            .connector(identity)
            .connect(ServerName::try_from("localhost").unwrap(), stream)
            .await
            .unwrap();

        let request =
            format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        tls.write_all(request.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        // A peer that closes without close_notify surfaces as an error after
        // the full response has been read.
        let _ = tls.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

async fn mock_bound_device(upstream: &MockServer) {
    token_mock().mount(upstream).await;
    Mock::given(method("GET"))
        .and(path("/JSSResource/computers/id/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record_body(42, &["device-42"])))
        .mount(upstream)
        .await;
}

#[tokio::test]
async fn test_trusted_bound_client_is_served_over_mtls() {
    let device_ca = TestCa::new("Device CA");
    let upstream = MockServer::start().await;
    mock_bound_device(&upstream).await;
    let proxy = RunningProxy::start(&device_ca, &upstream).await;

    let device = device_ca.device(Some("device-42"));
    let response = proxy.get(Some(&device), "/JSSResource/computers/id/42").await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("device-42"), "{response}");
    proxy.stop().await;
}

#[tokio::test]
async fn test_client_without_certificate_completes_handshake_and_gets_401() {
    let device_ca = TestCa::new("Device CA");
    let upstream = MockServer::start().await;
    let proxy = RunningProxy::start(&device_ca, &upstream).await;

    let response = proxy.get(None, "/JSSResource/computers/id/42").await;

    assert!(response.starts_with("HTTP/1.1 401"), "{response}");
    assert!(response.ends_with("Unauthorized"), "{response}");
    proxy.stop().await;
}

#[tokio::test]
async fn test_certificate_from_other_ca_gets_401() {
    let device_ca = TestCa::new("Device CA");
    let other_ca = TestCa::new("Other CA");
    let upstream = MockServer::start().await;
    mock_bound_device(&upstream).await;
    let proxy = RunningProxy::start(&device_ca, &upstream).await;

    let stranger = other_ca.device(Some("device-42"));
    let response = proxy.get(Some(&stranger), "/JSSResource/computers/id/42").await;

    assert!(response.starts_with("HTTP/1.1 401"), "{response}");
    assert!(upstream.received_requests().await.unwrap_or_default().is_empty());
    proxy.stop().await;
}

#[tokio::test]
async fn test_unlisted_path_over_mtls_gets_404() {
    let device_ca = TestCa::new("Device CA");
    let upstream = MockServer::start().await;
    let proxy = RunningProxy::start(&device_ca, &upstream).await;

    let device = device_ca.device(Some("device-42"));
    let response = proxy.get(Some(&device), "/JSSResource/accounts").await;

    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    proxy.stop().await;
}

#[tokio::test]
async fn test_server_fails_to_start_without_key_material() {
    let upstream = MockServer::start().await;
    let mut config = Config::default();
    config.upstream.base_url = upstream.uri();
    config.upstream.username = common::USERNAME.to_string();
    config.tls.ca_cert = "/nonexistent/jamfca.crt".to_string();

    assert!(matches!(
        ProxyServer::new(config),
        Err(computer_api_proxy::Error::Config(_))
    ));
}
