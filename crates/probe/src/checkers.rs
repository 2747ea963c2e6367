//! Probe implementations.
//!
//! Every prober executes exactly one connectivity check against one endpoint
//! and reports the outcome. Retries, scheduling and state live upstream; a
//! prober is deadline in, report out.

use crate::types::ProbeReport;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::client_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// A single connectivity check against one endpoint.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Perform one probe attempt, resolving no later than the deadline.
    async fn probe(&self, deadline: Instant) -> ProbeReport;

    /// Get the protocol kind of this prober
    fn kind(&self) -> &'static str;
}

/// TCP connect prober
pub struct TcpProber {
    target: SocketAddr,
}

impl TcpProber {
    /// Create a new TCP prober
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, deadline: Instant) -> ProbeReport {
        let start = Instant::now();

        match timeout_at(deadline, TcpStream::connect(self.target)).await {
            Ok(Ok(stream)) => {
                let latency = start.elapsed();
                // Dropping the stream closes the socket on every exit path.
                drop(stream);
                debug!(addr = %self.target, latency_us = latency.as_micros() as u64, "TCP probe successful");
                ProbeReport::success(latency)
            }
            Ok(Err(e)) => {
                warn!(addr = %self.target, error = %e, "TCP probe failed");
                ProbeReport::connect_error(e)
            }
            Err(_) => {
                warn!(addr = %self.target, "TCP probe timed out");
                ProbeReport::timeout()
            }
        }
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}

/// TLS handshake prober
///
/// Connects, then performs a full TLS handshake with SNI. A TCP-phase failure
/// reports connect-error; a handshake or certificate failure reports
/// tls-error. The two are never merged, even though both arrive as errors
/// from the same connect path.
pub struct TlsProber {
    target: SocketAddr,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl TlsProber {
    /// Create a new TLS prober.
    ///
    /// `host` is used for SNI and hostname validation. When `verify` is
    /// false the certificate chain is not validated.
    pub fn new(target: SocketAddr, host: &str, verify: bool) -> common::Result<Self> {
        // Install the ring provider once; later calls are no-ops.
        let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

        let config = if verify {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth()
        };

        let server_name = match host.parse::<std::net::IpAddr>() {
            Ok(ip) => ServerName::IpAddress(ip.into()),
            Err(_) => ServerName::try_from(host.to_owned())
                .map_err(|_| common::Error::config(format!("invalid server name: {}", host)))?,
        };

        Ok(Self {
            target,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, deadline: Instant) -> ProbeReport {
        let start = Instant::now();

        let stream = match timeout_at(deadline, TcpStream::connect(self.target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(addr = %self.target, error = %e, "TLS probe failed before handshake");
                return ProbeReport::connect_error(e);
            }
            Err(_) => {
                warn!(addr = %self.target, "TLS probe timed out during connect");
                return ProbeReport::timeout();
            }
        };

        match timeout_at(deadline, self.connector.connect(self.server_name.clone(), stream)).await {
            Ok(Ok(tls)) => {
                let latency = start.elapsed();
                let (_, conn) = tls.get_ref();
                debug!(
                    addr = %self.target,
                    protocol = ?conn.protocol_version(),
                    latency_us = latency.as_micros() as u64,
                    "TLS probe successful"
                );
                drop(tls);
                ProbeReport::success(latency)
            }
            Ok(Err(e)) => {
                warn!(addr = %self.target, error = %e, "TLS handshake failed");
                ProbeReport::tls_error(e)
            }
            Err(_) => {
                warn!(addr = %self.target, "TLS probe timed out during handshake");
                ProbeReport::timeout()
            }
        }
    }

    fn kind(&self) -> &'static str {
        "tls"
    }
}

/// HTTP/HTTPS prober
pub struct HttpProber {
    url: String,
    method: reqwest::Method,
    expected_codes: Vec<u16>,
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a new HTTP prober.
    ///
    /// An empty `expected_codes` accepts any 2xx response.
    pub fn new(
        url: String,
        method: reqwest::Method,
        expected_codes: Vec<u16>,
        verify: bool,
    ) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify)
            .build()
            .map_err(common::Error::probe)?;

        Ok(Self {
            url,
            method,
            expected_codes,
            client,
        })
    }

    fn status_matches(&self, status: reqwest::StatusCode) -> bool {
        if self.expected_codes.is_empty() {
            status.is_success()
        } else {
            self.expected_codes.contains(&status.as_u16())
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, deadline: Instant) -> ProbeReport {
        let start = Instant::now();

        let request = self.client.request(self.method.clone(), &self.url);

        match timeout_at(deadline, request.send()).await {
            Ok(Ok(response)) => {
                let latency = start.elapsed();
                let status = response.status();
                let code = status.as_u16();

                if self.status_matches(status) {
                    debug!(url = %self.url, status = code, latency_us = latency.as_micros() as u64,
                           "HTTP probe successful");
                    ProbeReport::success(latency).with_code(code)
                } else {
                    warn!(url = %self.url, status = code, "HTTP probe failed: unexpected status code");
                    ProbeReport::http_error(format!("unexpected status code: {}", code)).with_code(code)
                }
            }
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "HTTP probe failed");
                classify_transport_error(e)
            }
            Err(_) => {
                warn!(url = %self.url, "HTTP probe timed out");
                ProbeReport::timeout()
            }
        }
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

/// WebSocket echo prober
///
/// Connects, upgrades to WebSocket, and optionally sends a text message the
/// server is expected to echo back verbatim. A TCP-phase failure reports
/// connect-error; a failed upgrade, a closed stream or a wrong echo reports
/// http-error (the upgrade is an HTTP exchange).
pub struct WsProber {
    target: SocketAddr,
    url: String,
    message: Option<String>,
}

impl WsProber {
    /// Create a new WebSocket prober.
    ///
    /// `url` is the `ws://` URL used in the upgrade request. With no
    /// `message`, a completed handshake alone is success.
    pub fn new(target: SocketAddr, url: String, message: Option<String>) -> Self {
        Self {
            target,
            url,
            message,
        }
    }
}

#[async_trait]
impl Prober for WsProber {
    async fn probe(&self, deadline: Instant) -> ProbeReport {
        let start = Instant::now();

        let stream = match timeout_at(deadline, TcpStream::connect(self.target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(addr = %self.target, error = %e, "WebSocket probe failed before handshake");
                return ProbeReport::connect_error(e);
            }
            Err(_) => {
                warn!(addr = %self.target, "WebSocket probe timed out during connect");
                return ProbeReport::timeout();
            }
        };

        let mut ws = match timeout_at(deadline, client_async(self.url.as_str(), stream)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!(url = %self.url, error = %e, "WebSocket upgrade failed");
                return ProbeReport::http_error(e);
            }
            Err(_) => {
                warn!(url = %self.url, "WebSocket probe timed out during upgrade");
                return ProbeReport::timeout();
            }
        };

        if let Some(message) = &self.message {
            let exchange = async {
                ws.send(Message::Text(message.clone().into())).await?;
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => return Ok(text.as_str() == message),
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                        Some(Ok(_)) | None => return Ok(false),
                        Some(Err(e)) => return Err(e),
                    }
                }
            };

            match timeout_at(deadline, exchange).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    warn!(url = %self.url, "WebSocket probe failed: echo mismatch");
                    return ProbeReport::http_error("echo mismatch");
                }
                Ok(Err(e)) => {
                    warn!(url = %self.url, error = %e, "WebSocket probe failed mid-exchange");
                    return ProbeReport::http_error(e);
                }
                Err(_) => {
                    warn!(url = %self.url, "WebSocket probe timed out awaiting echo");
                    return ProbeReport::timeout();
                }
            }
        }

        let latency = start.elapsed();
        // Best-effort polite close; dropping the stream closes the socket
        // either way.
        let _ = timeout_at(deadline, ws.close(None)).await;
        debug!(url = %self.url, latency_us = latency.as_micros() as u64, "WebSocket probe successful");
        ProbeReport::success(latency)
    }

    fn kind(&self) -> &'static str {
        "ws"
    }
}

/// Map a reqwest transport error onto the outcome taxonomy.
///
/// TLS failures surface inside connect errors, so the source chain is walked
/// before the connect classification is consulted.
fn classify_transport_error(e: reqwest::Error) -> ProbeReport {
    if e.is_timeout() {
        return ProbeReport::timeout();
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(&e);
    while let Some(inner) = source {
        if inner.downcast_ref::<rustls::Error>().is_some() {
            return ProbeReport::tls_error(&e);
        }
        source = inner.source();
    }

    if e.is_connect() {
        ProbeReport::connect_error(&e)
    } else {
        ProbeReport::http_error(&e)
    }
}

/// Certificate verifier that accepts any chain.
///
/// Only reachable when a target explicitly disables verification.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutcomeKind;
    use std::time::Duration;

    fn deadline_in(d: Duration) -> Instant {
        Instant::now() + d
    }

    #[tokio::test]
    async fn test_tcp_prober_connection_refused() {
        let prober = TcpProber::new("127.0.0.1:1".parse().unwrap());

        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;
        assert_eq!(report.outcome, OutcomeKind::ConnectError);
        assert!(report.latency.is_none());
    }

    #[tokio::test]
    async fn test_tcp_prober_success_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let prober = TcpProber::new(addr);
        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;

        assert_eq!(report.outcome, OutcomeKind::Success);
        assert!(report.latency.is_some());
    }

    #[tokio::test]
    async fn test_tcp_prober_expired_deadline_is_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let prober = TcpProber::new(addr);
        // Deadline already in the past: must report timeout, not success.
        let past = Instant::now()
            .checked_sub(Duration::from_millis(1))
            .unwrap_or_else(Instant::now);
        let report = prober.probe(past).await;

        assert_eq!(report.outcome, OutcomeKind::Timeout);
    }

    #[tokio::test]
    async fn test_tls_prober_refused_is_connect_error_not_tls_error() {
        let prober = TlsProber::new("127.0.0.1:1".parse().unwrap(), "localhost", true).unwrap();

        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;
        assert_eq!(report.outcome, OutcomeKind::ConnectError);
    }

    #[tokio::test]
    async fn test_tls_prober_plaintext_listener_is_tls_error() {
        // Listener accepts the TCP connection but never speaks TLS, so the
        // handshake fails; the socket itself connected fine.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and immediately close; rustls sees an EOF mid-handshake.
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let prober = TlsProber::new(addr, "localhost", false).unwrap();
        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;

        assert_eq!(report.outcome, OutcomeKind::TlsError);
    }

    #[test]
    fn test_tls_prober_rejects_invalid_server_name() {
        let result = TlsProber::new("127.0.0.1:443".parse().unwrap(), "bad host name", true);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ws_prober_refused_is_connect_error() {
        let prober = WsProber::new(
            "127.0.0.1:1".parse().unwrap(),
            "ws://127.0.0.1:1/echo".to_string(),
            None,
        );

        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;
        assert_eq!(report.outcome, OutcomeKind::ConnectError);
    }

    #[tokio::test]
    async fn test_ws_prober_echo_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                if let Some(Ok(msg)) = ws.next().await {
                    let _ = ws.send(msg).await;
                }
            }
        });

        let prober = WsProber::new(
            addr,
            format!("ws://{}/echo", addr),
            Some("hello".to_string()),
        );
        let report = prober.probe(deadline_in(Duration::from_secs(2))).await;

        assert_eq!(report.outcome, OutcomeKind::Success);
        assert!(report.latency.is_some());
    }

    #[tokio::test]
    async fn test_ws_prober_wrong_echo_is_http_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                if ws.next().await.is_some() {
                    let _ = ws.send(Message::Text("goodbye".into())).await;
                }
            }
        });

        let prober = WsProber::new(
            addr,
            format!("ws://{}/echo", addr),
            Some("hello".to_string()),
        );
        let report = prober.probe(deadline_in(Duration::from_secs(2))).await;

        assert_eq!(report.outcome, OutcomeKind::HttpError);
    }

    #[tokio::test]
    async fn test_ws_prober_rejected_upgrade_is_http_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Plain HTTP listener that refuses the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        let prober = WsProber::new(addr, format!("ws://{}/echo", addr), None);
        let report = prober.probe(deadline_in(Duration::from_secs(2))).await;

        assert_eq!(report.outcome, OutcomeKind::HttpError);
    }

    #[tokio::test]
    async fn test_http_prober_connection_error() {
        let prober = HttpProber::new(
            "http://127.0.0.1:1/health".to_string(),
            reqwest::Method::GET,
            vec![200],
            true,
        )
        .unwrap();

        let report = prober.probe(deadline_in(Duration::from_secs(1))).await;
        assert_eq!(report.outcome, OutcomeKind::ConnectError);
    }

    #[test]
    fn test_http_status_matching() {
        let prober = HttpProber::new(
            "http://127.0.0.1:1/".to_string(),
            reqwest::Method::GET,
            vec![],
            true,
        )
        .unwrap();
        // Empty expected codes accept any 2xx.
        assert!(prober.status_matches(reqwest::StatusCode::NO_CONTENT));
        assert!(!prober.status_matches(reqwest::StatusCode::NOT_FOUND));

        let prober = HttpProber::new(
            "http://127.0.0.1:1/".to_string(),
            reqwest::Method::GET,
            vec![301, 404],
            true,
        )
        .unwrap();
        assert!(prober.status_matches(reqwest::StatusCode::NOT_FOUND));
        assert!(!prober.status_matches(reqwest::StatusCode::OK));
    }
}
