//! Dial-then-reuse transport: one TCP connection, optionally wrapped in TLS,
//! carrying exactly one HTTP/1.1 request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::ProbeFailure;

/// Build the TLS connector shared by every worker of a run, trusting the
/// public web PKI.
pub fn tls_connector() -> anyhow::Result<TlsConnector> {
    tls_connector_with_roots(RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    })
}

/// Build a TLS connector trusting only `roots`.
pub fn tls_connector_with_roots(roots: RootCertStore) -> anyhow::Result<TlsConnector> {
    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to configure TLS protocol versions")?
            .with_root_certificates(roots)
            .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Open a TCP connection within `timeout`, returning the stream and the
/// handshake time.
pub async fn dial(
    address: &str,
    port: u16,
    timeout: Duration,
) -> Result<(TcpStream, Duration), ProbeFailure> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => Ok((stream, start.elapsed())),
        Ok(Err(e)) => Err(ProbeFailure::DialRefused(e.to_string())),
        Err(_) => Err(ProbeFailure::DialTimeout),
    }
}

/// Split `host/path?query` (optionally prefixed with a scheme) into the host
/// and the origin-form request target.
pub fn split_target(url: &str) -> (&str, &str) {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    }
}

/// Host name for TLS SNI: `host[:port]` without the port.
pub fn server_name(host: &str) -> &str {
    if let Some(inner) = host.strip_prefix('[') {
        return inner.split(']').next().unwrap_or(inner);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// A plain `GET` with a closing connection.
pub fn get_request(
    host: &str,
    target: &str,
    user_agent: &str,
) -> Result<Request<Empty<Bytes>>, ProbeFailure> {
    Request::builder()
        .method(Method::GET)
        .uri(target)
        .header(header::HOST, host)
        .header(header::USER_AGENT, user_agent)
        .header(header::CONNECTION, "close")
        .body(Empty::new())
        .map_err(|e| ProbeFailure::MalformedInput(e.to_string()))
}

/// An HTTP/1.1 client bound to one already-connected socket.
///
/// The connection driver runs on its own task and is aborted when the session
/// is dropped, which closes the socket.
pub struct HttpSession {
    sender: http1::SendRequest<Empty<Bytes>>,
    driver: JoinHandle<()>,
}

impl HttpSession {
    /// Run the TLS handshake (when `tls` is given) and the HTTP handshake over
    /// `stream`.
    pub async fn open(
        stream: TcpStream,
        tls: Option<&TlsConnector>,
        host: &str,
    ) -> Result<Self, ProbeFailure> {
        let Some(connector) = tls else {
            return Self::handshake(stream).await;
        };

        let name = ServerName::try_from(server_name(host).to_string()).map_err(|e| {
            ProbeFailure::MalformedInput(format!("invalid TLS server name {host:?}: {e}"))
        })?;
        let stream = connector
            .connect(name, stream)
            .await
            .map_err(|e| ProbeFailure::RequestFailed(format!("TLS handshake: {e}")))?;
        Self::handshake(stream).await
    }

    async fn handshake<S>(io: S) -> Result<Self, ProbeFailure>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| ProbeFailure::RequestFailed(e.to_string()))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "connection closed with error");
            }
        });
        Ok(Self { sender, driver })
    }

    /// Send the request and wait for the response headers.
    pub async fn send(
        &mut self,
        request: Request<Empty<Bytes>>,
    ) -> Result<Response<Incoming>, ProbeFailure> {
        self.sender
            .send_request(request)
            .await
            .map_err(|e| ProbeFailure::RequestFailed(e.to_string()))
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Listener that never accepts, with its accept queue filled so further
/// connects get no SYN-ACK. Keep the returned listener and streams alive for
/// as long as the port must stay saturated.
#[cfg(test)]
pub(crate) async fn saturated_listener() -> (tokio::net::TcpListener, u16, Vec<TcpStream>) {
    let socket = tokio::net::TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut held = Vec::new();
    for _ in 0..16 {
        let attempt = tokio::time::timeout(
            Duration::from_millis(200),
            TcpStream::connect(("127.0.0.1", port)),
        )
        .await;
        match attempt {
            Ok(Ok(stream)) => held.push(stream),
            _ => break,
        }
    }
    (listener, port, held)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_split_target() {
        assert_eq!(
            split_target("speed.bestip.one/__down?bytes=50000000"),
            ("speed.bestip.one", "/__down?bytes=50000000")
        );
        assert_eq!(
            split_target("https://example.com/a/b"),
            ("example.com", "/a/b")
        );
        assert_eq!(split_target("example.com"), ("example.com", "/"));
        assert_eq!(split_target("example.com:8080/x"), ("example.com:8080", "/x"));
    }

    #[test]
    fn test_server_name_strips_port() {
        assert_eq!(server_name("example.com"), "example.com");
        assert_eq!(server_name("example.com:8443"), "example.com");
        assert_eq!(server_name("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(server_name("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn test_get_request_headers() {
        let req = get_request("www.speedtest.net", "/cdn-cgi/trace", "ua/1").unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), "/cdn-cgi/trace");
        assert_eq!(req.headers()[header::HOST], "www.speedtest.net");
        assert_eq!(req.headers()[header::USER_AGENT], "ua/1");
        assert_eq!(req.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn test_tls_connector_builds() {
        assert!(tls_connector().is_ok());
        assert!(tls_connector_with_roots(RootCertStore::empty()).is_ok());
    }

    #[tokio::test]
    async fn test_dial_slower_than_timeout_fails() {
        let (_listener, port, _held) = saturated_listener().await;

        let started = Instant::now();
        let err = dial("127.0.0.1", port, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeFailure::DialTimeout);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = dial("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeFailure::DialRefused(_)));
    }

    #[tokio::test]
    async fn test_dial_success_reports_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (_stream, latency) = dial("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(latency < Duration::from_millis(500));
    }
}
