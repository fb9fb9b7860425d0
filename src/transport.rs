//! The wrapped connection stack.
//!
//! A [`Transport`] opens "host H on port P, optionally with TLS server name
//! S" and nothing more. Connectors decide *what* to dial; the transport does
//! the dialling and reports failures exactly as the network produced them.

use crate::request::ConnectOptions;
use async_trait::async_trait;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Byte stream returned by a transport.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Type-erased established connection.
pub type BoxedStream = Box<dyn Io>;

/// Opens physical connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to `opts.hostname:opts.port`, performing a TLS handshake
    /// announcing `opts.effective_servername()` when `opts.tls` is set.
    async fn connect(&self, opts: &ConnectOptions) -> io::Result<BoxedStream>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn connect(&self, opts: &ConnectOptions) -> io::Result<BoxedStream> {
        (**self).connect(opts).await
    }
}

/// Tokio TCP plus rustls, verifying against the system roots.
pub struct DefaultTransport {
    connect_timeout: Option<Duration>,
    tls: OnceCell<TlsConnector>,
}

impl DefaultTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: None,
            tls: OnceCell::new(),
        }
    }

    /// Bounds the TCP connect step.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Uses a caller-built rustls configuration instead of the system roots.
    pub fn with_tls_config(self, config: Arc<ClientConfig>) -> Self {
        Self {
            tls: OnceCell::new_with(Some(TlsConnector::from(config))),
            ..self
        }
    }

    async fn tls_connector(&self) -> io::Result<&TlsConnector> {
        self.tls.get_or_try_init(|| async { build_tls_connector() }).await
    }

    async fn dial(&self, opts: &ConnectOptions) -> io::Result<TcpStream> {
        let addr = (opts.hostname.as_str(), opts.port);
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {}:{} timed out", opts.hostname, opts.port),
                    )
                })??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Default for DefaultTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultTransport")
            .field("connect_timeout", &self.connect_timeout)
            .field("tls_ready", &self.tls.initialized())
            .finish()
    }
}

#[async_trait]
impl Transport for DefaultTransport {
    async fn connect(&self, opts: &ConnectOptions) -> io::Result<BoxedStream> {
        let tcp = self.dial(opts).await?;
        trace!(host = %opts.hostname, port = opts.port, "TCP connected");

        if !opts.tls {
            return Ok(Box::new(tcp));
        }

        let servername = opts.effective_servername();
        let server_name = ServerName::try_from(servername.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let tls = self.tls_connector().await?.connect(server_name, tcp).await?;
        debug!(host = %opts.hostname, sni = %servername, "TLS established");
        Ok(Box::new(tls))
    }
}

/// Builds a connector trusting the platform's native roots, speaking
/// HTTP/1.1 only.
fn build_tls_connector() -> io::Result<TlsConnector> {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    for err in native_certs.errors {
        debug!("Warning loading native cert: {}", err);
    }
    for cert in native_certs.certs {
        if let Err(e) = root_store.add(cert) {
            debug!("Warning adding cert to store: {}", e);
        }
    }

    if root_store.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no system root certificates found",
        ));
    }
    debug!("Loaded {} root certificates", root_store.len());

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}
