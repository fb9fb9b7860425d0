//! Per-call values handed through the connector hooks.
//!
//! A [`ConnectionRequest`] is built from an outbound `http::Request` and
//! rewritten in place at dispatch time; it is then turned into the
//! [`ConnectOptions`] that drive the physical connection.

use crate::error::{RemapError, Result};
use crate::identity::HostHeader;
use http::{header, uri::Scheme, Request, Uri};

/// Dispatch-time view of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Hostname the request targets. Rewritten at dispatch.
    pub hostname: String,
    /// Destination port.
    pub port: u16,
    /// Whether the connection is TLS.
    pub tls: bool,
    /// Outgoing Host header, if any.
    pub host_header: Option<HostHeader>,
    /// Caller-supplied TLS server name.
    pub servername: Option<String>,
    original: String,
    remapped: bool,
}

impl ConnectionRequest {
    pub fn new(hostname: impl Into<String>, port: u16, tls: bool) -> Self {
        let hostname = hostname.into();
        Self {
            original: hostname.clone(),
            hostname,
            port,
            tls,
            host_header: None,
            servername: None,
            remapped: false,
        }
    }

    pub fn with_host_header(mut self, header: HostHeader) -> Self {
        self.host_header = Some(header);
        self
    }

    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    /// Builds the request view from an absolute-form `http::Request`.
    ///
    /// The Host header is taken from the request headers when present and
    /// derived from the URI authority otherwise.
    pub fn from_http<B>(req: &Request<B>) -> Result<Self> {
        let uri = req.uri();
        let tls = is_tls(uri)?;
        let authority = uri
            .authority()
            .ok_or_else(|| RemapError::invalid_request(format!("no host in URI: {uri}")))?;

        let default_port = if tls { 443 } else { 80 };
        let port = authority.port_u16().unwrap_or(default_port);
        // `host()` drops any userinfo; IPv6 literals lose their brackets.
        let hostname = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if hostname.is_empty() {
            return Err(RemapError::invalid_request(format!("empty host in URI: {uri}")));
        }

        let host_header = match req.headers().get(header::HOST) {
            Some(value) => HostHeader::parse(value),
            None => Some(HostHeader::new(
                authority.host(),
                authority.port_u16().filter(|p| *p != default_port),
            )),
        };

        let mut request = Self::new(hostname, port, tls);
        request.host_header = host_header;
        Ok(request)
    }

    /// The hostname as requested, before any rewriting.
    pub fn original_hostname(&self) -> &str {
        &self.original
    }

    /// Whether the dispatch hook already resolved `hostname`.
    pub fn is_remapped(&self) -> bool {
        self.remapped
    }

    pub(crate) fn mark_remapped(&mut self) {
        self.remapped = true;
    }

    /// Connection options for this request.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            hostname: self.hostname.clone(),
            port: self.port,
            tls: self.tls,
            servername: self.servername.clone(),
            original: self.original.clone(),
            remapped: self.remapped,
        }
    }
}

/// Connection-time options: what to dial and what to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Host to dial.
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    /// TLS server name. When `None` on a TLS connection the transport uses
    /// `hostname`.
    pub servername: Option<String>,
    original: String,
    remapped: bool,
}

impl ConnectOptions {
    /// Options for a connection that never went through a dispatch hook.
    pub fn new(hostname: impl Into<String>, port: u16, tls: bool) -> Self {
        let hostname = hostname.into();
        Self {
            original: hostname.clone(),
            hostname,
            port,
            tls,
            servername: None,
            remapped: false,
        }
    }

    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    pub fn original_hostname(&self) -> &str {
        &self.original
    }

    pub fn is_remapped(&self) -> bool {
        self.remapped
    }

    pub(crate) fn mark_remapped(&mut self) {
        self.remapped = true;
    }

    /// Server name the TLS handshake announces.
    pub fn effective_servername(&self) -> &str {
        self.servername.as_deref().unwrap_or(&self.hostname)
    }
}

fn is_tls(uri: &Uri) -> Result<bool> {
    match uri.scheme() {
        Some(s) if *s == Scheme::HTTPS => Ok(true),
        Some(s) if *s == Scheme::HTTP => Ok(false),
        Some(s) => Err(RemapError::invalid_request(format!("unsupported scheme: {s}"))),
        None => Err(RemapError::invalid_request(format!("URI has no scheme: {uri}"))),
    }
}
