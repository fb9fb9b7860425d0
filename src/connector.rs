//! Connection factories handed to the HTTP client.
//!
//! A [`Connector`] sees each outbound call twice:
//!
//! 1. **dispatch** ([`Connector::on_dispatch`]): before anything is sent,
//!    with the request's hostname and Host header;
//! 2. **connect** ([`Connector::on_connect`]): right before the socket and
//!    TLS handshake, with the dial target and server name.
//!
//! After the hooks, the actual dial is delegated untouched to the wrapped
//! [`Transport`].

use crate::identity::HostHeaderPolicy;
use crate::mapping::{MappingSource, SharedMapping};
use crate::request::{ConnectOptions, ConnectionRequest};
use crate::resolver::replace_domain;
use crate::transport::{BoxedStream, DefaultTransport, Transport};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Connection factory with dispatch-time and connect-time hooks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Rewrites the request before it is dispatched.
    fn on_dispatch(&self, _req: &mut ConnectionRequest) {}

    /// Rewrites connection options before dialling.
    fn on_connect(&self, _opts: &mut ConnectOptions) {}

    /// The wrapped connection stack.
    fn transport(&self) -> &dyn Transport;

    /// Runs the connect hook, then dials through the transport.
    async fn connect(&self, mut opts: ConnectOptions) -> io::Result<BoxedStream> {
        self.on_connect(&mut opts);
        self.transport().connect(&opts).await
    }
}

/// Bare connection behaviour: no rewriting at all.
#[derive(Clone)]
pub struct PassthroughConnector {
    transport: Arc<dyn Transport>,
}

impl PassthroughConnector {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Default for PassthroughConnector {
    fn default() -> Self {
        Self::new(Arc::new(DefaultTransport::new()))
    }
}

impl fmt::Debug for PassthroughConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for PassthroughConnector {
    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

/// Swappable slot holding the active mapping source.
type MappingSlot = Arc<RwLock<Option<SharedMapping>>>;

/// Connector that sends connections to the host the mapping names.
///
/// Clones share the mapping slot, so [`RemappingConnector::set_mapping`] on
/// any clone affects every request whose hooks have not run yet.
#[derive(Clone)]
pub struct RemappingConnector {
    mapping: MappingSlot,
    policy: HostHeaderPolicy,
    transport: Arc<dyn Transport>,
}

impl RemappingConnector {
    /// Creates a connector with no mapping; it passes everything through
    /// until one is set.
    pub fn new() -> Self {
        Self {
            mapping: Arc::new(RwLock::new(None)),
            policy: HostHeaderPolicy::default(),
            transport: Arc::new(DefaultTransport::new()),
        }
    }

    /// Creates a connector bound to `source`.
    pub fn with_mapping(source: impl MappingSource + 'static) -> Self {
        let connector = Self::new();
        connector.set_mapping(Some(Arc::new(source)));
        connector
    }

    pub fn with_policy(mut self, policy: HostHeaderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn policy(&self) -> HostHeaderPolicy {
        self.policy
    }

    /// Replaces the active mapping source. Last write wins.
    pub fn set_mapping(&self, source: Option<SharedMapping>) {
        *self.mapping.write().unwrap_or_else(PoisonError::into_inner) = source;
    }

    pub fn clear_mapping(&self) {
        self.set_mapping(None);
    }

    /// The active mapping source, if any.
    pub fn mapping(&self) -> Option<SharedMapping> {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Effective hostname for `domain` under the current mapping.
    pub fn resolve(&self, domain: &str) -> String {
        replace_domain(self.mapping().as_deref(), domain)
    }
}

impl Default for RemappingConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RemappingConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemappingConnector")
            .field("policy", &self.policy)
            .field("has_mapping", &self.mapping().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for RemappingConnector {
    fn on_dispatch(&self, req: &mut ConnectionRequest) {
        let mapping = self.mapping();
        let source = mapping.as_deref();

        req.hostname = replace_domain(source, req.original_hostname());
        req.mark_remapped();
        self.policy
            .rewrite_host_header(source, req.host_header.as_mut());

        debug!(
            original = %req.original_hostname(),
            hostname = %req.hostname,
            host_header = ?req.host_header.as_ref().map(ToString::to_string),
            "Dispatch rewrite"
        );
    }

    fn on_connect(&self, opts: &mut ConnectOptions) {
        let mapping = self.mapping();
        let source = mapping.as_deref();

        if !opts.is_remapped() {
            opts.hostname = replace_domain(source, opts.original_hostname());
            opts.mark_remapped();
        }

        if opts.tls {
            let servername = self.policy.servername(
                source,
                opts.servername.as_deref(),
                &opts.hostname,
                opts.original_hostname(),
            );
            opts.servername = Some(servername);
        }

        debug!(
            hostname = %opts.hostname,
            port = opts.port,
            servername = ?opts.servername,
            "Connect rewrite"
        );
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}
