//! Minimal HTTP/1.1 client driving a [`Connector`].
//!
//! Requests are written in absolute form (`http://a.example/path`) and sent
//! over whatever stream the selected connector opens. The connector used
//! for a call is picked by [`Agent`]:
//!
//! - [`Agent::Global`]: the process-wide connector if one is installed,
//!   bare behaviour otherwise;
//! - [`Agent::Bypass`]: always bare behaviour (per-call opt-out);
//! - [`Agent::Custom`]: an explicitly injected connector.
//!
//! A request can override the client's agent by carrying an `Agent` in its
//! extensions; [`opt_out`] does exactly that.

use crate::connector::{Connector, PassthroughConnector};
use crate::error::{RemapError, Result};
use crate::global;
use crate::request::ConnectionRequest;
use crate::transport::{DefaultTransport, Transport};
use bytes::Bytes;
use http::{header, Request, Response, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which connector a call goes through.
#[derive(Clone, Default)]
pub enum Agent {
    /// The globally installed connector, if any.
    #[default]
    Global,
    /// No connector: plain connection to the requested host.
    Bypass,
    /// A specific connector.
    Custom(Arc<dyn Connector>),
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Bypass => f.write_str("Bypass"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Marks `req` to skip any installed connector.
pub fn opt_out<B>(req: &mut Request<B>) {
    req.extensions_mut().insert(Agent::Bypass);
}

/// HTTP/1.1 client over a pluggable connector.
#[derive(Clone)]
pub struct Client {
    agent: Agent,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client using the global connector over the default transport.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client bound to `connector`.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self::builder().agent(Agent::Custom(connector)).build()
    }

    fn connector_for(&self, agent: &Agent) -> Arc<dyn Connector> {
        let bare = || -> Arc<dyn Connector> {
            Arc::new(PassthroughConnector::new(self.transport.clone()))
        };
        match agent {
            Agent::Global => global::global_connector().unwrap_or_else(bare),
            Agent::Bypass => bare(),
            Agent::Custom(connector) => connector.clone(),
        }
    }

    /// Sends `req`, returning the response head with a streaming body.
    pub async fn request(&self, mut req: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        let agent = req
            .extensions_mut()
            .remove::<Agent>()
            .unwrap_or_else(|| self.agent.clone());
        let connector = self.connector_for(&agent);

        let mut target = ConnectionRequest::from_http(&req)?;
        connector.on_dispatch(&mut target);
        apply_dispatch(&mut req, &target)?;

        let stream = connector
            .connect(target.connect_options())
            .await
            .map_err(RemapError::Connect)?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "Connection closed with error");
            }
        });

        info!(
            method = %req.method(),
            host = %target.original_hostname(),
            dialed = %target.hostname,
            port = target.port,
            agent = ?agent,
            "Sending request"
        );

        Ok(sender.send_request(req).await?)
    }

    /// Convenience GET with an empty body.
    pub async fn get(&self, url: &str) -> Result<Response<Incoming>> {
        let req = Request::get(url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| RemapError::invalid_request(e.to_string()))?;
        self.request(req).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    agent: Agent,
    transport: Option<Arc<dyn Transport>>,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agent = agent;
        self
    }

    /// Transport used for bare (bypass) connections.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connect timeout for the default transport.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Client {
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(DefaultTransport::new().with_connect_timeout(self.connect_timeout))
        });
        Client {
            agent: self.agent,
            transport,
        }
    }
}

/// Writes the dispatch-time rewrite back into the outgoing request: the
/// Host header, and an origin-form URI so the original authority never
/// reaches the wire.
fn apply_dispatch(req: &mut Request<Full<Bytes>>, target: &ConnectionRequest) -> Result<()> {
    if let Some(host) = &target.host_header {
        let value = host
            .to_header_value()
            .map_err(|e| RemapError::invalid_request(format!("bad Host header {host}: {e}")))?;
        req.headers_mut().insert(header::HOST, value);
    }

    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    *req.uri_mut() = Uri::builder()
        .path_and_query(path)
        .build()
        .map_err(|e| RemapError::invalid_request(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::RemappingConnector;
    use crate::identity::HostHeaderPolicy;
    use crate::mapping::{FnMapping, StaticTable};
    use crate::testing::{body_string, RecordingTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn remapping(transport: &Arc<RecordingTransport>) -> RemappingConnector {
        let table: StaticTable = [("a.example", "b.example")].into_iter().collect();
        RemappingConnector::with_mapping(table).with_transport(transport.clone())
    }

    #[tokio::test]
    async fn test_mapped_request_dials_replacement() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::with_connector(Arc::new(remapping(&transport)));

        let resp = client.get("http://a.example/hello").await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "b.example:80");
        assert_eq!(resp.headers()["x-path"], "/hello");
        assert_eq!(body_string(resp).await, "b.example");
    }

    #[tokio::test]
    async fn test_preserve_policy_sends_original_host() {
        let transport = Arc::new(RecordingTransport::new());
        let connector = remapping(&transport).with_policy(HostHeaderPolicy::Preserve);
        let client = Client::with_connector(Arc::new(connector));

        let resp = client.get("http://a.example:8080/").await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "b.example:8080");
        assert_eq!(body_string(resp).await, "a.example:8080");
    }

    #[tokio::test]
    async fn test_userinfo_does_not_change_dial_target() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::with_connector(Arc::new(remapping(&transport)));

        let resp = client.get("http://user:pw@a.example/").await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "b.example:80");
        assert_eq!(body_string(resp).await, "b.example");

        let dials = transport.dials();
        assert_eq!(dials.len(), 1);
        assert_eq!(dials[0].hostname, "b.example");
        assert_eq!(dials[0].original_hostname(), "a.example");
    }

    #[tokio::test]
    async fn test_unsendable_host_replacement_keeps_header() {
        let transport = Arc::new(RecordingTransport::new());
        let mapping = FnMapping::new(|host: &str| match host {
            "a.example" => Some("b.example"),
            "vhost.example" => Some("bad.example\n"),
            _ => None,
        });
        let connector = RemappingConnector::with_mapping(mapping).with_transport(transport.clone());
        let client = Client::with_connector(Arc::new(connector));

        let req = Request::get("http://a.example/")
            .header(header::HOST, "vhost.example")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = client.request(req).await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "b.example:80");
        assert_eq!(body_string(resp).await, "vhost.example");
    }

    #[tokio::test]
    async fn test_host_header_with_bad_port_is_sent_as_is() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::with_connector(Arc::new(remapping(&transport)));

        let req = Request::get("http://a.example/")
            .header(header::HOST, "a.example:0")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = client.request(req).await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "b.example:80");
        assert_eq!(body_string(resp).await, "a.example:0");
    }

    #[tokio::test]
    async fn test_unmapped_host_passes_through() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::with_connector(Arc::new(remapping(&transport)));

        let resp = client.get("http://c.example/").await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "c.example:80");
        assert_eq!(body_string(resp).await, "c.example");
    }

    #[tokio::test]
    async fn test_fn_mapping_called_once_per_field() {
        let transport = Arc::new(RecordingTransport::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let connector = RemappingConnector::with_mapping(FnMapping::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            None::<String>
        }))
        .with_transport(transport.clone());
        let client = Client::with_connector(Arc::new(connector));

        let resp = client.get("http://unknown.example/").await.unwrap();
        assert_eq!(resp.headers()["x-dialed"], "unknown.example:80");
        // hostname + Host header
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_extension_opts_out() {
        let transport = Arc::new(RecordingTransport::new());
        let client = Client::builder()
            .agent(Agent::Custom(Arc::new(remapping(&transport))))
            .transport(transport.clone())
            .build();

        let mut req = Request::get("http://a.example/")
            .body(Full::new(Bytes::new()))
            .unwrap();
        opt_out(&mut req);
        let resp = client.request(req).await.unwrap();

        assert_eq!(resp.headers()["x-dialed"], "a.example:80");
        assert_eq!(body_string(resp).await, "a.example");
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let client = Client::builder()
            .agent(Agent::Bypass)
            .transport(Arc::new(RecordingTransport::refusing()))
            .build();

        let err = client.get("http://a.example/").await.unwrap_err();
        match err {
            RemapError::Connect(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
            other => panic!("Expected Connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relative_uri_is_rejected() {
        let client = Client::builder().agent(Agent::Bypass).build();
        let err = client.get("/nowhere").await.unwrap_err();
        assert!(matches!(err, RemapError::InvalidRequest { .. }));
    }
}
