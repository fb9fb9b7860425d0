//! In-memory transport for unit tests.
//!
//! Every dial is recorded and answered by a hyper server on the other end of
//! a `tokio::io::duplex` pipe. The server echoes the received Host header as
//! the body and reports the dial target, SNI and path in headers.

use crate::request::ConnectOptions;
use crate::transport::{BoxedStream, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::sync::Mutex;

pub(crate) struct RecordingTransport {
    dials: Mutex<Vec<ConnectOptions>>,
    refuse: bool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            dials: Mutex::new(Vec::new()),
            refuse: false,
        }
    }

    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new()
        }
    }

    pub(crate) fn dials(&self) -> Vec<ConnectOptions> {
        self.dials.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&self, opts: &ConnectOptions) -> io::Result<BoxedStream> {
        self.dials.lock().unwrap().push(opts.clone());
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let dialed = format!("{}:{}", opts.hostname, opts.port);
        let sni = opts.servername.clone().unwrap_or_default();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let dialed = dialed.clone();
                let sni = sni.clone();
                async move {
                    let host = req
                        .headers()
                        .get(header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let resp = Response::builder()
                        .header("x-dialed", dialed)
                        .header("x-sni", sni)
                        .header("x-path", req.uri().to_string())
                        .body(Full::new(Bytes::from(host)))
                        .unwrap();
                    Ok::<_, Infallible>(resp)
                }
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(server), service)
                .await;
        });

        Ok(Box::new(client))
    }
}

pub(crate) async fn body_string(resp: Response<Incoming>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
