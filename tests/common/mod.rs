//! Shared helpers for integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use host_remap::{BoxedStream, ConnectOptions, Transport};
use http::{header, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::sync::Mutex;

/// Records every dial and answers it with an in-memory HTTP/1.1 server that
/// echoes the Host header and reports what was dialled.
#[derive(Default)]
pub struct EchoTransport {
    dials: Mutex<Vec<ConnectOptions>>,
}

impl EchoTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dials(&self) -> Vec<ConnectOptions> {
        self.dials.lock().unwrap().clone()
    }

    pub fn last_dial(&self) -> ConnectOptions {
        self.dials().pop().expect("no connection was opened")
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn connect(&self, opts: &ConnectOptions) -> io::Result<BoxedStream> {
        self.dials.lock().unwrap().push(opts.clone());

        let (client, server) = tokio::io::duplex(64 * 1024);
        let dialed = format!("{}:{}", opts.hostname, opts.port);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let dialed = dialed.clone();
                async move {
                    let host = req
                        .headers()
                        .get(header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Ok::<_, Infallible>(
                        Response::builder()
                            .header("x-dialed", dialed)
                            .body(Full::new(Bytes::from(host)))
                            .unwrap(),
                    )
                }
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(server), service)
                .await;
        });

        Ok(Box::new(client))
    }
}

pub async fn body_string(resp: Response<Incoming>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
