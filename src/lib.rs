//! # host-remap
//!
//! Outbound HTTP/HTTPS connector that sends connections for one hostname to
//! another, while calling code keeps addressing requests by the original
//! name.
//!
//! ## Modules
//!
//! - [`mapping`]: mapping sources (static table, ordered table, callback)
//! - [`resolver`]: single-pass domain resolution
//! - [`connector`]: dispatch/connect hooks over a transport
//! - [`identity`]: Host header and SNI policy
//! - [`transport`]: TCP/TLS connection stack
//! - [`client`]: hyper HTTP/1.1 client over a connector
//! - [`global`]: optional process-wide default connector
//! - [`config`], [`logging`], [`error`]: ambient support for the binary
//!
//! ## Example
//!
//! ```no_run
//! use host_remap::{Client, RemappingConnector, StaticTable};
//! use std::sync::Arc;
//!
//! # async fn run() -> host_remap::Result<()> {
//! let table: StaticTable = [("api.example.com", "staging.example.com")]
//!     .into_iter()
//!     .collect();
//! let client = Client::with_connector(Arc::new(RemappingConnector::with_mapping(table)));
//!
//! // Dials staging.example.com:443.
//! let response = client.get("https://api.example.com/health").await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Host header and SNI
//!
//! By default the Host header and TLS server name follow the replacement
//! host ([`HostHeaderPolicy::Replacement`]). Use
//! [`HostHeaderPolicy::Preserve`] to keep presenting the original name.

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod global;
pub mod identity;
pub mod logging;
pub mod mapping;
pub mod request;
pub mod resolver;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{opt_out, Agent, Client, ClientBuilder};
pub use config::{AppConfig, ConfigManager, DomainMapping};
pub use connector::{Connector, PassthroughConnector, RemappingConnector};
pub use error::{RemapError, Result};
pub use global::{
    global_connector, hijack_global_agent, install_global_connector, install_global_remapping,
    restore_global_agent,
};
pub use identity::{HostHeader, HostHeaderPolicy};
pub use mapping::{FnMapping, MappingSource, OrderedTable, SharedMapping, StaticTable};
pub use request::{ConnectOptions, ConnectionRequest};
pub use resolver::replace_domain;
pub use transport::{BoxedStream, DefaultTransport, Transport};
