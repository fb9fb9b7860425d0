//! Identity presented over a remapped connection.
//!
//! The dial target always follows the mapping. What the far end *sees* (the
//! HTTP `Host` header and the TLS server name) is decided by
//! [`HostHeaderPolicy`]:
//!
//! - [`HostHeaderPolicy::Replacement`] (default): both carry the replacement
//!   hostname, so virtual hosting and certificate validation line up with
//!   the host actually dialled.
//! - [`HostHeaderPolicy::Preserve`]: both keep the originally requested
//!   hostname; only the dial target changes.

use crate::mapping::MappingSource;
use crate::resolver::{replace_domain, split_host_port};
use http::header::{HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Which hostname the Host header and SNI carry after remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostHeaderPolicy {
    /// Host header and SNI follow the replacement hostname.
    #[default]
    Replacement,
    /// Host header and SNI keep the original hostname.
    Preserve,
}

/// A `Host` header split into its name and optional port suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostHeader {
    pub name: String,
    pub port: Option<u16>,
}

impl HostHeader {
    pub fn new(name: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Parses a header value of the form `name` or `name:port`.
    ///
    /// Returns `None` for values that are not visible ASCII or that carry a
    /// malformed port; such headers are sent unchanged.
    pub fn parse(value: &HeaderValue) -> Option<Self> {
        let raw = value.to_str().ok()?.trim();
        let (name, port) = split_host_port(raw)?;
        Some(Self::new(name, port))
    }

    /// Renders back into a header value.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for HostHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.name, port),
            None => f.write_str(&self.name),
        }
    }
}

impl HostHeaderPolicy {
    /// Applies the policy to a dispatch-time Host header.
    ///
    /// Only the name slot is touched, and only when it is non-empty. A
    /// replacement that cannot be sent as a header leaves the name as it was.
    pub fn rewrite_host_header(
        self,
        source: Option<&dyn MappingSource>,
        header: Option<&mut HostHeader>,
    ) {
        if self == Self::Preserve {
            return;
        }
        if let Some(header) = header {
            if header.name.is_empty() {
                return;
            }
            let replacement = replace_domain(source, &header.name);
            if HeaderValue::from_str(&replacement).is_ok() {
                header.name = replacement;
            } else {
                warn!(
                    host = %header.name,
                    replacement = ?replacement,
                    "Replacement is not a valid Host header, keeping original"
                );
            }
        }
    }

    /// Decides the TLS server name at connection time.
    ///
    /// `explicit` is a server name the caller set themselves; `dial_host` is
    /// the (already remapped) connect target and `original` the hostname the
    /// caller asked for.
    pub fn servername(
        self,
        source: Option<&dyn MappingSource>,
        explicit: Option<&str>,
        dial_host: &str,
        original: &str,
    ) -> String {
        match (self, explicit) {
            (Self::Replacement, Some(name)) => replace_domain(source, name),
            (Self::Preserve, Some(name)) => name.to_string(),
            (Self::Replacement, None) => dial_host.to_string(),
            (Self::Preserve, None) => original.to_string(),
        }
    }
}
