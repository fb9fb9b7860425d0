//! Domain resolution against a mapping source.
//!
//! Resolution is a single lookup pass: the replacement returned by the
//! source is never looked up again.

use crate::mapping::MappingSource;
use tracing::{debug, trace};

/// Returns the effective hostname for `domain`.
///
/// - An empty `domain` is returned as-is without consulting the source.
/// - With no source, or no usable entry, the original is returned.
/// - Otherwise the replacement, as an owned `String`.
pub fn replace_domain(source: Option<&dyn MappingSource>, domain: &str) -> String {
    if domain.is_empty() {
        return String::new();
    }

    let Some(source) = source else {
        return domain.to_string();
    };

    match source.lookup(domain) {
        Some(replacement) if !replacement.is_empty() => {
            debug!(from = %domain, to = %replacement, "Remapped domain");
            replacement
        }
        _ => {
            trace!(domain = %domain, "Domain not mapped");
            domain.to_string()
        }
    }
}

/// Splits a `host[:port]` authority. Bracketed IPv6 literals keep their
/// brackets.
///
/// Returns `None` when a port is present but is not a number in `1..=65535`.
pub(crate) fn split_host_port(authority: &str) -> Option<(&str, Option<u16>)> {
    let (host, port) = if authority.starts_with('[') {
        let end = authority.find(']')?;
        let rest = &authority[end + 1..];
        if rest.is_empty() {
            return Some((authority, None));
        }
        (&authority[..=end], rest.strip_prefix(':')?)
    } else {
        match authority.rsplit_once(':') {
            Some(parts) => parts,
            None => return Some((authority, None)),
        }
    };

    match port.parse::<u16>() {
        Ok(port) if port != 0 => Some((host, Some(port))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FnMapping, StaticTable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> StaticTable {
        let mut table: StaticTable = [("a.example", "b.example"), ("b.example", "c.example")]
            .into_iter()
            .collect();
        table.insert("falsy.example", "");
        table
    }

    #[test]
    fn test_unmapped_domain_is_unchanged() {
        let table = table();
        assert_eq!(replace_domain(Some(&table), "unknown.example"), "unknown.example");
    }

    #[test]
    fn test_mapped_domain_is_replaced() {
        let table = table();
        assert_eq!(replace_domain(Some(&table), "a.example"), "b.example");
    }

    #[test]
    fn test_falsy_entry_keeps_original() {
        let table = table();
        assert_eq!(replace_domain(Some(&table), "falsy.example"), "falsy.example");
    }

    #[test]
    fn test_no_source_is_passthrough() {
        assert_eq!(replace_domain(None, "a.example"), "a.example");
    }

    #[test]
    fn test_empty_domain_skips_lookup() {
        let calls = AtomicUsize::new(0);
        let mapping = FnMapping::new(|_: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some("b.example")
        });
        assert_eq!(replace_domain(Some(&mapping), ""), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_pass_does_not_chain() {
        let table = table();
        // b.example is itself mapped, but one pass only applies one lookup.
        assert_eq!(replace_domain(Some(&table), "a.example"), "b.example");
    }

    #[test]
    fn test_unmapped_resolution_is_idempotent() {
        let table = table();
        let once = replace_domain(Some(&table), "unknown.example");
        let twice = replace_domain(Some(&table), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fn_source_result_or_original() {
        let mapping = FnMapping::new(|d: &str| (d == "a.example").then(|| "b.example".to_string()));
        assert_eq!(replace_domain(Some(&mapping), "a.example"), "b.example");
        assert_eq!(replace_domain(Some(&mapping), "x.example"), "x.example");
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("example.com:8080"), Some(("example.com", Some(8080))));
        assert_eq!(split_host_port("example.com"), Some(("example.com", None)));
        assert_eq!(split_host_port("[::1]:8080"), Some(("[::1]", Some(8080))));
        assert_eq!(split_host_port("[::1]"), Some(("[::1]", None)));
    }

    #[test]
    fn test_split_host_port_rejects_bad_ports() {
        assert_eq!(split_host_port("example.com:0"), None);
        assert_eq!(split_host_port("example.com:abc"), None);
        assert_eq!(split_host_port("example.com:"), None);
        assert_eq!(split_host_port("example.com:70000"), None);
        assert_eq!(split_host_port("[::1]x"), None);
        assert_eq!(split_host_port("[::1"), None);
    }
}
