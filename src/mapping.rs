//! Pluggable hostname mapping sources.
//!
//! Every source answers a single question: "what should this hostname be
//! replaced with, if anything?". Three concrete shapes are provided:
//!
//! - [`StaticTable`]: hash-table backed; an entry may exist and still be
//!   unmapped (empty or absent target).
//! - [`OrderedTable`]: ordered associative structure with `get`/`contains`
//!   accessors.
//! - [`FnMapping`]: a callback deciding per hostname.
//!
//! Plain `HashMap<String, String>` and `BTreeMap<String, String>` are sources
//! too, and wrapping any source in `RwLock` gives a table the application can
//! edit while connectors keep reading it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A rule set mapping one hostname to another.
///
/// `None` means "not mapped". Lookups are case-sensitive.
pub trait MappingSource: Send + Sync {
    /// Returns the replacement for `domain`, if there is one.
    fn lookup(&self, domain: &str) -> Option<String>;
}

/// Shared handle to a mapping source.
pub type SharedMapping = Arc<dyn MappingSource>;

/// Hash-table backed mapping.
///
/// Unlike a plain map, a table can hold an explicit entry whose target is
/// empty or absent. Such an entry resolves to the original hostname.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTable {
    entries: HashMap<String, Option<String>>,
}

impl StaticTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `from` to `to`, returning the previous target if any.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) -> Option<String> {
        self.entries
            .insert(from.into(), Some(to.into()))
            .flatten()
    }

    /// Records an explicit entry for `from` that does not remap it.
    pub fn insert_unmapped(&mut self, from: impl Into<String>) {
        self.entries.insert(from.into(), None);
    }

    /// Removes the entry for `from`.
    pub fn remove(&mut self, from: &str) -> Option<String> {
        self.entries.remove(from).flatten()
    }

    /// Whether the table has an entry for `from`, mapped or not.
    pub fn contains(&self, from: &str) -> bool {
        self.entries.contains_key(from)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries with a non-empty target.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(from, to)| match to {
            Some(to) if !to.is_empty() => Some((from.as_str(), to.as_str())),
            _ => None,
        })
    }
}

impl MappingSource for StaticTable {
    fn lookup(&self, domain: &str) -> Option<String> {
        match self.entries.get(domain) {
            Some(Some(target)) if !target.is_empty() => Some(target.clone()),
            _ => None,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for StaticTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(from, to)| (from.into(), Some(to.into())))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for StaticTable {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Ordered associative mapping with `get`/`contains` access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedTable {
    entries: BTreeMap<String, String>,
}

impl OrderedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target for `from`.
    pub fn set(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.entries.insert(from.into(), to.into());
        self
    }

    pub fn get(&self, from: &str) -> Option<&str> {
        self.entries.get(from).map(String::as_str)
    }

    pub fn contains(&self, from: &str) -> bool {
        self.entries.contains_key(from)
    }

    pub fn remove(&mut self, from: &str) -> Option<String> {
        self.entries.remove(from)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl MappingSource for OrderedTable {
    fn lookup(&self, domain: &str) -> Option<String> {
        self.get(domain)
            .filter(|target| !target.is_empty())
            .map(str::to_owned)
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }
}

/// Callback-driven mapping.
///
/// The callback may return anything convertible into a `String`; `None` or
/// an empty result leaves the hostname unchanged.
pub struct FnMapping<F> {
    func: F,
}

impl<F> FnMapping<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnMapping<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMapping").finish_non_exhaustive()
    }
}

impl<F, S> MappingSource for FnMapping<F>
where
    F: Fn(&str) -> Option<S> + Send + Sync,
    S: Into<String>,
{
    fn lookup(&self, domain: &str) -> Option<String> {
        (self.func)(domain)
            .map(Into::into)
            .filter(|target: &String| !target.is_empty())
    }
}

impl MappingSource for HashMap<String, String> {
    fn lookup(&self, domain: &str) -> Option<String> {
        self.get(domain).filter(|t| !t.is_empty()).cloned()
    }
}

impl MappingSource for BTreeMap<String, String> {
    fn lookup(&self, domain: &str) -> Option<String> {
        self.get(domain).filter(|t| !t.is_empty()).cloned()
    }
}

impl<M: MappingSource + ?Sized> MappingSource for Arc<M> {
    fn lookup(&self, domain: &str) -> Option<String> {
        (**self).lookup(domain)
    }
}

impl<M: MappingSource + ?Sized> MappingSource for Box<M> {
    fn lookup(&self, domain: &str) -> Option<String> {
        (**self).lookup(domain)
    }
}

// A poisoned lock still holds a usable table; writers only ever replace
// whole entries.
impl<M: MappingSource> MappingSource for RwLock<M> {
    fn lookup(&self, domain: &str) -> Option<String> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(domain)
    }
}
