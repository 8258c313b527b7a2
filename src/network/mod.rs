//! Proxy bypass registry
//!
//! Keeps the set of hosts that must be reached directly instead of through
//! the configured outbound HTTP proxy. The storage endpoint host is always
//! registered before the storage client is built.
//!
//! The set is a plain value handed to the client factory. Merging is a set
//! union, so registering the same endpoint twice (or in any order) yields
//! the same set.
//!
//! # Example
//!
//! ```
//! use video_upload_gateway::network::ProxyBypass;
//!
//! let mut bypass = ProxyBypass::from_list("localhost, 10.0.0.1");
//! assert!(bypass.register_endpoint("http://minio.internal:9000"));
//! assert!(!bypass.register_endpoint("not a url"));
//! assert_eq!(bypass.to_string(), "10.0.0.1,localhost,minio.internal");
//! ```

use reqwest::Url;
use std::collections::BTreeSet;
use std::fmt;

/// Set of hosts that skip the outbound proxy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyBypass {
    hosts: BTreeSet<String>,
}

impl ProxyBypass {
    /// Create an empty bypass set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated host list (the `NO_PROXY` format)
    ///
    /// Entries are trimmed; empty entries are dropped.
    pub fn from_list(list: &str) -> Self {
        let hosts = list
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        Self { hosts }
    }

    /// Register the host of a storage endpoint
    ///
    /// Returns `true` when a host was parsed (whether or not it was already
    /// present). A malformed endpoint, or one without a host, leaves the set
    /// untouched and returns `false`.
    pub fn register_endpoint(&mut self, endpoint: &str) -> bool {
        let host = match Url::parse(endpoint) {
            Ok(url) => match url.host_str() {
                Some(host) if !host.is_empty() => host.to_string(),
                _ => return false,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed storage endpoint for proxy bypass");
                return false;
            }
        };

        if self.hosts.insert(host.clone()) {
            tracing::debug!(host = %host, "Registered proxy bypass host");
        }
        true
    }

    /// Whether a host bypasses the proxy
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Iterate over the registered hosts in sorted order
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Convert into the no-proxy matcher installed on a proxy
    pub fn to_no_proxy(&self) -> Option<reqwest::NoProxy> {
        if self.hosts.is_empty() {
            return None;
        }
        reqwest::NoProxy::from_string(&self.to_string())
    }
}

impl fmt::Display for ProxyBypass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for host in &self.hosts {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(host)?;
            first = false;
        }
        Ok(())
    }
}
