//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account credential handed to exactly one worker.
///
/// Holds opaque key material. `Debug` and `Display` only show a short
/// prefix so identities never end up in logs in full.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap raw key material.
    pub fn new(key: impl Into<String>) -> Self {
        Identity(key.into())
    }

    /// The raw key material.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short, log-safe prefix of the key material.
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}..")
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.fingerprint())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl From<&str> for Identity {
    fn from(key: &str) -> Self {
        Identity::new(key)
    }
}

impl From<String> for Identity {
    fn from(key: String) -> Self {
        Identity(key)
    }
}

/// Public account address (the fee payer of a transaction).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        AccountId(id.to_string())
    }
}

/// Network node endpoint (base URL of a node API).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint from a base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Endpoint(url.into())
    }

    /// The base URL as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a path onto the base URL.
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::new(url)
    }
}
