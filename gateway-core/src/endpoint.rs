//! The single active gRPC backend the gateway targets, identified by value.
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `host:port` pair naming a gRPC backend.
///
/// Two endpoints with equal host and port are interchangeable; the catalog
/// relies on this to decide whether an already-open discovery channel can be
/// reused across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The plaintext URI used to open a channel to this endpoint.
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
