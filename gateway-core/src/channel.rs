//! # Connection Factory
//!
//! Creates the transient channels the gateway uses to talk to its backend.
//!
//! Channels are opened lazily over plaintext HTTP/2: building one never touches
//! the network, so an unreachable backend only surfaces once the first call is
//! attempted. The transport re-establishes the underlying connection on demand,
//! which covers transient failures between calls.
//!
//! There is no pooling: each proxied request gets a fresh channel, used for one
//! RPC and dropped afterwards (dropping a [`Channel`] tears the transport down).
use crate::endpoint::Endpoint;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid endpoint '{endpoint}': '{source}'")]
    InvalidUri {
        endpoint: String,
        source: tonic::transport::Error,
    },
}

pub struct ChannelFactory;

impl ChannelFactory {
    /// Opens a lazy plaintext channel to `endpoint`.
    ///
    /// Must be called from within a Tokio runtime: the transport spawns its
    /// connection task there even though no connection is attempted yet.
    pub fn create(endpoint: &Endpoint) -> Result<Channel, ConnectError> {
        let transport = tonic::transport::Endpoint::from_shared(endpoint.uri()).map_err(|source| {
            ConnectError::InvalidUri {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;
        Ok(transport.connect_lazy())
    }
}
