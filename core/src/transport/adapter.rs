//! Transport seam — what the protocol layer sees of any transport
//!
//! A transport discovers nearby nodes advertising the same service token,
//! keeps encrypted reliable links to them, and moves opaque bytes. It knows
//! nothing about message kinds; the codec and protocol live above it.

use crate::identity::PeerIdentity;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Fixed service identifier — nodes advertising a different token are
/// invisible to each other. Must match on every device.
pub const SERVICE_NAME: &str = "pulselink-peer";

/// Events from the transport to the protocol layer.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Link negotiation started (either side initiated)
    Connecting(PeerIdentity),
    /// Encrypted link is up and attributed to a display name
    Joined(PeerIdentity),
    /// Link lost or closed
    Left(PeerIdentity),
    /// Opaque payload delivered from a connected peer
    Bytes { from: PeerIdentity, payload: Vec<u8> },
    /// Discovery/advertising failure — recoverable, the user retries via reset
    Failed { reason: String },
}

// Keeps payload bytes out of log lines
impl fmt::Display for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::Connecting(p) => write!(f, "Connecting {{ {} }}", p.name),
            PeerEvent::Joined(p) => write!(f, "Joined {{ {} }}", p.name),
            PeerEvent::Left(p) => write!(f, "Left {{ {} }}", p.name),
            PeerEvent::Bytes { from, payload } => {
                write!(f, "Bytes {{ from: {}, len: {} }}", from.name, payload.len())
            }
            PeerEvent::Failed { reason } => write!(f, "Failed {{ {} }}", reason),
        }
    }
}

/// Errors reported by transports. All of these are non-fatal to the process;
/// the worst case is stale or missing peer data.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Peer not connected: {0}")]
    PeerNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Discovery start failed: {0}")]
    StartFailed(String),

    #[error("Transport not running")]
    NotRunning,
}

/// The transport contract consumed by the sync protocol.
///
/// Sends are fire-and-forget from the caller's perspective: an `Err` here
/// means the send could not even be queued (unknown peer, transport gone);
/// delivery failures after queueing are logged, never thrown back.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// This node's identity as seen on this transport
    fn local_identity(&self) -> PeerIdentity;

    /// Peers with an established link right now
    async fn connected_peers(&self) -> Vec<PeerIdentity>;

    /// Reliable point-to-point send to one connected peer (by display name)
    async fn send(&self, peer: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Best-effort delivery to every connected peer
    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Tear down discovery and all links, clear the peer set, start over.
    /// The only recovery path for discovery failures; idempotent.
    async fn reset(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerIdentity {
        PeerIdentity::with_id(name.to_lowercase(), name)
    }

    #[test]
    fn test_event_display_is_compact() {
        let event = PeerEvent::Bytes {
            from: peer("Alex"),
            payload: vec![0u8; 4096],
        };
        let shown = event.to_string();
        assert!(shown.contains("Alex"));
        assert!(shown.contains("4096"));
        assert!(!shown.contains("[0"));
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::PeerNotFound("Jordan".to_string());
        assert!(err.to_string().contains("Jordan"));
    }
}
