// PulseLink core — peer session and synchronization layer
//
// "Does this help two technicians on the same floor see each other's
//  vitals and work orders without any server in the middle?"
//
// If the answer is no, it doesn't belong in core.

pub mod companion;
pub mod identity;
pub mod message;
pub mod node;
pub mod orders;
pub mod protocol;
pub mod session;
pub mod transport;

use thiserror::Error;

pub use identity::{IdentityManager, PeerIdentity};
pub use message::{decode, encode, DecodeError, Message};
pub use node::PulseLinkNode;
pub use orders::{ChecklistItem, Note, OrderBook, WorkOrder, WorkOrderPriority, WorkOrderStatus};
pub use session::{SessionEvent, SessionHandle, SessionState, VitalsSample};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum PulseLinkError {
    #[error("Display name not set")]
    NameNotSet,
    #[error("Already running")]
    AlreadyRunning,
    #[error("Not running")]
    NotRunning,
    #[error("Storage error")]
    StorageError,
    #[error("Network error")]
    NetworkError,
    #[error("Invalid input")]
    InvalidInput,
    #[error("Internal error")]
    Internal,
}

impl From<anyhow::Error> for PulseLinkError {
    fn from(_err: anyhow::Error) -> Self {
        PulseLinkError::Internal
    }
}

/// Unix timestamp in whole seconds.
///
/// All created/updated stamps in the store use this; the companion uplink
/// keeps the fractional-seconds float the wearable sends.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
