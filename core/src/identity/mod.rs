// Node identity — display name plus a per-session id

mod store;

pub use store::NameStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Who a node is, as far as the mesh is concerned.
///
/// `name` is the user-chosen display name and is what travels in every
/// message's `from` field. `id` is an opaque identifier minted when the name
/// is set and stable until the name changes; transports may substitute their
/// own stable id (the libp2p mesh uses its peer id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub id: String,
    pub name: String,
}

impl PeerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }

    /// Identity with a caller-chosen id (transports that have their own
    /// stable peer ids use this)
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Manages the local node's identity and the persisted display name.
///
/// The display name is the single piece of local configuration: read once at
/// startup so returning users skip name entry. Changing it mints a fresh
/// session id — callers are expected to tear down and rebuild all links.
pub struct IdentityManager {
    store: NameStore,
    current: Option<PeerIdentity>,
}

impl IdentityManager {
    /// In-memory manager (nothing survives the process)
    pub fn new() -> Self {
        Self {
            store: NameStore::memory(),
            current: None,
        }
    }

    /// Manager backed by persistent storage at the given path
    pub fn with_path(path: &str) -> Result<Self> {
        let store = NameStore::persistent(path)?;
        let current = store.load_name()?.map(PeerIdentity::new);
        if let Some(identity) = &current {
            tracing::info!("Loaded display name \"{}\"", identity.name);
        }
        Ok(Self { store, current })
    }

    pub fn identity(&self) -> Option<&PeerIdentity> {
        self.current.as_ref()
    }

    pub fn display_name(&self) -> Option<String> {
        self.current.as_ref().map(|i| i.name.clone())
    }

    /// Set (or change) the display name, returning the fresh identity.
    ///
    /// Rejects empty names; whitespace is trimmed before persisting.
    pub fn set_name(&mut self, name: &str) -> Result<PeerIdentity> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("display name cannot be empty");
        }

        self.store.save_name(name)?;
        let identity = PeerIdentity::new(name);
        self.current = Some(identity.clone());
        tracing::info!("Display name set to \"{}\"", name);
        Ok(identity)
    }

    /// Forget the stored name (onboarding restarts on next launch)
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.current = None;
        Ok(())
    }
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}
