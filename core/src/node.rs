// Node facade — assembles identity, session, transport, protocol, companion
//
// This is the seam a platform shell (or the CLI) holds. It owns the running
// pieces and wires their channels; all state flows stay inside the modules
// that define them.

use crate::companion::{self, WearableLink};
use crate::identity::IdentityManager;
use crate::orders::OrderBook;
use crate::protocol::SyncEngine;
use crate::session::{spawn_session, SessionEvent, SessionHandle};
use crate::transport::{start_mesh, MeshConfig, MeshTransport, Transport};
use crate::{PeerIdentity, PulseLinkError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

struct Running {
    session: SessionHandle,
    sync: SyncEngine,
    mesh: MeshTransport,
}

/// One PulseLink node: the whole peer-sync core behind a few mutexes.
pub struct PulseLinkNode {
    identity: Mutex<IdentityManager>,
    running: Mutex<Option<Running>>,
    wearable: Mutex<Option<WearableLink>>,
}

impl PulseLinkNode {
    /// Node with in-memory configuration (nothing survives the process)
    pub fn new() -> Self {
        Self::init(IdentityManager::new())
    }

    /// Node with the display name persisted at `path`, read once here so
    /// returning users skip name entry
    pub fn with_storage(path: &str) -> Self {
        let manager = IdentityManager::with_path(path).unwrap_or_else(|e| {
            tracing::error!("Name store unavailable at {}: {:#}", path, e);
            IdentityManager::new()
        });
        Self::init(manager)
    }

    fn init(identity: IdentityManager) -> Self {
        // Initialize tracing (idempotent)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init();

        Self {
            identity: Mutex::new(identity),
            running: Mutex::new(None),
            wearable: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // IDENTITY
    // ------------------------------------------------------------------------

    pub fn display_name(&self) -> Option<String> {
        self.identity.lock().display_name()
    }

    /// Set or change the display name. A running node is torn down first:
    /// a new identity means every active link is rebuilt from scratch. Peer
    /// state is cleared by the rebuild; the node's own work orders carry over.
    pub async fn set_display_name(&self, name: &str) -> Result<PeerIdentity, PulseLinkError> {
        let prior_orders = self
            .running
            .lock()
            .as_ref()
            .map(|r| r.session.snapshot().my_orders.clone());
        if prior_orders.is_some() {
            self.stop().await;
        }

        let identity = self
            .identity
            .lock()
            .set_name(name)
            .map_err(|_| PulseLinkError::InvalidInput)?;

        if let Some(orders) = prior_orders {
            self.start(orders).await?;
        }
        Ok(identity)
    }

    /// Forget the stored name; onboarding reruns on the next launch.
    /// Stops the node if it was running.
    pub async fn clear_display_name(&self) -> Result<(), PulseLinkError> {
        if self.is_running() {
            self.stop().await;
        }
        self.identity
            .lock()
            .clear()
            .map_err(|_| PulseLinkError::StorageError)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    // ------------------------------------------------------------------------
    // LIFECYCLE
    // ------------------------------------------------------------------------

    /// Join the mesh and start all pumps. `my_orders` seeds the node's own
    /// work-order list.
    pub async fn start(&self, my_orders: OrderBook) -> Result<(), PulseLinkError> {
        if self.is_running() {
            return Err(PulseLinkError::AlreadyRunning);
        }
        let name = self.display_name().ok_or(PulseLinkError::NameNotSet)?;

        let (mesh, events) = start_mesh(MeshConfig::new(&name))
            .await
            .map_err(|e| {
                tracing::error!("Mesh start failed: {}", e);
                PulseLinkError::NetworkError
            })?;

        let (bridge, wearable, samples_rx) = companion::pair();
        let session = spawn_session(mesh.local_identity(), my_orders);
        let sync = SyncEngine::spawn(
            Arc::new(mesh.clone()),
            events,
            session.clone(),
            Some(bridge),
        );

        tokio::spawn(forward_samples(samples_rx, sync.clone()));

        *self.wearable.lock() = Some(wearable);
        *self.running.lock() = Some(Running {
            session,
            sync,
            mesh,
        });

        info!("PulseLink node started as {}", name);
        Ok(())
    }

    pub async fn stop(&self) {
        let running = self.running.lock().take();
        self.wearable.lock().take();
        if let Some(running) = running {
            running.mesh.shutdown().await;
            info!("PulseLink node stopped");
        }
    }

    /// Tear down discovery and every link, clear peer state, start over.
    /// The user-facing recovery action for transport trouble.
    pub async fn reset(&self) -> Result<(), PulseLinkError> {
        let (session, mesh) = {
            let running = self.running.lock();
            let Some(running) = running.as_ref() else {
                return Err(PulseLinkError::NotRunning);
            };
            (running.session.clone(), running.mesh.clone())
        };

        session.dispatch(SessionEvent::ResetPeers).await;
        mesh.reset().await.map_err(|e| {
            tracing::error!("Mesh reset failed: {}", e);
            PulseLinkError::NetworkError
        })
    }

    // ------------------------------------------------------------------------
    // HANDLES
    // ------------------------------------------------------------------------

    pub fn session(&self) -> Option<SessionHandle> {
        self.running.lock().as_ref().map(|r| r.session.clone())
    }

    pub fn sync(&self) -> Option<SyncEngine> {
        self.running.lock().as_ref().map(|r| r.sync.clone())
    }

    /// The simulated wearable counterpart, claimable once per start
    pub fn take_wearable(&self) -> Option<WearableLink> {
        self.wearable.lock().take()
    }
}

impl Default for PulseLinkNode {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward_samples(
    mut samples_rx: mpsc::Receiver<crate::session::VitalsSample>,
    sync: SyncEngine,
) {
    while let Some(sample) = samples_rx.recv().await {
        sync.publish_local_sample(sample).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_node_requires_name_before_start() {
        let node = PulseLinkNode::new();
        let result = node.start(OrderBook::new()).await;
        assert!(matches!(result, Err(PulseLinkError::NameNotSet)));
    }

    #[tokio::test]
    async fn test_set_name_when_stopped() {
        let node = PulseLinkNode::new();
        let identity = node.set_display_name("Alex").await.unwrap();
        assert_eq!(identity.name, "Alex");
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let node = PulseLinkNode::new();
        assert!(node.set_display_name("  ").await.is_err());
    }
}
