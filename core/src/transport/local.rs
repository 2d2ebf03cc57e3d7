// In-memory transport — a hub of nodes wired by channels
//
// Used by the protocol integration tests and the CLI's loopback demo. Same
// event surface and the same invitation tie-break path as the real mesh, so
// protocol behavior observed here transfers. The hub records who invited
// whom, which makes tie-break determinism directly assertable.

use super::adapter::{PeerEvent, Transport, TransportError};
use super::link::LinkTracker;
use crate::identity::PeerIdentity;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const EVENT_BUFFER: usize = 256;

struct NodeSlot {
    identity: PeerIdentity,
    events: mpsc::Sender<PeerEvent>,
    tracker: LinkTracker,
}

#[derive(Default)]
struct HubInner {
    nodes: HashMap<String, NodeSlot>,
    /// (initiator, invitee) pairs, in pairing order
    invitations: Vec<(String, String)>,
}

/// The shared "radio space" local transports attach to.
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node. Discovery against every node already present runs
    /// immediately: one invitation per pair, links come up both ways.
    pub fn register(&self, name: &str) -> (LocalTransport, mpsc::Receiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let identity = PeerIdentity::with_id(name, name);

        {
            let mut inner = self.inner.lock();
            let slot = NodeSlot {
                identity: identity.clone(),
                events: events_tx,
                tracker: LinkTracker::new(name),
            };
            inner.nodes.insert(name.to_string(), slot);
            Self::pair_with_all(&mut inner, name);
        }

        let transport = LocalTransport {
            identity,
            hub: self.clone(),
        };
        (transport, events_rx)
    }

    /// Detach a node entirely (it walked out of range)
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.nodes.remove(name) else {
            return;
        };
        let left_identity = slot.identity;
        for other in inner.nodes.values_mut() {
            if other.tracker.is_connected(&left_identity.name) {
                other.tracker.on_disconnected(&left_identity.name);
                let _ = other.events.try_send(PeerEvent::Left(left_identity.clone()));
            }
        }
    }

    /// Every invitation sent so far, as (initiator, invitee)
    pub fn invitations(&self) -> Vec<(String, String)> {
        self.inner.lock().invitations.clone()
    }

    fn pair_with_all(inner: &mut HubInner, name: &str) {
        let others: Vec<String> = inner
            .nodes
            .keys()
            .filter(|n| n.as_str() != name)
            .cloned()
            .collect();

        for other in others {
            Self::pair(inner, name, &other);
        }
    }

    /// Simultaneous discovery between two attached nodes. Exactly one side's
    /// tracker approves an invitation; the other only accepts.
    fn pair(inner: &mut HubInner, a: &str, b: &str) {
        let a_invites = match inner.nodes.get_mut(a) {
            Some(slot) => slot.tracker.on_discovered(b),
            None => return,
        };
        let b_invites = match inner.nodes.get_mut(b) {
            Some(slot) => slot.tracker.on_discovered(a),
            None => return,
        };

        let (initiator, invitee) = match (a_invites, b_invites) {
            (true, false) => (a.to_string(), b.to_string()),
            (false, true) => (b.to_string(), a.to_string()),
            // Already linked (or mid-attempt) — nothing to do
            (false, false) => return,
            (true, true) => unreachable!("tie-break approved both sides"),
        };

        let accepted = match inner.nodes.get_mut(&invitee) {
            Some(slot) => slot.tracker.on_invited(&initiator),
            None => false,
        };
        if !accepted {
            return;
        }

        inner
            .invitations
            .push((initiator.clone(), invitee.clone()));
        debug!("Invitation {} -> {}", initiator, invitee);

        for (name, peer) in [(&initiator, &invitee), (&invitee, &initiator)] {
            let peer_identity = inner.nodes[peer.as_str()].identity.clone();
            if let Some(slot) = inner.nodes.get_mut(name.as_str()) {
                slot.tracker.on_connecting(peer);
                let _ = slot
                    .events
                    .try_send(PeerEvent::Connecting(peer_identity.clone()));
                slot.tracker.on_connected(peer);
                let _ = slot.events.try_send(PeerEvent::Joined(peer_identity));
            }
        }
    }

    fn deliver(&self, from: &PeerIdentity, to: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let inner = self.inner.lock();
        let Some(slot) = inner.nodes.get(to) else {
            return Err(TransportError::PeerNotFound(to.to_string()));
        };
        if !slot.tracker.is_connected(&from.name) {
            return Err(TransportError::PeerNotFound(to.to_string()));
        }
        slot.events
            .try_send(PeerEvent::Bytes {
                from: from.clone(),
                payload,
            })
            .map_err(|_| TransportError::SendFailed(format!("{to} receiver gone")))
    }

    fn broadcast_from(&self, from: &PeerIdentity, payload: Vec<u8>) -> usize {
        let inner = self.inner.lock();
        let Some(sender_slot) = inner.nodes.get(&from.name) else {
            return 0;
        };
        let targets = sender_slot.tracker.connected();

        let mut delivered = 0;
        for target in targets {
            if let Some(slot) = inner.nodes.get(&target) {
                let ok = slot
                    .events
                    .try_send(PeerEvent::Bytes {
                        from: from.clone(),
                        payload: payload.clone(),
                    })
                    .is_ok();
                if ok {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn connected_of(&self, name: &str) -> Vec<PeerIdentity> {
        let inner = self.inner.lock();
        let Some(slot) = inner.nodes.get(name) else {
            return Vec::new();
        };
        slot.tracker
            .connected()
            .into_iter()
            .filter_map(|peer| inner.nodes.get(&peer).map(|s| s.identity.clone()))
            .collect()
    }

    fn reset_node(&self, name: &str) {
        let mut inner = self.inner.lock();

        // Tear down this node's links from both ends
        let Some(slot) = inner.nodes.get_mut(name) else {
            return;
        };
        let identity = slot.identity.clone();
        let peers = slot.tracker.connected();
        slot.tracker.clear();
        for peer in &peers {
            let Some(peer_identity) = inner.nodes.get(peer.as_str()).map(|s| s.identity.clone())
            else {
                continue;
            };
            if let Some(me) = inner.nodes.get_mut(name) {
                let _ = me.events.try_send(PeerEvent::Left(peer_identity));
            }
            if let Some(other) = inner.nodes.get_mut(peer.as_str()) {
                other.tracker.on_disconnected(name);
                let _ = other.events.try_send(PeerEvent::Left(identity.clone()));
            }
        }

        // Fresh discovery round
        Self::pair_with_all(&mut inner, name);
    }
}

/// One node's view of the hub.
pub struct LocalTransport {
    identity: PeerIdentity,
    hub: LocalHub,
}

impl LocalTransport {
    /// Simulate this node dropping off the air
    pub fn leave(&self) {
        self.hub.remove(&self.identity.name);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn local_identity(&self) -> PeerIdentity {
        self.identity.clone()
    }

    async fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.hub.connected_of(&self.identity.name)
    }

    async fn send(&self, peer: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.hub.deliver(&self.identity, peer, payload)
    }

    async fn broadcast(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.hub.broadcast_from(&self.identity, payload);
        Ok(())
    }

    async fn reset(&self) -> Result<(), TransportError> {
        self.hub.reset_node(&self.identity.name);
        Ok(())
    }
}
