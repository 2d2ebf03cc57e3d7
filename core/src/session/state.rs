// Session state — the single source of truth the UI layer observes
//
// Mutated only by the dispatcher task in `session::spawn_session`; everything
// here is plain data with reducer methods, testable with zero UI or network
// dependencies.

use crate::identity::PeerIdentity;
use crate::now_secs;
use crate::orders::{OrderBook, WorkOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One biometric reading. At most one "current" sample is retained per peer;
/// there is no history buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSample {
    pub heart_rate: f64,
    pub oxygen: f64,
    pub energy: f64,
    /// When this node recorded the sample (unix seconds)
    pub recorded_at: u64,
}

impl VitalsSample {
    pub fn new(heart_rate: f64, oxygen: f64, energy: f64) -> Self {
        Self {
            heart_rate,
            oxygen,
            energy,
            recorded_at: now_secs(),
        }
    }
}

/// Observable session snapshot.
///
/// Peer-keyed maps use the display name, which is what every message's
/// `from` field carries. Vitals and work-order snapshots survive a peer
/// leaving: the display layer derives staleness from `connected_peers`
/// membership instead of losing last-known data.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub local: PeerIdentity,
    pub connected_peers: Vec<PeerIdentity>,
    pub local_vitals: Option<VitalsSample>,
    pub peer_vitals: HashMap<String, VitalsSample>,
    pub peer_work_orders: HashMap<String, Vec<WorkOrder>>,
    /// Transient ping banner; cleared by the dispatcher 5 s after the last ping
    pub last_ping_from: Option<String>,
    /// The local node's own orders — the list served in replies
    pub my_orders: OrderBook,
}

impl SessionState {
    pub fn new(local: PeerIdentity, my_orders: OrderBook) -> Self {
        Self {
            local,
            connected_peers: Vec::new(),
            local_vitals: None,
            peer_vitals: HashMap::new(),
            peer_work_orders: HashMap::new(),
            last_ping_from: None,
            my_orders,
        }
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected_peers.iter().any(|p| p.name == name)
    }

    /// Vitals for a peer, with a flag marking them stale (peer no longer
    /// connected)
    pub fn vitals_for(&self, name: &str) -> Option<(VitalsSample, bool)> {
        self.peer_vitals
            .get(name)
            .map(|sample| (*sample, !self.is_connected(name)))
    }

    // ------------------------------------------------------------------------
    // Reducers — called by the dispatcher only
    // ------------------------------------------------------------------------

    pub(crate) fn on_peer_joined(&mut self, identity: PeerIdentity) {
        if !self.connected_peers.iter().any(|p| p.name == identity.name) {
            self.connected_peers.push(identity);
        }
    }

    /// Membership is dropped; vitals and work-order snapshots are retained
    /// as last-known data.
    pub(crate) fn on_peer_left(&mut self, name: &str) {
        self.connected_peers.retain(|p| p.name != name);
    }

    pub(crate) fn on_ping_received(&mut self, from: String) {
        self.last_ping_from = Some(from);
    }

    pub(crate) fn clear_ping(&mut self) {
        self.last_ping_from = None;
    }

    /// Last write wins; no averaging, no merge
    pub(crate) fn on_vitals_received(&mut self, from: String, sample: VitalsSample) {
        self.peer_vitals.insert(from, sample);
    }

    /// The remote snapshot fully replaces whatever we had for that peer
    pub(crate) fn on_work_orders_received(&mut self, from: String, orders: Vec<WorkOrder>) {
        self.peer_work_orders.insert(from, orders);
    }

    pub(crate) fn on_local_sample(&mut self, sample: VitalsSample) {
        self.local_vitals = Some(sample);
    }

    /// Display-name change or explicit reset: all peer-derived state goes
    pub(crate) fn reset_peers(&mut self) {
        self.connected_peers.clear();
        self.peer_vitals.clear();
        self.peer_work_orders.clear();
        self.last_ping_from = None;
    }
}
