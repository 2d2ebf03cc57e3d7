// Session dispatcher — one task owns the state, everything else sends events
//
// Peer callbacks, companion samples, and local user actions all funnel into
// a single mpsc channel of tagged events; the dispatcher applies them in
// arrival order and publishes snapshots through a watch channel. No other
// code path mutates SessionState, which is the whole concurrency story.

mod state;

pub use state::{SessionState, VitalsSample};

use crate::identity::PeerIdentity;
use crate::orders::{OrderBook, WorkOrder, WorkOrderStatus};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tracing::debug;

/// How long the "you've been pinged" banner stays up
pub const PING_BANNER_SECS: u64 = 5;

const EVENT_BUFFER: usize = 256;

/// Everything that can mutate the session, as one tagged union.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerJoined(PeerIdentity),
    PeerLeft(PeerIdentity),
    PingReceived { from: String },
    VitalsReceived { from: String, sample: VitalsSample },
    WorkOrdersReceived { from: String, orders: Vec<WorkOrder> },
    /// Fresh biometric reading from the companion bridge
    LocalSample(VitalsSample),
    /// Local user actions on the node's own work orders
    CreateWorkOrder(WorkOrder),
    UpdateStatus { order_id: String, status: WorkOrderStatus },
    AddNote { order_id: String, author: String, message: String },
    AddChecklistItem { order_id: String, text: String },
    ToggleChecklistItem { order_id: String, item_id: String },
    /// Display-name change or explicit reset: drop all peer-derived state
    ResetPeers,
}

/// Handle for feeding events to and observing the session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Queue an event for the dispatcher. Fire-and-forget: if the session is
    /// gone the event is dropped and logged, never an error at the caller.
    pub async fn dispatch(&self, event: SessionEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Session dispatcher gone; event dropped");
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes (the UI layer's seam)
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// Spawn the dispatcher task owning a fresh session.
pub fn spawn_session(local: PeerIdentity, my_orders: OrderBook) -> SessionHandle {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let (state_tx, state_rx) = watch::channel(SessionState::new(local, my_orders));

    tokio::spawn(run_dispatcher(rx, state_tx));

    SessionHandle { tx, state_rx }
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
) {
    // One global banner expiry, reset on every ping (not stacked per peer)
    let mut ping_expiry: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };

                if matches!(event, SessionEvent::PingReceived { .. }) {
                    ping_expiry = Some(Box::pin(sleep(Duration::from_secs(PING_BANNER_SECS))));
                }
                if matches!(event, SessionEvent::ResetPeers) {
                    ping_expiry = None;
                }

                state_tx.send_modify(|state| apply(state, event));
            }
            () = async { ping_expiry.as_mut().unwrap().await }, if ping_expiry.is_some() => {
                ping_expiry = None;
                state_tx.send_modify(|state| state.clear_ping());
            }
        }
    }

    debug!("Session dispatcher stopped");
}

fn apply(state: &mut SessionState, event: SessionEvent) {
    match event {
        SessionEvent::PeerJoined(identity) => {
            debug!("Peer joined: {}", identity.name);
            state.on_peer_joined(identity);
        }
        SessionEvent::PeerLeft(identity) => {
            debug!("Peer left: {}", identity.name);
            state.on_peer_left(&identity.name);
        }
        SessionEvent::PingReceived { from } => {
            debug!("Ping from {}", from);
            state.on_ping_received(from);
        }
        SessionEvent::VitalsReceived { from, sample } => {
            state.on_vitals_received(from, sample);
        }
        SessionEvent::WorkOrdersReceived { from, orders } => {
            debug!("Work-order snapshot from {} ({} orders)", from, orders.len());
            state.on_work_orders_received(from, orders);
        }
        SessionEvent::LocalSample(sample) => {
            state.on_local_sample(sample);
        }
        SessionEvent::CreateWorkOrder(order) => {
            state.my_orders.create(order);
        }
        SessionEvent::UpdateStatus { order_id, status } => {
            state.my_orders.update_status(&order_id, status);
        }
        SessionEvent::AddNote {
            order_id,
            author,
            message,
        } => {
            state.my_orders.add_note(&order_id, author, message);
        }
        SessionEvent::AddChecklistItem { order_id, text } => {
            state.my_orders.add_checklist_item(&order_id, text);
        }
        SessionEvent::ToggleChecklistItem { order_id, item_id } => {
            state.my_orders.toggle_checklist_item(&order_id, &item_id);
        }
        SessionEvent::ResetPeers => {
            state.reset_peers();
        }
    }
}
