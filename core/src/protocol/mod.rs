// Sync protocol — decides what gets sent when
//
// Three independent flows over one transport, each idempotent or
// self-expiring so the lossy radio needs no sequence numbers:
//   ping           user-triggered, point-to-point, banner self-clears
//   vitals         broadcast on every fresh local sample, best effort,
//                  the next broadcast corrects any loss
//   work orders    point-to-point request, full-list reply; a retry is
//                  simply "ask again"
//
// Inbound, one pump task consumes transport events, decodes payloads and
// dispatches them as session events. A payload that fails to decode is
// logged and dropped; it never poisons the link or reaches the store.

use crate::companion::CompanionBridge;
use crate::message::{self, Message};
use crate::session::{SessionEvent, SessionHandle, VitalsSample};
use crate::transport::{PeerEvent, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Drives the message-level state machine on top of a transport.
#[derive(Clone)]
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    session: SessionHandle,
    companion: Option<CompanionBridge>,
    /// When false, inbound pings are relayed to the wearable
    foregrounded: Arc<AtomicBool>,
    local_name: String,
}

impl SyncEngine {
    /// Wire the engine to a transport's event stream and start the inbound
    /// pump. `companion` is optional: a node without a paired wearable runs
    /// the same protocol minus the relay.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<PeerEvent>,
        session: SessionHandle,
        companion: Option<CompanionBridge>,
    ) -> Self {
        let engine = Self {
            local_name: transport.local_identity().name,
            transport,
            session,
            companion,
            foregrounded: Arc::new(AtomicBool::new(true)),
        };

        tokio::spawn(engine.clone().run_pump(events));
        engine
    }

    /// The app shell reports foreground transitions here
    pub fn set_foregrounded(&self, foregrounded: bool) {
        self.foregrounded.store(foregrounded, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------------
    // OUTBOUND
    // ------------------------------------------------------------------------

    /// User-triggered ping to one peer
    pub async fn send_ping(&self, peer: &str) -> Result<(), TransportError> {
        let msg = Message::ping(self.local_name.clone());
        self.send_to(peer, &msg).await
    }

    /// Ask one peer for its complete work-order list
    pub async fn request_work_orders(&self, peer: &str) -> Result<(), TransportError> {
        let msg = Message::request_work_orders(self.local_name.clone());
        self.send_to(peer, &msg).await
    }

    /// A fresh local biometric sample: update the store, then broadcast to
    /// every connected peer. No acknowledgement, no retry — the next sample
    /// supersedes this one anyway.
    pub async fn publish_local_sample(&self, sample: VitalsSample) {
        self.session
            .dispatch(SessionEvent::LocalSample(sample))
            .await;

        let msg = Message::vitals(
            self.local_name.clone(),
            sample.heart_rate,
            sample.oxygen,
            sample.energy,
        );
        match message::encode(&msg) {
            Ok(payload) => {
                if let Err(e) = self.transport.broadcast(payload).await {
                    warn!("Vitals broadcast failed: {}", e);
                }
            }
            Err(e) => warn!("Vitals encode failed: {}", e),
        }
    }

    async fn send_to(&self, peer: &str, msg: &Message) -> Result<(), TransportError> {
        let payload =
            message::encode(msg).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.send(peer, payload).await
    }

    // ------------------------------------------------------------------------
    // INBOUND
    // ------------------------------------------------------------------------

    async fn run_pump(self, mut events: mpsc::Receiver<PeerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::Connecting(identity) => {
                    debug!("Negotiating link with {}", identity.name);
                }
                PeerEvent::Joined(identity) => {
                    self.session.dispatch(SessionEvent::PeerJoined(identity)).await;
                }
                PeerEvent::Left(identity) => {
                    self.session.dispatch(SessionEvent::PeerLeft(identity)).await;
                }
                PeerEvent::Bytes { from, payload } => match message::decode(&payload) {
                    Ok(msg) => self.dispatch_message(msg).await,
                    Err(e) => {
                        // Malformed or unknown kind: drop silently from the
                        // protocol's perspective, leave a trace for debugging
                        warn!("Dropping undecodable payload from {}: {}", from.name, e);
                    }
                },
                PeerEvent::Failed { reason } => {
                    warn!("Transport reported failure: {} (reset to recover)", reason);
                }
            }
        }
        debug!("Sync pump stopped");
    }

    async fn dispatch_message(&self, msg: Message) {
        match msg {
            Message::Ping { from } => {
                self.session
                    .dispatch(SessionEvent::PingReceived { from })
                    .await;
                if !self.foregrounded.load(Ordering::Relaxed) {
                    if let Some(companion) = &self.companion {
                        companion.notify_ping();
                    }
                }
            }
            Message::Vitals {
                from,
                heart_rate,
                oxygen,
                energy,
            } => {
                self.session
                    .dispatch(SessionEvent::VitalsReceived {
                        from,
                        sample: VitalsSample::new(heart_rate, oxygen, energy),
                    })
                    .await;
            }
            Message::RequestWorkOrders { from } => {
                // Reply with the complete current list — never a diff, so a
                // repeated request is harmless
                let orders = self.session.snapshot().my_orders.orders().to_vec();
                let reply = Message::work_orders_reply(self.local_name.clone(), orders);
                if let Err(e) = self.send_to(&from, &reply).await {
                    warn!("Work-order reply to {} failed: {}", from, e);
                }
            }
            Message::WorkOrdersReply { from, orders } => {
                self.session
                    .dispatch(SessionEvent::WorkOrdersReceived { from, orders })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{OrderBook, WorkOrder};
    use crate::session::spawn_session;
    use crate::transport::LocalHub;

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_node(
        hub: &LocalHub,
        name: &str,
        orders: Vec<WorkOrder>,
    ) -> (SyncEngine, SessionHandle) {
        let (transport, events) = hub.register(name);
        let identity = transport.local_identity();
        let session = spawn_session(identity, OrderBook::with_orders(orders));
        let engine = SyncEngine::spawn(Arc::new(transport), events, session.clone(), None);
        (engine, session)
    }

    #[tokio::test]
    async fn test_ping_lands_in_receiver_store() {
        let hub = LocalHub::new();
        let (alex, _alex_session) = spawn_node(&hub, "Alex", vec![]);
        let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
        settle().await;

        alex.send_ping("Jordan").await.unwrap();
        settle().await;

        assert_eq!(
            jordan_session.snapshot().last_ping_from.as_deref(),
            Some("Alex")
        );
    }

    #[tokio::test]
    async fn test_request_reply_carries_full_list() {
        let hub = LocalHub::new();
        let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
        let (_jordan, _jordan_session) = spawn_node(&hub, "Jordan", WorkOrder::seed_orders());
        settle().await;

        alex.request_work_orders("Jordan").await.unwrap();
        settle().await;

        let snap = alex_session.snapshot();
        assert_eq!(snap.peer_work_orders["Jordan"].len(), 2);
        assert_eq!(snap.peer_work_orders["Jordan"][0].id, "WO-001");
    }

    #[tokio::test]
    async fn test_repeated_request_is_idempotent() {
        let hub = LocalHub::new();
        let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
        let (_jordan, _js) = spawn_node(&hub, "Jordan", WorkOrder::seed_orders());
        settle().await;

        alex.request_work_orders("Jordan").await.unwrap();
        settle().await;
        let once = alex_session.snapshot().peer_work_orders["Jordan"].clone();

        alex.request_work_orders("Jordan").await.unwrap();
        settle().await;

        assert_eq!(alex_session.snapshot().peer_work_orders["Jordan"], once);
    }

    #[tokio::test]
    async fn test_vitals_broadcast_last_write_wins() {
        let hub = LocalHub::new();
        let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
        let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
        let (_sam, sam_session) = spawn_node(&hub, "Sam", vec![]);
        settle().await;

        alex.publish_local_sample(VitalsSample::new(70.0, 98.0, 120.0))
            .await;
        alex.publish_local_sample(VitalsSample::new(95.0, 97.0, 121.0))
            .await;
        settle().await;

        assert_eq!(jordan_session.snapshot().peer_vitals["Alex"].heart_rate, 95.0);
        assert_eq!(sam_session.snapshot().peer_vitals["Alex"].heart_rate, 95.0);
    }

    #[tokio::test]
    async fn test_local_sample_updates_own_store_even_when_alone() {
        let hub = LocalHub::new();
        let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
        settle().await;

        alex.publish_local_sample(VitalsSample::new(82.0, 99.0, 133.0))
            .await;
        settle().await;

        let snap = alex_session.snapshot();
        assert_eq!(snap.local_vitals.unwrap().heart_rate, 82.0);
    }

    #[tokio::test]
    async fn test_garbage_payload_does_not_poison_link() {
        let hub = LocalHub::new();
        let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
        let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
        // A raw node with no engine, so it can put arbitrary bytes on the wire
        let (zed, _zed_rx) = hub.register("Zed");
        settle().await;

        zed.send("Jordan", b"\x00\xff garbage".to_vec()).await.unwrap();
        settle().await;

        // The link still works: a real ping right after is dispatched
        alex.send_ping("Jordan").await.unwrap();
        settle().await;
        assert_eq!(
            jordan_session.snapshot().last_ping_from.as_deref(),
            Some("Alex")
        );
    }

    #[tokio::test]
    async fn test_ping_relayed_to_companion_only_when_backgrounded() {
        use crate::companion;

        let hub = LocalHub::new();
        let (bridge, mut wearable, _samples_rx) = companion::pair();

        let (transport, events) = hub.register("Jordan");
        let session = spawn_session(transport.local_identity(), OrderBook::new());
        let jordan = SyncEngine::spawn(Arc::new(transport), events, session, Some(bridge));

        let (alex, _alex_session) = spawn_node(&hub, "Alex", vec![]);
        settle().await;

        // Foregrounded: no relay
        alex.send_ping("Jordan").await.unwrap();
        settle().await;
        assert!(wearable.try_recv_notify().is_none());

        // Backgrounded: relay fires
        jordan.set_foregrounded(false);
        alex.send_ping("Jordan").await.unwrap();
        settle().await;
        assert_eq!(
            wearable.try_recv_notify(),
            Some(companion::CompanionNotify::Ping)
        );
    }
}
