//! End-to-end protocol tests over the in-memory hub
//!
//! Each scenario runs real nodes: transport events feed the sync engine,
//! the engine feeds the session dispatcher, and assertions read the
//! published snapshots — the same path the UI layer consumes.
//!
//! Run with: cargo test --test integration_sync

use pulselink_core::orders::OrderBook;
use pulselink_core::protocol::SyncEngine;
use pulselink_core::session::{spawn_session, SessionHandle, VitalsSample};
use pulselink_core::transport::{LocalHub, Transport};
use pulselink_core::WorkOrder;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

/// Let every pump and the dispatcher drain their queues
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

fn spawn_node(hub: &LocalHub, name: &str, orders: Vec<WorkOrder>) -> (SyncEngine, SessionHandle) {
    let (transport, events) = hub.register(name);
    let identity = transport.local_identity();
    let session = spawn_session(identity, OrderBook::with_orders(orders));
    let engine = SyncEngine::spawn(Arc::new(transport), events, session.clone(), None);
    (engine, session)
}

#[tokio::test(start_paused = true)]
async fn test_tie_break_exactly_one_invitation_from_alex() {
    let hub = LocalHub::new();
    let (_alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
    let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
    settle().await;

    // Exactly one invitation, and Jordan never initiates
    assert_eq!(
        hub.invitations(),
        vec![("Alex".to_string(), "Jordan".to_string())]
    );

    // Both sides still end up connected
    assert!(alex_session.snapshot().is_connected("Jordan"));
    assert!(jordan_session.snapshot().is_connected("Alex"));
}

#[tokio::test(start_paused = true)]
async fn test_vitals_last_write_wins_never_averaged() {
    let hub = LocalHub::new();
    let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
    let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
    settle().await;

    alex.publish_local_sample(VitalsSample::new(70.0, 98.0, 120.0))
        .await;
    settle().await;
    assert_eq!(jordan_session.snapshot().peer_vitals["Alex"].heart_rate, 70.0);

    alex.publish_local_sample(VitalsSample::new(95.0, 97.0, 121.0))
        .await;
    settle().await;
    assert_eq!(jordan_session.snapshot().peer_vitals["Alex"].heart_rate, 95.0);
}

#[tokio::test(start_paused = true)]
async fn test_work_order_reply_received_twice_is_identical() {
    let hub = LocalHub::new();
    let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
    let (_jordan, _js) = spawn_node(&hub, "Jordan", WorkOrder::seed_orders());
    settle().await;

    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;
    let after_first = alex_session.snapshot().peer_work_orders["Jordan"].clone();
    assert_eq!(after_first.len(), 2);

    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;
    let after_second = alex_session.snapshot().peer_work_orders["Jordan"].clone();

    assert_eq!(after_first, after_second);
}

#[tokio::test(start_paused = true)]
async fn test_reply_roundtrips_orders_field_for_field() {
    let hub = LocalHub::new();
    let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
    let jordan_orders = WorkOrder::seed_orders();
    let (_jordan, _js) = spawn_node(&hub, "Jordan", jordan_orders.clone());
    settle().await;

    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;

    // What left Jordan's book is exactly what landed in Alex's store
    assert_eq!(
        alex_session.snapshot().peer_work_orders["Jordan"],
        jordan_orders
    );
}

#[tokio::test(start_paused = true)]
async fn test_ping_expiry_timeline() {
    let hub = LocalHub::new();
    let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
    let (taylor, _ts) = spawn_node(&hub, "Taylor", vec![]);
    let (_sam, sam_session) = spawn_node(&hub, "Sam", vec![]);
    settle().await;

    // t = 0: Alex pings Sam
    alex.send_ping("Sam").await.unwrap();
    settle().await;
    assert_eq!(sam_session.snapshot().last_ping_from.as_deref(), Some("Alex"));

    // t = 3: Taylor pings; banner switches and the timer restarts
    advance(Duration::from_secs(3)).await;
    taylor.send_ping("Sam").await.unwrap();
    settle().await;
    assert_eq!(
        sam_session.snapshot().last_ping_from.as_deref(),
        Some("Taylor")
    );

    // t = 7: the original 5 s deadline has passed, banner still up
    advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(
        sam_session.snapshot().last_ping_from.as_deref(),
        Some("Taylor")
    );

    // t = 8+: 5 s after Taylor's ping the banner clears
    advance(Duration::from_millis(1_100)).await;
    settle().await;
    assert!(sam_session.snapshot().last_ping_from.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_membership_retains_snapshots() {
    let hub = LocalHub::new();
    let (jordan, _js) = spawn_node(&hub, "Jordan", WorkOrder::seed_orders());
    let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
    settle().await;

    jordan
        .publish_local_sample(VitalsSample::new(88.0, 96.0, 150.0))
        .await;
    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;

    let snap = alex_session.snapshot();
    assert!(snap.is_connected("Jordan"));
    assert_eq!(snap.peer_vitals["Jordan"].heart_rate, 88.0);
    assert_eq!(snap.peer_work_orders["Jordan"].len(), 2);

    // Jordan drops off the air
    hub.remove("Jordan");
    settle().await;

    let snap = alex_session.snapshot();
    assert!(!snap.is_connected("Jordan"));
    // Last-known snapshot and vitals survive, now flagged stale
    assert_eq!(snap.peer_work_orders["Jordan"].len(), 2);
    let (vitals, stale) = snap.vitals_for("Jordan").unwrap();
    assert_eq!(vitals.heart_rate, 88.0);
    assert!(stale);
}

#[tokio::test(start_paused = true)]
async fn test_garbage_bytes_never_crash_the_receive_path() {
    let hub = LocalHub::new();
    let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
    let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", vec![]);
    let (zed, _zed_rx) = hub.register("Zed");
    settle().await;

    for garbage in [
        &b"\x00\x01\x02\x03"[..],
        b"{}",
        b"{\"kind\":\"unknownKind\",\"from\":\"Zed\"}",
        b"{\"kind\":\"vitals\"",
        b"",
    ] {
        zed.send("Jordan", garbage.to_vec()).await.unwrap();
    }
    settle().await;

    // Jordan's node is alive and the links still deliver real traffic
    alex.send_ping("Jordan").await.unwrap();
    settle().await;
    assert_eq!(
        jordan_session.snapshot().last_ping_from.as_deref(),
        Some("Alex")
    );
}

#[tokio::test(start_paused = true)]
async fn test_vitals_broadcast_skips_no_one() {
    let hub = LocalHub::new();
    let (alex, _as) = spawn_node(&hub, "Alex", vec![]);
    let mut observers = Vec::new();
    for name in ["Jordan", "Sam", "Taylor"] {
        let (_engine, session) = spawn_node(&hub, name, vec![]);
        observers.push(session);
    }
    settle().await;

    alex.publish_local_sample(VitalsSample::new(77.0, 98.5, 131.0))
        .await;
    settle().await;

    for session in observers {
        assert_eq!(session.snapshot().peer_vitals["Alex"].heart_rate, 77.0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_local_edits_visible_in_next_reply() {
    use pulselink_core::session::SessionEvent;
    use pulselink_core::WorkOrderStatus;

    let hub = LocalHub::new();
    let (alex, alex_session) = spawn_node(&hub, "Alex", vec![]);
    let (_jordan, jordan_session) = spawn_node(&hub, "Jordan", WorkOrder::seed_orders());
    settle().await;

    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;
    assert_eq!(
        alex_session.snapshot().peer_work_orders["Jordan"][0].status,
        WorkOrderStatus::InProgress
    );

    // Jordan finishes the PSU swap; Alex re-asks and sees the new status
    jordan_session
        .dispatch(SessionEvent::UpdateStatus {
            order_id: "WO-001".into(),
            status: WorkOrderStatus::Done,
        })
        .await;
    settle().await;

    alex.request_work_orders("Jordan").await.unwrap();
    settle().await;
    assert_eq!(
        alex_session.snapshot().peer_work_orders["Jordan"][0].status,
        WorkOrderStatus::Done
    );
}
