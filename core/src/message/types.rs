// Message types — everything that crosses the peer mesh

use crate::orders::WorkOrder;
use serde::{Deserialize, Serialize};

/// An application message exchanged between peers.
///
/// The wire form is a self-describing record tagged by `kind`, so a receiver
/// can dispatch without knowing what to expect next. Every kind carries the
/// sender's display name in `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Message {
    /// "Look at your screen" — user-triggered, point-to-point
    Ping { from: String },
    /// Latest biometric reading, broadcast best-effort to all peers
    #[serde(rename_all = "camelCase")]
    Vitals {
        from: String,
        heart_rate: f64,
        oxygen: f64,
        energy: f64,
    },
    /// Ask a peer for its complete work-order list
    RequestWorkOrders { from: String },
    /// Full snapshot of the sender's own work orders (never a diff)
    WorkOrdersReply { from: String, orders: Vec<WorkOrder> },
}

impl Message {
    pub fn ping(from: impl Into<String>) -> Self {
        Message::Ping { from: from.into() }
    }

    pub fn vitals(from: impl Into<String>, heart_rate: f64, oxygen: f64, energy: f64) -> Self {
        Message::Vitals {
            from: from.into(),
            heart_rate,
            oxygen,
            energy,
        }
    }

    pub fn request_work_orders(from: impl Into<String>) -> Self {
        Message::RequestWorkOrders { from: from.into() }
    }

    pub fn work_orders_reply(from: impl Into<String>, orders: Vec<WorkOrder>) -> Self {
        Message::WorkOrdersReply {
            from: from.into(),
            orders,
        }
    }

    /// Sender display name, regardless of kind
    pub fn from(&self) -> &str {
        match self {
            Message::Ping { from }
            | Message::Vitals { from, .. }
            | Message::RequestWorkOrders { from }
            | Message::WorkOrdersReply { from, .. } => from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_wire_shape() {
        let msg = Message::ping("Alex");
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["kind"], "ping");
        assert_eq!(json["from"], "Alex");
    }

    #[test]
    fn test_vitals_wire_shape_uses_camel_case() {
        let msg = Message::vitals("Alex", 72.0, 98.0, 140.0);
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["kind"], "vitals");
        assert_eq!(json["heartRate"], 72.0);
        assert_eq!(json["oxygen"], 98.0);
        assert_eq!(json["energy"], 140.0);
    }

    #[test]
    fn test_request_kind_discriminator() {
        let msg = Message::request_work_orders("Jordan");
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["kind"], "requestWorkOrders");
    }

    #[test]
    fn test_from_accessor_covers_all_kinds() {
        assert_eq!(Message::ping("a").from(), "a");
        assert_eq!(Message::vitals("b", 0.0, 0.0, 0.0).from(), "b");
        assert_eq!(Message::request_work_orders("c").from(), "c");
        assert_eq!(Message::work_orders_reply("d", vec![]).from(), "d");
    }
}
