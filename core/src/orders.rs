// Work orders — the task data peers share as immutable snapshots
//
// A node owns exactly the orders it created. Copies received from a peer
// are attributed snapshots and never mutated by the receiver; only the
// OrderBook (the local node's own list) has write operations.

use crate::now_secs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    New,
    InProgress,
    Blocked,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOrderPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub is_done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub author: String,
    pub message: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    /// Unique within the owning node
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: WorkOrderStatus,
    pub priority: WorkOrderPriority,
    pub location: String,
    pub assigned_to: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub notes: Vec<Note>,
    pub created_at: u64,
    /// Invariant: `updated_at >= created_at`
    pub updated_at: u64,
}

impl WorkOrder {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
        priority: WorkOrderPriority,
        assigned_to: Option<String>,
        checklist_texts: Vec<String>,
    ) -> Self {
        let now = now_secs();
        let checklist = checklist_texts
            .into_iter()
            .map(|text| ChecklistItem {
                id: uuid::Uuid::new_v4().to_string(),
                text,
                is_done: false,
            })
            .collect();

        Self {
            id: format!("WO-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            description: description.into(),
            status: WorkOrderStatus::New,
            priority,
            location: location.into(),
            assigned_to,
            checklist,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Orders still needing attention (everything not done)
    pub fn is_active(&self) -> bool {
        self.status != WorkOrderStatus::Done
    }
}

/// The local node's own work orders, newest first.
///
/// This is the list served verbatim in a work-orders reply. All writes stamp
/// `updated_at`; none of them ever touch a remote peer's snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    orders: Vec<WorkOrder>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: Vec<WorkOrder>) -> Self {
        Self { orders }
    }

    pub fn orders(&self) -> &[WorkOrder] {
        &self.orders
    }

    pub fn active(&self) -> impl Iterator<Item = &WorkOrder> {
        self.orders.iter().filter(|o| o.is_active())
    }

    pub fn get(&self, order_id: &str) -> Option<&WorkOrder> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// Insert a freshly created order at the top of the list
    pub fn create(&mut self, order: WorkOrder) {
        self.orders.insert(0, order);
    }

    pub fn update_status(&mut self, order_id: &str, status: WorkOrderStatus) -> bool {
        self.touch(order_id, |order| order.status = status)
    }

    pub fn assign(&mut self, order_id: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        self.touch(order_id, |order| order.assigned_to = Some(name))
    }

    pub fn add_note(
        &mut self,
        order_id: &str,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        let note = Note {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            message: message.into(),
            created_at: now_secs(),
        };
        self.touch(order_id, |order| order.notes.push(note))
    }

    pub fn add_checklist_item(&mut self, order_id: &str, text: impl Into<String>) -> bool {
        let item = ChecklistItem {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            is_done: false,
        };
        self.touch(order_id, |order| order.checklist.push(item))
    }

    pub fn toggle_checklist_item(&mut self, order_id: &str, item_id: &str) -> bool {
        let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) else {
            return false;
        };
        let Some(item) = order.checklist.iter_mut().find(|i| i.id == item_id) else {
            return false;
        };
        item.is_done = !item.is_done;
        order.updated_at = now_secs().max(order.created_at);
        true
    }

    fn touch(&mut self, order_id: &str, mutate: impl FnOnce(&mut WorkOrder)) -> bool {
        match self.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                mutate(order);
                order.updated_at = now_secs().max(order.created_at);
                true
            }
            None => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Demo seed data — a fresh node has something to serve
// ----------------------------------------------------------------------------

impl WorkOrder {
    pub fn sample_psu_swap() -> Self {
        let now = now_secs();
        Self {
            id: "WO-001".to_string(),
            title: "Replace PSU in GPU server".to_string(),
            description: "Intermittent power failures on node gpu-23. Replace PSU in rack R12, \
                          U20. Verify cabling and run POST checks."
                .to_string(),
            status: WorkOrderStatus::InProgress,
            priority: WorkOrderPriority::High,
            location: "DC1 - Hall A - Rack R12 - U20".to_string(),
            assigned_to: Some("Alex T.".to_string()),
            checklist: vec![
                ChecklistItem {
                    id: "c1".to_string(),
                    text: "Verify server is in maintenance window".to_string(),
                    is_done: true,
                },
                ChecklistItem {
                    id: "c2".to_string(),
                    text: "Power down server and confirm LEDs off".to_string(),
                    is_done: false,
                },
                ChecklistItem {
                    id: "c3".to_string(),
                    text: "Swap faulty PSU with spare".to_string(),
                    is_done: false,
                },
                ChecklistItem {
                    id: "c4".to_string(),
                    text: "Power on and verify POST passes".to_string(),
                    is_done: false,
                },
            ],
            notes: vec![Note {
                id: "n1".to_string(),
                author: "Jamie (Engineer)".to_string(),
                message: "PSU reported multiple overcurrent events. Spare is in DC1 cage bin B-12."
                    .to_string(),
                created_at: now.saturating_sub(3600),
            }],
            created_at: now.saturating_sub(7200),
            updated_at: now.saturating_sub(600),
        }
    }

    pub fn sample_node_install() -> Self {
        let now = now_secs();
        Self {
            id: "WO-002".to_string(),
            title: "Install new compute node".to_string(),
            description: "Install new 1U server in Rack R25, U10. Connect dual power, mgmt \
                          network, and production network."
                .to_string(),
            status: WorkOrderStatus::New,
            priority: WorkOrderPriority::Medium,
            location: "DC1 - Hall B - Rack R25 - U10".to_string(),
            assigned_to: None,
            checklist: vec![
                ChecklistItem {
                    id: "c1".to_string(),
                    text: "Pick up server and rails from staging".to_string(),
                    is_done: false,
                },
                ChecklistItem {
                    id: "c2".to_string(),
                    text: "Install rails and slide in server".to_string(),
                    is_done: false,
                },
                ChecklistItem {
                    id: "c3".to_string(),
                    text: "Connect power (A/B feeds)".to_string(),
                    is_done: false,
                },
            ],
            notes: Vec::new(),
            created_at: now.saturating_sub(3600 * 4),
            updated_at: now.saturating_sub(3600 * 4),
        }
    }

    pub fn seed_orders() -> Vec<Self> {
        vec![Self::sample_psu_swap(), Self::sample_node_install()]
    }
}
