//! Authoritative in-memory view of every admitted order

use crate::StateObserver;
use prodline_types::{AttrValue, Order};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Status of an order that is admitted but not yet dispatched.
pub const STATUS_QUEUED: &str = "QUEUED";

/// Snapshot capacity of the broadcast channel. Receivers that lag simply
/// miss intermediate snapshots; each message is a full state, so the next
/// one supersedes everything they dropped.
const BROADCAST_CAPACITY: usize = 64;

/// The per-order view rendered by the shop-floor UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    pub id: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub priority: i32,
    /// Station the order currently occupies; empty while queued.
    pub station: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, AttrValue>,
}

/// Full factory-floor snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalState {
    pub products: HashMap<String, ProductView>,
}

/// Tracks the live state of every admitted order and broadcasts the full
/// snapshot to observers (the WebSocket hub) on every change.
pub struct StateTracker {
    state: RwLock<GlobalState>,
    broadcast: broadcast::Sender<GlobalState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { state: RwLock::new(GlobalState::default()), broadcast }
    }

    /// Subscribe to full-snapshot updates.
    pub fn subscribe(&self) -> broadcast::Receiver<GlobalState> {
        self.broadcast.subscribe()
    }

    /// Deep copy of the current state, for new clients and `GET /api/state`.
    pub fn snapshot(&self) -> GlobalState {
        self.state.read().unwrap().clone()
    }

    fn publish(&self, state: &GlobalState) {
        // Send fails only when nobody is listening, which is fine.
        let _ = self.broadcast.send(state.clone());
    }
}

impl StateObserver for StateTracker {
    fn add_product(&self, order: &Order) {
        let mut state = self.state.write().unwrap();
        state.products.insert(
            order.id.clone(),
            ProductView {
                id: order.id.clone(),
                product_type: order.order_type.clone(),
                priority: order.priority,
                station: String::new(),
                status: STATUS_QUEUED.to_string(),
                attrs: order.attrs.clone(),
            },
        );
        self.publish(&state);
    }

    fn update_product_state(&self, id: &str, station: &str, status: &str) {
        let mut state = self.state.write().unwrap();
        // Unknown ids are a no-op; new orders arrive via add_product only.
        if let Some(product) = state.products.get_mut(id) {
            product.station = station.to_string();
            product.status = status.to_string();
            self.publish(&state);
        }
    }
}
