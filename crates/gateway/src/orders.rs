use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use syncgate_core::*;

/// Execution state of one order, identified by `(client_id, order_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecutionRecord {
    pub client_id: ClientId,
    pub order_id: OrderId,
    pub status: String,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub avg_fill_price: Decimal,
    pub perm_id: i64,
    pub parent_id: i64,
    pub last_fill_price: Decimal,
    pub why_held: String,
    /// Contract and terms, known once the order appears in an open-order push.
    pub details: Option<OpenOrder>,
    pub updated_at: DateTime<Utc>,
}

impl OrderExecutionRecord {
    fn from_status(update: &OrderStatusUpdate) -> Self {
        Self {
            client_id: update.client_id,
            order_id: update.order_id,
            status: update.status.clone(),
            filled: update.filled,
            remaining: update.remaining,
            avg_fill_price: update.avg_fill_price,
            perm_id: update.perm_id,
            parent_id: update.parent_id,
            last_fill_price: update.last_fill_price,
            why_held: update.why_held.clone(),
            details: None,
            updated_at: Utc::now(),
        }
    }

    fn from_open_order(order: &OpenOrder) -> Self {
        Self {
            client_id: order.client_id,
            order_id: order.order_id,
            status: order.status.clone(),
            filled: Decimal::ZERO,
            remaining: order.total_quantity,
            avg_fill_price: Decimal::ZERO,
            perm_id: order.perm_id,
            parent_id: 0,
            last_fill_price: Decimal::ZERO,
            why_held: String::new(),
            details: Some(order.clone()),
            updated_at: Utc::now(),
        }
    }

    fn check_identity(&self, client_id: ClientId, order_id: OrderId) -> Result<(), GatewayError> {
        if self.client_id != client_id || self.order_id != order_id {
            return Err(GatewayError::ProtocolViolation(format!(
                "order update for (client {}, order {}) does not match record (client {}, order {})",
                client_id, order_id, self.client_id, self.order_id
            )));
        }
        Ok(())
    }

    fn update(&mut self, update: &OrderStatusUpdate) {
        self.status = update.status.clone();
        self.filled = update.filled;
        self.remaining = update.remaining;
        self.avg_fill_price = update.avg_fill_price;
        self.perm_id = update.perm_id;
        self.parent_id = update.parent_id;
        self.last_fill_price = update.last_fill_price;
        self.why_held = update.why_held.clone();
        self.updated_at = Utc::now();
    }

    /// Whether the broker still considers the order working.
    pub fn is_active(&self) -> bool {
        !matches!(self.status.as_str(), "Filled" | "Cancelled" | "ApiCancelled" | "Inactive")
    }
}

/// In-flight orders keyed by order id, fed by order-status pushes.
#[derive(Debug, Default)]
pub struct OrderTracker {
    records: RwLock<HashMap<OrderId, OrderExecutionRecord>>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the record for an order-status push.
    ///
    /// An update whose identity does not match the existing record is a
    /// protocol violation and leaves the record unchanged.
    pub fn apply(&self, update: &OrderStatusUpdate) -> Result<(), GatewayError> {
        let mut records = self.records.write();
        match records.get_mut(&update.order_id) {
            Some(record) => {
                record.check_identity(update.client_id, update.order_id)?;
                record.update(update);
            }
            None => {
                records.insert(update.order_id, OrderExecutionRecord::from_status(update));
            }
        }
        Ok(())
    }

    /// Attach open-order terms, creating the record if the order is new.
    pub fn apply_open_order(&self, order: &OpenOrder) -> Result<(), GatewayError> {
        let mut records = self.records.write();
        match records.get_mut(&order.order_id) {
            Some(record) => {
                record.check_identity(order.client_id, order.order_id)?;
                record.details = Some(order.clone());
                record.updated_at = Utc::now();
            }
            None => {
                records.insert(order.order_id, OrderExecutionRecord::from_open_order(order));
            }
        }
        Ok(())
    }

    pub fn get(&self, order_id: OrderId) -> Option<OrderExecutionRecord> {
        self.records.read().get(&order_id).cloned()
    }

    /// All records, ordered by order id.
    pub fn records(&self) -> Vec<OrderExecutionRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.order_id);
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
