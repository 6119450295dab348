use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use syncgate_account::Portfolio;
use syncgate_core::*;
use tracing::warn;

use crate::allocator::{CorrelationIdAllocator, OrderIdAllocator};
use crate::config::GatewayConfig;
use crate::depth::MarketDepthBook;
use crate::orders::OrderTracker;
use crate::pending::PendingRequestTable;

/// Health of a broker data farm, as reported by system notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmStatus {
    Ok,
    Broken,
    Inactive,
}

/// All mutable state of one broker session.
///
/// Shared by the gateway (caller threads) and the dispatcher (delivery
/// context). Each structure carries its own lock.
#[derive(Debug)]
pub struct Session {
    client_id: ClientId,
    pub(crate) correlation_ids: CorrelationIdAllocator,
    pub(crate) order_ids: OrderIdAllocator,
    pub(crate) pending: PendingRequestTable,
    pub(crate) orders: OrderTracker,
    pub(crate) depth: MarketDepthBook,
    pub(crate) portfolio: Option<RwLock<Portfolio>>,
    connected: AtomicBool,
    server_version: AtomicI32,
    farms: RwLock<BTreeMap<String, FarmStatus>>,
}

impl Session {
    pub fn new(config: &GatewayConfig) -> Self {
        let portfolio = match Portfolio::new(config.account_id.clone(), config.starting_cash) {
            Ok(portfolio) => Some(RwLock::new(portfolio)),
            Err(e) => {
                warn!(error = %e, "Account tracking disabled");
                None
            }
        };
        Self {
            client_id: config.client_id,
            correlation_ids: CorrelationIdAllocator::new(),
            order_ids: OrderIdAllocator::new(),
            pending: PendingRequestTable::new(),
            orders: OrderTracker::new(),
            depth: MarketDepthBook::new(),
            portfolio,
            connected: AtomicBool::new(false),
            server_version: AtomicI32::new(0),
            farms: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, server_version: Option<i32>) {
        if let Some(version) = server_version {
            self.server_version.store(version, Ordering::Release);
        }
        self.connected.store(server_version.is_some(), Ordering::Release);
    }

    pub fn server_version(&self) -> i32 {
        self.server_version.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    pub fn orders(&self) -> &OrderTracker {
        &self.orders
    }

    pub fn depth(&self) -> &MarketDepthBook {
        &self.depth
    }

    pub fn tracks_account(&self) -> bool {
        self.portfolio.is_some()
    }

    /// Copy of the current portfolio, `None` when account tracking is off.
    pub fn portfolio(&self) -> Option<Portfolio> {
        self.portfolio.as_ref().map(|p| p.read().clone())
    }

    /// Last reported status of each data farm.
    pub fn farm_status(&self) -> BTreeMap<String, FarmStatus> {
        self.farms.read().clone()
    }

    pub(crate) fn set_farm_status(&self, farm: &str, status: FarmStatus) {
        self.farms.write().insert(farm.to_string(), status);
    }
}
