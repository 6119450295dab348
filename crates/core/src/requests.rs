use crate::models::*;
use serde::{Deserialize, Serialize};

/// Every call the client can make to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum OutboundRequest {
    #[serde(rename = "req_ids")]
    RequestIds,

    #[serde(rename = "req_mkt_data")]
    MarketData {
        req_id: CorrelationId,
        contract: Contract,
        /// Comma-separated generic tick codes, empty for the default set.
        generic_ticks: String,
        snapshot: bool,
    },

    #[serde(rename = "cancel_mkt_data")]
    CancelMarketData { req_id: CorrelationId },

    #[serde(rename = "req_realtime_bars")]
    RealtimeBars {
        req_id: CorrelationId,
        contract: Contract,
        bar_seconds: u32,
        what_to_show: WhatToShow,
        use_rth: bool,
    },

    #[serde(rename = "cancel_realtime_bars")]
    CancelRealtimeBars { req_id: CorrelationId },

    #[serde(rename = "req_historical_data")]
    HistoricalData {
        req_id: CorrelationId,
        contract: Contract,
        end: String,
        duration: String,
        bar_size: String,
        what_to_show: WhatToShow,
        use_rth: bool,
    },

    #[serde(rename = "req_fundamental_data")]
    FundamentalData {
        req_id: CorrelationId,
        contract: Contract,
        report: String,
    },

    #[serde(rename = "req_contract_details")]
    ContractDetails { req_id: CorrelationId, contract: Contract },

    #[serde(rename = "req_mkt_depth")]
    MarketDepth {
        req_id: CorrelationId,
        contract: Contract,
        rows: usize,
    },

    #[serde(rename = "cancel_mkt_depth")]
    CancelMarketDepth { req_id: CorrelationId },

    #[serde(rename = "place_order")]
    PlaceOrder { contract: Contract, order: OrderTicket },

    #[serde(rename = "cancel_order")]
    CancelOrder { order_id: OrderId },

    #[serde(rename = "req_all_open_orders")]
    AllOpenOrders,

    #[serde(rename = "req_account_updates")]
    AccountUpdates { subscribe: bool, account: String },
}

impl OutboundRequest {
    /// Operation name used in log fields and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundRequest::RequestIds => "req_ids",
            OutboundRequest::MarketData { .. } => "req_mkt_data",
            OutboundRequest::CancelMarketData { .. } => "cancel_mkt_data",
            OutboundRequest::RealtimeBars { .. } => "req_realtime_bars",
            OutboundRequest::CancelRealtimeBars { .. } => "cancel_realtime_bars",
            OutboundRequest::HistoricalData { .. } => "req_historical_data",
            OutboundRequest::FundamentalData { .. } => "req_fundamental_data",
            OutboundRequest::ContractDetails { .. } => "req_contract_details",
            OutboundRequest::MarketDepth { .. } => "req_mkt_depth",
            OutboundRequest::CancelMarketDepth { .. } => "cancel_mkt_depth",
            OutboundRequest::PlaceOrder { .. } => "place_order",
            OutboundRequest::CancelOrder { .. } => "cancel_order",
            OutboundRequest::AllOpenOrders => "req_all_open_orders",
            OutboundRequest::AccountUpdates { .. } => "req_account_updates",
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            OutboundRequest::MarketData { req_id, .. }
            | OutboundRequest::CancelMarketData { req_id }
            | OutboundRequest::RealtimeBars { req_id, .. }
            | OutboundRequest::CancelRealtimeBars { req_id }
            | OutboundRequest::HistoricalData { req_id, .. }
            | OutboundRequest::FundamentalData { req_id, .. }
            | OutboundRequest::ContractDetails { req_id, .. }
            | OutboundRequest::MarketDepth { req_id, .. }
            | OutboundRequest::CancelMarketDepth { req_id } => Some(*req_id),
            _ => None,
        }
    }
}
