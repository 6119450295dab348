use crate::models::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every push the broker can deliver to the client.
///
/// `req_id` is the signed wire id; values `<= 0` mean the push answers no
/// particular request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "next_valid_id")]
    NextValidId { order_id: OrderId },

    #[serde(rename = "tick_price")]
    TickPrice { req_id: i64, tick_type: i32, price: Decimal },

    #[serde(rename = "tick_size")]
    TickSize { req_id: i64, tick_type: i32, size: Decimal },

    #[serde(rename = "tick_string")]
    TickString { req_id: i64, tick_type: i32, value: String },

    #[serde(rename = "tick_snapshot_end")]
    TickSnapshotEnd { req_id: i64 },

    #[serde(rename = "historical_data")]
    HistoricalData { req_id: i64, bar: RawBar },

    #[serde(rename = "historical_data_end")]
    HistoricalDataEnd { req_id: i64 },

    #[serde(rename = "realtime_bar")]
    RealtimeBar { req_id: i64, bar: RealtimeBar },

    #[serde(rename = "fundamental_data")]
    FundamentalData { req_id: i64, xml: String },

    #[serde(rename = "contract_details")]
    ContractDetails { req_id: i64, details: ContractDetails },

    #[serde(rename = "contract_details_end")]
    ContractDetailsEnd { req_id: i64 },

    #[serde(rename = "market_depth")]
    MarketDepth {
        req_id: i64,
        position: i32,
        operation: i32,
        side: i32,
        price: Decimal,
        size: Decimal,
    },

    #[serde(rename = "order_status")]
    OrderStatus(OrderStatusUpdate),

    #[serde(rename = "open_order")]
    OpenOrder(OpenOrder),

    #[serde(rename = "open_order_end")]
    OpenOrderEnd,

    #[serde(rename = "account_value")]
    AccountValue {
        key: String,
        value: String,
        currency: String,
        account: String,
    },

    #[serde(rename = "portfolio_update")]
    PortfolioUpdate(PortfolioUpdate),

    #[serde(rename = "account_time")]
    AccountTime { timestamp: String },

    #[serde(rename = "account_download_end")]
    AccountDownloadEnd { account: String },

    #[serde(rename = "error")]
    Error { req_id: i64, code: i32, message: String },
}

impl InboundMessage {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::NextValidId { .. } => "next_valid_id",
            InboundMessage::TickPrice { .. } => "tick_price",
            InboundMessage::TickSize { .. } => "tick_size",
            InboundMessage::TickString { .. } => "tick_string",
            InboundMessage::TickSnapshotEnd { .. } => "tick_snapshot_end",
            InboundMessage::HistoricalData { .. } => "historical_data",
            InboundMessage::HistoricalDataEnd { .. } => "historical_data_end",
            InboundMessage::RealtimeBar { .. } => "realtime_bar",
            InboundMessage::FundamentalData { .. } => "fundamental_data",
            InboundMessage::ContractDetails { .. } => "contract_details",
            InboundMessage::ContractDetailsEnd { .. } => "contract_details_end",
            InboundMessage::MarketDepth { .. } => "market_depth",
            InboundMessage::OrderStatus(_) => "order_status",
            InboundMessage::OpenOrder(_) => "open_order",
            InboundMessage::OpenOrderEnd => "open_order_end",
            InboundMessage::AccountValue { .. } => "account_value",
            InboundMessage::PortfolioUpdate(_) => "portfolio_update",
            InboundMessage::AccountTime { .. } => "account_time",
            InboundMessage::AccountDownloadEnd { .. } => "account_download_end",
            InboundMessage::Error { .. } => "error",
        }
    }

    /// Correlation id carried by the push, if any.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            InboundMessage::TickPrice { req_id, .. }
            | InboundMessage::TickSize { req_id, .. }
            | InboundMessage::TickString { req_id, .. }
            | InboundMessage::TickSnapshotEnd { req_id }
            | InboundMessage::HistoricalData { req_id, .. }
            | InboundMessage::HistoricalDataEnd { req_id }
            | InboundMessage::RealtimeBar { req_id, .. }
            | InboundMessage::FundamentalData { req_id, .. }
            | InboundMessage::ContractDetails { req_id, .. }
            | InboundMessage::ContractDetailsEnd { req_id }
            | InboundMessage::MarketDepth { req_id, .. }
            | InboundMessage::Error { req_id, .. } => CorrelationId::from_wire(*req_id),
            _ => None,
        }
    }
}

/// Position update pushed while account updates are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioUpdate {
    pub contract: Contract,
    pub position: Decimal,
    pub market_price: Decimal,
    pub market_value: Decimal,
    pub average_cost: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub account: String,
}

/// Connection lifecycle signals raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connected { server_version: i32 },
    Disconnected { reason: String },
}
