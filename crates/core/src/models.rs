use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use crate::traits::GatewayError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Numeric tag linking an outbound request to the pushes that answer it.
///
/// Never zero: zero and negative wire ids mean "no id" (broadcast pushes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(NonZeroU32);

impl CorrelationId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Convert a signed wire id. `-1`, `0` and out-of-range values carry no id.
    pub fn from_wire(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().and_then(Self::new)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn to_wire(self) -> i64 {
        i64::from(self.0.get())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical keys for request types whose replies carry no fresh correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedKey {
    OpenOrders,
    NextValidId,
}

/// Key of a pending request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKey {
    Id(CorrelationId),
    Fixed(FixedKey),
}

impl From<CorrelationId> for SlotKey {
    fn from(id: CorrelationId) -> Self {
        SlotKey::Id(id)
    }
}

impl From<FixedKey> for SlotKey {
    fn from(key: FixedKey) -> Self {
        SlotKey::Fixed(key)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Id(id) => write!(f, "#{}", id),
            SlotKey::Fixed(FixedKey::OpenOrders) => write!(f, "open_orders"),
            SlotKey::Fixed(FixedKey::NextValidId) => write!(f, "next_valid_id"),
        }
    }
}

pub type OrderId = i64;
pub type ClientId = i32;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    #[serde(rename = "STK")]
    Stock,
    #[serde(rename = "IND")]
    Index,
    #[serde(rename = "FUT")]
    Future,
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "CASH")]
    Forex,
    #[serde(rename = "BAG")]
    Combo,
}

/// One leg of a combo (BAG) contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboLeg {
    pub contract_id: i64,
    pub ratio: u32,
    pub action: OrderAction,
    pub exchange: String,
}

/// Broker-side description of a tradeable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: Option<i64>,
    pub symbol: String,
    pub local_symbol: Option<String>,
    pub security_type: SecurityType,
    pub exchange: String,
    pub primary_exchange: Option<String>,
    pub currency: String,
    /// Contract month, e.g. "201610".
    pub expiry: Option<String>,
    pub strike: Option<Decimal>,
    pub right: Option<String>,
    pub trading_class: Option<String>,
    #[serde(default)]
    pub combo_legs: Vec<ComboLeg>,
}

impl Contract {
    fn blank(symbol: &str, security_type: SecurityType, exchange: &str, currency: &str) -> Self {
        Self {
            contract_id: None,
            symbol: symbol.to_string(),
            local_symbol: None,
            security_type,
            exchange: exchange.to_string(),
            primary_exchange: None,
            currency: currency.to_string(),
            expiry: None,
            strike: None,
            right: None,
            trading_class: None,
            combo_legs: Vec::new(),
        }
    }

    /// Stock contract. The primary exchange defaults to the routing exchange
    /// to avoid ambiguity.
    pub fn stock(symbol: &str, exchange: &str, currency: &str) -> Self {
        let mut contract = Self::blank(symbol, SecurityType::Stock, exchange, currency);
        contract.primary_exchange = Some(exchange.to_string());
        contract.local_symbol = Some(symbol.to_string());
        contract
    }

    pub fn index(symbol: &str, exchange: &str, currency: &str) -> Self {
        Self::blank(symbol, SecurityType::Index, exchange, currency)
    }

    /// Future identified by symbol and contract month.
    pub fn future(symbol: &str, exchange: &str, expiry: &str, currency: &str) -> Self {
        let mut contract = Self::blank(symbol, SecurityType::Future, exchange, currency);
        contract.expiry = Some(expiry.to_string());
        contract
    }

    /// Future identified by its exchange-local symbol (e.g. "VXV6").
    pub fn future_local(local_symbol: &str, exchange: &str, currency: &str) -> Self {
        let mut contract = Self::blank("", SecurityType::Future, exchange, currency);
        contract.local_symbol = Some(local_symbol.to_string());
        contract
    }

    /// Combo contract built from legs.
    pub fn combo(symbol: &str, exchange: &str, currency: &str, legs: Vec<ComboLeg>) -> Self {
        let mut contract = Self::blank(symbol, SecurityType::Combo, exchange, currency);
        contract.combo_legs = legs;
        contract
    }

    pub fn with_contract_id(mut self, contract_id: i64) -> Self {
        self.contract_id = Some(contract_id);
        self
    }

    pub fn with_primary_exchange(mut self, primary_exchange: &str) -> Self {
        self.primary_exchange = Some(primary_exchange.to_string());
        self
    }

    pub fn with_trading_class(mut self, trading_class: &str) -> Self {
        self.trading_class = Some(trading_class.to_string());
        self
    }

    pub fn is_combo(&self) -> bool {
        !self.combo_legs.is_empty()
    }

    /// Symbol used to key positions and log lines.
    pub fn display_symbol(&self) -> &str {
        if self.symbol.is_empty() {
            self.local_symbol.as_deref().unwrap_or("")
        } else {
            &self.symbol
        }
    }
}

/// What a caller may pass as the target of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentRef {
    Explicit(Contract),
    /// Bare symbol, resolved to a stock on the default market.
    Symbol(String),
}

impl InstrumentRef {
    pub fn resolve(self, exchange: &str, currency: &str) -> Result<Contract, GatewayError> {
        match self {
            InstrumentRef::Explicit(contract) => {
                if contract.symbol.trim().is_empty()
                    && contract.local_symbol.as_deref().map_or(true, |s| s.trim().is_empty())
                    && contract.contract_id.is_none()
                {
                    return Err(GatewayError::InvalidArgument(
                        "contract has neither symbol, local symbol nor contract id".to_string(),
                    ));
                }
                Ok(contract)
            }
            InstrumentRef::Symbol(symbol) => {
                let symbol = symbol.trim();
                if symbol.is_empty() {
                    return Err(GatewayError::InvalidArgument("empty symbol".to_string()));
                }
                Ok(Contract::stock(symbol, exchange, currency))
            }
        }
    }
}

impl From<Contract> for InstrumentRef {
    fn from(contract: Contract) -> Self {
        InstrumentRef::Explicit(contract)
    }
}

impl From<&str> for InstrumentRef {
    fn from(symbol: &str) -> Self {
        InstrumentRef::Symbol(symbol.to_string())
    }
}

impl From<String> for InstrumentRef {
    fn from(symbol: String) -> Self {
        InstrumentRef::Symbol(symbol)
    }
}

/// Descriptive record returned by a contract-details lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub summary: Contract,
    pub market_name: String,
    pub min_tick: Decimal,
    pub long_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub time_zone_id: String,
    #[serde(default)]
    pub trading_hours: String,
    #[serde(default)]
    pub liquid_hours: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    /// Action for a signed share amount. Zero has no action.
    pub fn for_amount(amount: i64) -> Option<Self> {
        match amount.signum() {
            1 => Some(OrderAction::Buy),
            -1 => Some(OrderAction::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    #[serde(rename = "MKT")]
    Market,
    #[serde(rename = "LMT")]
    Limit,
    #[serde(rename = "STP")]
    Stop,
    #[serde(rename = "STP LMT")]
    StopLimit,
}

/// How an order is priced. Each style carries only the prices it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum OrderStyle {
    Market,
    Limit { limit: Decimal },
    Stop { stop: Decimal },
    StopLimit { limit: Decimal, stop: Decimal },
    /// Combo market order routed as non-guaranteed.
    ComboMarket,
    /// Combo limit order routed as non-guaranteed.
    ComboLimit { limit: Decimal },
}

impl OrderStyle {
    pub fn limit(limit: Decimal) -> Result<Self, GatewayError> {
        Self::Limit { limit }.validated()
    }

    pub fn stop(stop: Decimal) -> Result<Self, GatewayError> {
        Self::Stop { stop }.validated()
    }

    pub fn stop_limit(limit: Decimal, stop: Decimal) -> Result<Self, GatewayError> {
        Self::StopLimit { limit, stop }.validated()
    }

    pub fn combo_limit(limit: Decimal) -> Result<Self, GatewayError> {
        Self::ComboLimit { limit }.validated()
    }

    /// Reject non-positive prices.
    pub fn validated(self) -> Result<Self, GatewayError> {
        let prices = [self.limit_price(), self.stop_price()];
        if prices.iter().flatten().any(|p| *p <= Decimal::ZERO) {
            return Err(GatewayError::InvalidArgument(format!(
                "order prices must be positive: {:?}",
                self
            )));
        }
        Ok(self)
    }

    pub fn kind(&self) -> OrderKind {
        match self {
            OrderStyle::Market | OrderStyle::ComboMarket => OrderKind::Market,
            OrderStyle::Limit { .. } | OrderStyle::ComboLimit { .. } => OrderKind::Limit,
            OrderStyle::Stop { .. } => OrderKind::Stop,
            OrderStyle::StopLimit { .. } => OrderKind::StopLimit,
        }
    }

    pub fn limit_price(&self) -> Option<Decimal> {
        match self {
            OrderStyle::Limit { limit }
            | OrderStyle::StopLimit { limit, .. }
            | OrderStyle::ComboLimit { limit } => Some(*limit),
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        match self {
            OrderStyle::Stop { stop } | OrderStyle::StopLimit { stop, .. } => Some(*stop),
            _ => None,
        }
    }

    pub fn is_combo(&self) -> bool {
        matches!(self, OrderStyle::ComboMarket | OrderStyle::ComboLimit { .. })
    }
}

/// Order as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub action: OrderAction,
    pub total_quantity: Decimal,
    pub order_type: OrderKind,
    pub limit_price: Option<Decimal>,
    pub aux_price: Option<Decimal>,
    pub non_guaranteed: bool,
    /// Overrides the broker's order size constraints.
    pub override_percentage_constraints: bool,
}

impl OrderTicket {
    pub fn new(order_id: OrderId, client_id: ClientId, amount: i64, style: OrderStyle) -> Result<Self, GatewayError> {
        let action = OrderAction::for_amount(amount)
            .ok_or_else(|| GatewayError::InvalidArgument("order amount must be non-zero".to_string()))?;
        let style = style.validated()?;
        Ok(Self {
            order_id,
            client_id,
            action,
            total_quantity: Decimal::from(amount.unsigned_abs()),
            order_type: style.kind(),
            limit_price: style.limit_price(),
            aux_price: style.stop_price(),
            non_guaranteed: style.is_combo(),
            override_percentage_constraints: true,
        })
    }
}

/// An order-status push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub status: String,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub avg_fill_price: Decimal,
    pub perm_id: i64,
    pub parent_id: i64,
    pub last_fill_price: Decimal,
    #[serde(default)]
    pub why_held: String,
}

/// One entry of the open-order set pushed during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub perm_id: i64,
    pub contract: Contract,
    pub action: OrderAction,
    pub total_quantity: Decimal,
    pub order_type: OrderKind,
    pub limit_price: Option<Decimal>,
    pub aux_price: Option<Decimal>,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Bar resolution accepted by price-history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarFrequency {
    Daily,
    Minute,
    Second,
    FiveSeconds,
}

impl BarFrequency {
    /// Bar size string used on the wire.
    pub fn bar_size(&self) -> &'static str {
        match self {
            BarFrequency::Daily => "1 day",
            BarFrequency::Minute => "1 min",
            BarFrequency::Second => "1 sec",
            BarFrequency::FiveSeconds => "5 secs",
        }
    }
}

impl FromStr for BarFrequency {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(BarFrequency::Daily),
            "minute" => Ok(BarFrequency::Minute),
            "second" => Ok(BarFrequency::Second),
            "5 seconds" => Ok(BarFrequency::FiveSeconds),
            other => Err(GatewayError::InvalidArgument(format!(
                "unsupported frequency: {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    #[serde(rename = "S")]
    Seconds,
    #[serde(rename = "D")]
    Days,
    #[serde(rename = "W")]
    Weeks,
    #[serde(rename = "M")]
    Months,
    #[serde(rename = "Y")]
    Years,
}

/// Look-back span of a history request, e.g. "1 M".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryDuration {
    pub amount: u32,
    pub unit: DurationUnit,
}

impl FromStr for HistoryDuration {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GatewayError::InvalidArgument(format!("unsupported duration: {:?}", s));
        let mut parts = s.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let amount: u32 = amount.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }
        let unit = match unit {
            "S" => DurationUnit::Seconds,
            "D" => DurationUnit::Days,
            "W" => DurationUnit::Weeks,
            "M" => DurationUnit::Months,
            "Y" => DurationUnit::Years,
            _ => return Err(invalid()),
        };
        Ok(Self { amount, unit })
    }
}

impl fmt::Display for HistoryDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            DurationUnit::Seconds => "S",
            DurationUnit::Days => "D",
            DurationUnit::Weeks => "W",
            DurationUnit::Months => "M",
            DurationUnit::Years => "Y",
        };
        write!(f, "{} {}", self.amount, unit)
    }
}

/// Normalize a history end time to `YYYYMMDD HH:MM:SS`.
///
/// A bare date is taken as the end of that day.
pub fn normalize_end_time(end: &str) -> Result<String, GatewayError> {
    let end = end.trim();
    if let Ok(date) = NaiveDate::parse_from_str(end, "%Y%m%d") {
        if end.len() == 8 {
            return Ok(format!("{} 23:59:59", date.format("%Y%m%d")));
        }
    }
    NaiveDateTime::parse_from_str(end, "%Y%m%d %H:%M:%S")
        .map(|ts| ts.format("%Y%m%d %H:%M:%S").to_string())
        .map_err(|_| GatewayError::InvalidArgument(format!("unsupported end time: {:?}", end)))
}

/// Price type of a real-time bar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhatToShow {
    Trades,
    Midpoint,
    Bid,
    Ask,
}

impl FromStr for WhatToShow {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRADES" => Ok(WhatToShow::Trades),
            "MIDPOINT" => Ok(WhatToShow::Midpoint),
            "BID" => Ok(WhatToShow::Bid),
            "ASK" => Ok(WhatToShow::Ask),
            other => Err(GatewayError::InvalidArgument(format!(
                "unsupported price type: {:?}",
                other
            ))),
        }
    }
}

/// A history bar as pushed: the timestamp is still the broker's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl RawBar {
    /// Parse the broker timestamp. Accepts `YYYYMMDD`, `YYYYMMDD HH:MM:SS`
    /// and the two-space intraday variant.
    pub fn parse(&self, symbol: &str) -> Option<Bar> {
        let date = self.date.trim();
        let time = if date.len() == 8 {
            NaiveDate::parse_from_str(date, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        } else {
            NaiveDateTime::parse_from_str(date, "%Y%m%d  %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(date, "%Y%m%d %H:%M:%S"))
                .ok()
        }?;
        Some(Bar {
            symbol: symbol.to_string(),
            time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Exchange-local bar time.
    pub time: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Five-second real-time bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeBar {
    /// Bar start, seconds since the epoch.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub wap: Decimal,
    pub count: i64,
}

/// Tick fields tracked in a quote snapshot, by broker tick type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickField {
    BidSize,
    Bid,
    Ask,
    AskSize,
    Last,
    LastSize,
    High,
    Low,
    Volume,
    Close,
    Open,
    OpenInterest,
}

impl TickField {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => TickField::BidSize,
            1 => TickField::Bid,
            2 => TickField::Ask,
            3 => TickField::AskSize,
            4 => TickField::Last,
            5 => TickField::LastSize,
            6 => TickField::High,
            7 => TickField::Low,
            8 => TickField::Volume,
            9 => TickField::Close,
            14 => TickField::Open,
            22 => TickField::OpenInterest,
            _ => return None,
        })
    }
}

pub const TICK_LAST_TIMESTAMP: i32 = 45;
pub const TICK_FINANCIAL_RATIOS: i32 = 47;
pub const TICK_DIVIDENDS: i32 = 59;
pub const TICK_NEWS: i32 = 62;

/// Generic tick list requesting fundamental ratios.
pub const GENERIC_TICKS_RATIOS: &str = "258";
/// Generic tick list requesting dividend information.
pub const GENERIC_TICKS_DIVIDENDS: &str = "456";

/// Latest known quote fields; `None` until the broker pushes the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub bid_size: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub last: Option<Decimal>,
    pub last_size: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub close: Option<Decimal>,
    pub open: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    /// Last trade time, seconds since the epoch.
    pub last_timestamp: Option<i64>,
}

impl TickSnapshot {
    pub fn set(&mut self, field: TickField, value: Decimal) {
        let target = match field {
            TickField::BidSize => &mut self.bid_size,
            TickField::Bid => &mut self.bid,
            TickField::Ask => &mut self.ask,
            TickField::AskSize => &mut self.ask_size,
            TickField::Last => &mut self.last,
            TickField::LastSize => &mut self.last_size,
            TickField::High => &mut self.high,
            TickField::Low => &mut self.low,
            TickField::Volume => &mut self.volume,
            TickField::Close => &mut self.close,
            TickField::Open => &mut self.open,
            TickField::OpenInterest => &mut self.open_interest,
        };
        *target = Some(value);
    }

    pub fn get(&self, field: TickField) -> Option<Decimal> {
        match field {
            TickField::BidSize => self.bid_size,
            TickField::Bid => self.bid,
            TickField::Ask => self.ask,
            TickField::AskSize => self.ask_size,
            TickField::Last => self.last,
            TickField::LastSize => self.last_size,
            TickField::High => self.high,
            TickField::Low => self.low,
            TickField::Volume => self.volume,
            TickField::Close => self.close,
            TickField::Open => self.open,
            TickField::OpenInterest => self.open_interest,
        }
    }
}

// ---------------------------------------------------------------------------
// Market depth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthOperation {
    Insert,
    Update,
    Delete,
}

impl DepthOperation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DepthOperation::Insert),
            1 => Some(DepthOperation::Update),
            2 => Some(DepthOperation::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSide {
    Ask,
    Bid,
}

impl BookSide {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BookSide::Ask),
            1 => Some(BookSide::Bid),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fundamentals
// ---------------------------------------------------------------------------

/// Fundamental report variants served as XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    FinancialStatements,
    Ownership,
    AnalystEstimates,
    CompanyOverview,
    FinancialSummary,
}

impl ReportKind {
    /// Report type code used on the wire.
    pub fn wire_code(&self) -> &'static str {
        match self {
            ReportKind::FinancialStatements => "ReportsFinStatements",
            ReportKind::Ownership => "ReportsOwnership",
            ReportKind::AnalystEstimates => "RESC",
            ReportKind::CompanyOverview => "ReportSnapshot",
            ReportKind::FinancialSummary => "ReportsFinSummary",
        }
    }
}

impl FromStr for ReportKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statements" | "financial_statements" => Ok(ReportKind::FinancialStatements),
            "ownership" => Ok(ReportKind::Ownership),
            "estimates" | "analyst_estimates" => Ok(ReportKind::AnalystEstimates),
            "overview" | "company_overview" => Ok(ReportKind::CompanyOverview),
            "summary" | "financial_summary" => Ok(ReportKind::FinancialSummary),
            other => Err(GatewayError::InvalidArgument(format!(
                "unknown report kind: {:?}",
                other
            ))),
        }
    }
}

/// Error code and text attached to a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub code: i32,
    pub message: String,
}
