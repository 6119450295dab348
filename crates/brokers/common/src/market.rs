use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use syncgate_core::*;

/// Symbols with this prefix have no security definition.
pub const UNKNOWN_SYMBOL_PREFIX: &str = "ZZ";

/// Scripted market answering every request with plausible pushes.
///
/// Prices are derived from the symbol, so repeated requests agree.
pub struct MarketScript {
    account_id: String,
    next_order_id: Mutex<OrderId>,
    open_orders: Mutex<Vec<OpenOrder>>,
}

impl MarketScript {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            next_order_id: Mutex::new(1),
            open_orders: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, request: &OutboundRequest) -> Vec<InboundMessage> {
        match request {
            OutboundRequest::RequestIds => {
                vec![InboundMessage::NextValidId { order_id: *self.next_order_id.lock() }]
            }
            OutboundRequest::MarketData { req_id, contract, generic_ticks, snapshot } => {
                self.market_data(req_id.to_wire(), contract, generic_ticks, *snapshot)
            }
            OutboundRequest::RealtimeBars { req_id, contract, .. } => {
                let price = base_price(contract);
                vec![InboundMessage::RealtimeBar {
                    req_id: req_id.to_wire(),
                    bar: RealtimeBar {
                        time: 1_700_000_000,
                        open: price,
                        high: price + dec!(0.05),
                        low: price - dec!(0.05),
                        close: price,
                        volume: dec!(1200),
                        wap: price,
                        count: 14,
                    },
                }]
            }
            OutboundRequest::HistoricalData { req_id, contract, end, duration, bar_size, .. } => {
                self.history(req_id.to_wire(), contract, end, duration, bar_size)
            }
            OutboundRequest::FundamentalData { req_id, contract, report } => {
                let req_id = req_id.to_wire();
                if let Some(error) = unknown_symbol(req_id, contract) {
                    return vec![error];
                }
                vec![InboundMessage::FundamentalData {
                    req_id,
                    xml: format!(
                        r#"<?xml version="1.0" encoding="UTF-8"?><{report} symbol="{}" currency="{}"/>"#,
                        contract.display_symbol(),
                        contract.currency
                    ),
                }]
            }
            OutboundRequest::ContractDetails { req_id, contract } => {
                let req_id = req_id.to_wire();
                if let Some(error) = unknown_symbol(req_id, contract) {
                    return vec![error];
                }
                let mut summary = contract.clone();
                summary.contract_id = Some(contract_id(contract));
                vec![
                    InboundMessage::ContractDetails {
                        req_id,
                        details: ContractDetails {
                            summary,
                            market_name: contract.display_symbol().to_string(),
                            min_tick: dec!(0.01),
                            long_name: format!("{} Corp", contract.display_symbol()),
                            industry: "Technology".to_string(),
                            category: "Computers".to_string(),
                            time_zone_id: "EST".to_string(),
                            trading_hours: String::new(),
                            liquid_hours: String::new(),
                        },
                    },
                    InboundMessage::ContractDetailsEnd { req_id },
                ]
            }
            OutboundRequest::MarketDepth { req_id, contract, rows } => {
                let price = base_price(contract);
                let mut pushes = Vec::new();
                for level in 0..*rows {
                    let offset = Decimal::from(level as i64 + 1) * dec!(0.01);
                    for (side, price) in [(1, price - offset), (0, price + offset)] {
                        pushes.push(InboundMessage::MarketDepth {
                            req_id: req_id.to_wire(),
                            position: level as i32,
                            operation: 0,
                            side,
                            price,
                            size: Decimal::from(100 * (level as i64 + 1)),
                        });
                    }
                }
                pushes
            }
            OutboundRequest::PlaceOrder { contract, order } => self.place(contract, order),
            OutboundRequest::CancelOrder { order_id } => self.cancel(*order_id),
            OutboundRequest::AllOpenOrders => {
                let mut pushes: Vec<_> = self
                    .open_orders
                    .lock()
                    .iter()
                    .cloned()
                    .map(InboundMessage::OpenOrder)
                    .collect();
                pushes.push(InboundMessage::OpenOrderEnd);
                pushes
            }
            OutboundRequest::AccountUpdates { subscribe: true, .. } => self.account_download(),
            OutboundRequest::AccountUpdates { subscribe: false, .. }
            | OutboundRequest::CancelMarketData { .. }
            | OutboundRequest::CancelRealtimeBars { .. }
            | OutboundRequest::CancelMarketDepth { .. } => Vec::new(),
        }
    }

    fn market_data(&self, req_id: i64, contract: &Contract, generic_ticks: &str, snapshot: bool) -> Vec<InboundMessage> {
        if let Some(error) = unknown_symbol(req_id, contract) {
            return vec![error];
        }
        match generic_ticks {
            GENERIC_TICKS_RATIOS => {
                return vec![InboundMessage::TickString {
                    req_id,
                    tick_type: TICK_FINANCIAL_RATIOS,
                    value: format!(
                        "NPRICE={};TTMEPSXCLX=8.54981;BETA=0.90979;CURRENCY={};",
                        base_price(contract),
                        contract.currency
                    ),
                }]
            }
            GENERIC_TICKS_DIVIDENDS => {
                return vec![InboundMessage::TickString {
                    req_id,
                    tick_type: TICK_DIVIDENDS,
                    value: "0.83,0.92,20130219,0.23".to_string(),
                }]
            }
            _ => {}
        }
        let price = base_price(contract);
        let mut pushes = vec![
            InboundMessage::TickSize { req_id, tick_type: 0, size: dec!(300) },
            InboundMessage::TickPrice { req_id, tick_type: 1, price: price - dec!(0.01) },
            InboundMessage::TickPrice { req_id, tick_type: 2, price: price + dec!(0.01) },
            InboundMessage::TickSize { req_id, tick_type: 3, size: dec!(200) },
            InboundMessage::TickPrice { req_id, tick_type: 4, price },
            InboundMessage::TickSize { req_id, tick_type: 8, size: dec!(1250000) },
            InboundMessage::TickPrice { req_id, tick_type: 9, price: price - dec!(0.5) },
            InboundMessage::TickString { req_id, tick_type: TICK_LAST_TIMESTAMP, value: "1700000000".to_string() },
        ];
        if snapshot {
            pushes.push(InboundMessage::TickSnapshotEnd { req_id });
        }
        pushes
    }

    fn history(&self, req_id: i64, contract: &Contract, end: &str, duration: &str, bar_size: &str) -> Vec<InboundMessage> {
        if let Some(error) = unknown_symbol(req_id, contract) {
            return vec![error];
        }
        let Ok(end) = NaiveDateTime::parse_from_str(end, "%Y%m%d %H:%M:%S") else {
            return vec![InboundMessage::Error {
                req_id,
                code: 321,
                message: "Error validating request: end date/time".to_string(),
            }];
        };
        let count = duration
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, 20);
        let daily = bar_size == "1 day";
        let price = base_price(contract);

        let mut pushes = Vec::new();
        for i in (0..count).rev() {
            let (date, close) = if daily {
                let day: NaiveDate = end.date() - ChronoDuration::days(i);
                (day.format("%Y%m%d").to_string(), price + Decimal::from(count - i) * dec!(0.1))
            } else {
                let ts = end - ChronoDuration::minutes(i);
                (ts.format("%Y%m%d  %H:%M:%S").to_string(), price + Decimal::from(count - i) * dec!(0.01))
            };
            pushes.push(InboundMessage::HistoricalData {
                req_id,
                bar: RawBar {
                    date,
                    open: close - dec!(0.05),
                    high: close + dec!(0.1),
                    low: close - dec!(0.1),
                    close,
                    volume: dec!(366523),
                },
            });
        }
        pushes.push(InboundMessage::HistoricalDataEnd { req_id });
        pushes
    }

    fn place(&self, contract: &Contract, order: &OrderTicket) -> Vec<InboundMessage> {
        {
            let mut next = self.next_order_id.lock();
            *next = (*next).max(order.order_id + 1);
        }
        let open = OpenOrder {
            order_id: order.order_id,
            client_id: order.client_id,
            perm_id: 1_000_000 + order.order_id,
            contract: contract.clone(),
            action: order.action,
            total_quantity: order.total_quantity,
            order_type: order.order_type,
            limit_price: order.limit_price,
            aux_price: order.aux_price,
            status: "Submitted".to_string(),
        };
        {
            let mut orders = self.open_orders.lock();
            orders.retain(|o| o.order_id != order.order_id);
            orders.push(open.clone());
        }
        vec![
            InboundMessage::OpenOrder(open),
            InboundMessage::OrderStatus(OrderStatusUpdate {
                order_id: order.order_id,
                client_id: order.client_id,
                status: "Submitted".to_string(),
                filled: Decimal::ZERO,
                remaining: order.total_quantity,
                avg_fill_price: Decimal::ZERO,
                perm_id: 1_000_000 + order.order_id,
                parent_id: 0,
                last_fill_price: Decimal::ZERO,
                why_held: String::new(),
            }),
        ]
    }

    fn cancel(&self, order_id: OrderId) -> Vec<InboundMessage> {
        let mut orders = self.open_orders.lock();
        let Some(index) = orders.iter().position(|o| o.order_id == order_id) else {
            return vec![InboundMessage::Error {
                req_id: order_id,
                code: 135,
                message: format!("Can't find order with id ={}", order_id),
            }];
        };
        let order = orders.remove(index);
        vec![InboundMessage::OrderStatus(OrderStatusUpdate {
            order_id,
            client_id: order.client_id,
            status: "Cancelled".to_string(),
            filled: Decimal::ZERO,
            remaining: order.total_quantity,
            avg_fill_price: Decimal::ZERO,
            perm_id: order.perm_id,
            parent_id: 0,
            last_fill_price: Decimal::ZERO,
            why_held: String::new(),
        })]
    }

    fn account_download(&self) -> Vec<InboundMessage> {
        let account = self.account_id.clone();
        let value = |key: &str, value: &str| InboundMessage::AccountValue {
            key: key.to_string(),
            value: value.to_string(),
            currency: "USD".to_string(),
            account: account.clone(),
        };
        let ibm = Contract::stock("IBM", "SMART", "USD").with_contract_id(8314);
        vec![
            value("NetLiquidation", "105000.00"),
            value("GrossPositionValue", "15100.00"),
            value("ExcessLiquidity", "89900.00"),
            value("AvailableFunds", "89900.00"),
            value("BuyingPower", "359600.00"),
            value("AccountType", "INDIVIDUAL"),
            InboundMessage::PortfolioUpdate(PortfolioUpdate {
                contract: ibm,
                position: dec!(100),
                market_price: dec!(151),
                market_value: dec!(15100),
                average_cost: dec!(150),
                unrealized_pnl: dec!(100),
                realized_pnl: Decimal::ZERO,
                account: account.clone(),
            }),
            InboundMessage::AccountTime { timestamp: "09:30".to_string() },
            InboundMessage::AccountDownloadEnd { account: account.clone() },
        ]
    }
}

fn unknown_symbol(req_id: i64, contract: &Contract) -> Option<InboundMessage> {
    contract.display_symbol().starts_with(UNKNOWN_SYMBOL_PREFIX).then(|| InboundMessage::Error {
        req_id,
        code: 200,
        message: "No security definition has been found for the request".to_string(),
    })
}

fn symbol_seed(contract: &Contract) -> i64 {
    contract.display_symbol().bytes().map(i64::from).sum()
}

fn base_price(contract: &Contract) -> Decimal {
    Decimal::from(50 + symbol_seed(contract) % 200)
}

fn contract_id(contract: &Contract) -> i64 {
    10_000 + symbol_seed(contract)
}
