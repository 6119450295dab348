use rust_decimal::Decimal;
use std::sync::Arc;
use syncgate_account::{AccountError, Position};
use syncgate_core::*;
use tracing::{debug, error, info, warn};

use crate::depth::DepthError;
use crate::pending::{RequestKind, ResponseSlot, SlotBuffer};
use crate::session::{FarmStatus, Session};

/// Broker codes in this range are warnings: they never fail a request.
const WARNING_CODES: std::ops::RangeInclusive<i32> = 2100..=2199;

/// Routes every inbound push to its pending slot or aggregate.
///
/// Never blocks beyond the short per-structure locks and never panics on
/// malformed input: bad pushes are logged and dropped.
pub struct CallbackDispatcher {
    session: Arc<Session>,
}

impl CallbackDispatcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Apply `f` to the slot for `id`. Unknown and released ids are dropped.
    fn route(&self, kind: &'static str, id: Option<CorrelationId>, f: impl FnOnce(&ResponseSlot) -> bool) {
        let Some(id) = id else {
            warn!(kind, "Push without request id dropped");
            return;
        };
        match self.session.pending.route(id, |slot| (slot.kind(), f(slot))) {
            Ok((_, true)) => {}
            // Ratio and dividend requests stream ordinary ticks alongside the
            // one string tick they wait for.
            Ok((slot_kind @ (RequestKind::FinancialRatios | RequestKind::Dividends), false)) => {
                debug!(req_id = %id, kind, slot = slot_kind.name(), "Tick ignored by report request");
            }
            Ok((slot_kind, false)) => {
                warn!(req_id = %id, kind, slot = slot_kind.name(), "Push does not match request kind");
            }
            Err(_) => warn!(req_id = %id, kind, "Push for unknown or released request dropped"),
        }
    }

    fn route_fixed(&self, key: FixedKey, kind: &'static str, f: impl FnOnce(&ResponseSlot) -> bool) {
        if self.session.pending.route(key, f).is_err() {
            debug!(kind, "Unsolicited push");
        }
    }

    fn on_tick(&self, kind: &'static str, req_id: i64, tick_type: i32, value: Decimal) {
        let Some(field) = TickField::from_code(tick_type) else {
            debug!(req_id, tick_type, "Untracked tick type");
            return;
        };
        self.route(kind, CorrelationId::from_wire(req_id), |slot| {
            slot.accumulate(|buffer| match buffer {
                SlotBuffer::Ticks(snapshot) => {
                    snapshot.set(field, value);
                    true
                }
                _ => false,
            })
        });
    }

    fn on_tick_string(&self, req_id: i64, tick_type: i32, value: String) {
        let id = CorrelationId::from_wire(req_id);
        match tick_type {
            TICK_LAST_TIMESTAMP => {
                let Ok(ts) = value.trim().parse::<i64>() else {
                    debug!(req_id, value = %value, "Unparseable trade timestamp");
                    return;
                };
                self.route("tick_string", id, |slot| {
                    slot.accumulate(|buffer| match buffer {
                        SlotBuffer::Ticks(snapshot) => {
                            snapshot.last_timestamp = Some(ts);
                            true
                        }
                        _ => false,
                    })
                });
            }
            TICK_FINANCIAL_RATIOS | TICK_DIVIDENDS => {
                let wanted = if tick_type == TICK_FINANCIAL_RATIOS {
                    RequestKind::FinancialRatios
                } else {
                    RequestKind::Dividends
                };
                self.route("tick_string", id, |slot| {
                    if slot.kind() != wanted {
                        // Ratio and dividend ticks also arrive on plain quote streams.
                        return slot.kind() == RequestKind::TickStream;
                    }
                    slot.accumulate(|buffer| *buffer = SlotBuffer::Text(Some(value)));
                    slot.finish();
                    true
                });
            }
            TICK_NEWS => debug!(req_id, "News tick ignored"),
            other => debug!(req_id, tick_type = other, "Untracked string tick"),
        }
    }

    fn on_depth(&self, req_id: i64, position: i32, operation: i32, side: i32, price: Decimal, size: Decimal) {
        let Some(id) = CorrelationId::from_wire(req_id) else {
            warn!(req_id, "Depth push without subscription id dropped");
            return;
        };
        match self.session.depth.apply(id, position, operation, side, price, size) {
            Ok(()) => {}
            Err(DepthError::UnknownSubscription(_)) => {
                warn!(req_id = %id, "Depth push for unknown or cancelled subscription dropped");
            }
            Err(e) => error!(req_id = %id, error = %e, "Depth push rejected"),
        }
    }

    fn on_account_value(&self, key: &str, value: &str, currency: &str, account: &str) {
        let Some(portfolio) = &self.session.portfolio else {
            return;
        };
        match portfolio.write().apply_account_value(key, value, currency, account) {
            Ok(true) => debug!(key, value, "Account value applied"),
            Ok(false) => {}
            Err(AccountError::AccountMismatch { expected, got }) => {
                warn!(expected = %expected, got = %got, key, "Account value for other account discarded");
            }
            Err(e) => warn!(error = %e, key, "Account value discarded"),
        }
    }

    fn on_portfolio_update(&self, update: PortfolioUpdate) {
        let Some(portfolio) = &self.session.portfolio else {
            return;
        };
        let position = Position {
            symbol: update.contract.display_symbol().to_string(),
            sid: update.contract.contract_id,
            amount: update.position,
            cost_basis: update.average_cost,
            last_sale_price: update.market_price,
            unrealized_pnl: update.unrealized_pnl,
            realized_pnl: update.realized_pnl,
        };
        let symbol = position.symbol.clone();
        if let Err(e) = portfolio.write().apply_position(&update.account, position) {
            warn!(error = %e, symbol = %symbol, "Position update discarded");
        }
    }

    fn on_error(&self, req_id: i64, code: i32, message: String) {
        let Some(id) = CorrelationId::from_wire(req_id) else {
            self.on_system_notice(code, &message);
            return;
        };

        if WARNING_CODES.contains(&code) {
            warn!(req_id = %id, code, "Broker warning: {}", message);
            return;
        }
        if let Some(slot) = self.session.pending.get(id) {
            warn!(req_id = %id, code, kind = slot.kind().name(), "Request failed: {}", message);
            slot.fail(BrokerMessage { code, message });
            return;
        }
        if self.session.depth.is_subscribed(id) {
            error!(req_id = %id, code, "Depth subscription error: {}", message);
            return;
        }
        if self.session.orders.get(req_id).is_some() {
            warn!(order_id = req_id, code, "Order error: {}", message);
            return;
        }
        warn!(req_id = %id, code, "Error for unknown or released request dropped: {}", message);
    }

    fn on_system_notice(&self, code: i32, message: &str) {
        let farm = message.rsplit_once(':').map(|(_, f)| f.trim()).filter(|f| !f.is_empty());
        let status = match code {
            2103 | 2105 => Some(FarmStatus::Broken),
            2104 | 2106 => Some(FarmStatus::Ok),
            2107 | 2108 => Some(FarmStatus::Inactive),
            _ => None,
        };
        if let (Some(farm), Some(status)) = (farm, status) {
            self.session.set_farm_status(farm, status);
        }
        match code {
            1100 | 2110 => warn!(code, "Broker connectivity lost: {}", message),
            1101 | 1102 => info!(code, "Broker connectivity restored: {}", message),
            1300 => error!(code, "Broker socket port reset: {}", message),
            2103 | 2105 => warn!(code, "{}", message),
            _ => info!(code, "{}", message),
        }
    }
}

impl InboundSink for CallbackDispatcher {
    fn on_message(&self, message: InboundMessage) {
        let kind = message.kind();
        let id = message.correlation_id();
        match message {
            InboundMessage::NextValidId { order_id } => {
                self.session.order_ids.seed(order_id);
                debug!(order_id, "Next valid order id");
                self.route_fixed(FixedKey::NextValidId, kind, |slot| {
                    slot.accumulate(|buffer| *buffer = SlotBuffer::NextId(Some(order_id)));
                    slot.finish();
                    true
                });
            }
            InboundMessage::TickPrice { req_id, tick_type, price } => self.on_tick(kind, req_id, tick_type, price),
            InboundMessage::TickSize { req_id, tick_type, size } => self.on_tick(kind, req_id, tick_type, size),
            InboundMessage::TickString { req_id, tick_type, value } => self.on_tick_string(req_id, tick_type, value),
            InboundMessage::TickSnapshotEnd { .. }
            | InboundMessage::HistoricalDataEnd { .. }
            | InboundMessage::ContractDetailsEnd { .. } => {
                self.route(kind, id, |slot| {
                    slot.finish();
                    true
                });
            }
            InboundMessage::HistoricalData { bar, .. } => {
                self.route(kind, id, |slot| {
                    slot.accumulate(|buffer| match buffer {
                        SlotBuffer::Bars(bars) => {
                            bars.push(bar);
                            true
                        }
                        _ => false,
                    })
                });
            }
            InboundMessage::RealtimeBar { bar, .. } => {
                self.route(kind, id, |slot| {
                    slot.accumulate(|buffer| match buffer {
                        SlotBuffer::RealtimeBars(bars) => {
                            bars.push(bar);
                            true
                        }
                        _ => false,
                    })
                });
            }
            InboundMessage::FundamentalData { xml, .. } => {
                self.route(kind, id, |slot| {
                    let matched = slot.accumulate(|buffer| match buffer {
                        SlotBuffer::Text(text) => {
                            *text = Some(xml);
                            true
                        }
                        _ => false,
                    });
                    if matched {
                        slot.finish();
                    }
                    matched
                });
            }
            InboundMessage::ContractDetails { details, .. } => {
                self.route(kind, id, |slot| {
                    slot.accumulate(|buffer| match buffer {
                        SlotBuffer::Contracts(list) => {
                            list.push(details);
                            true
                        }
                        _ => false,
                    })
                });
            }
            InboundMessage::MarketDepth { req_id, position, operation, side, price, size } => {
                self.on_depth(req_id, position, operation, side, price, size)
            }
            InboundMessage::OrderStatus(update) => {
                if let Err(e) = self.session.orders.apply(&update) {
                    error!(order_id = update.order_id, client_id = update.client_id, error = %e, "Order status rejected");
                }
            }
            InboundMessage::OpenOrder(order) => {
                if let Err(e) = self.session.orders.apply_open_order(&order) {
                    error!(order_id = order.order_id, client_id = order.client_id, error = %e, "Open order rejected");
                }
                self.route_fixed(FixedKey::OpenOrders, kind, |slot| {
                    slot.accumulate(|buffer| match buffer {
                        SlotBuffer::OpenOrders(orders) => {
                            orders.push(order);
                            true
                        }
                        _ => false,
                    })
                });
            }
            InboundMessage::OpenOrderEnd => {
                self.route_fixed(FixedKey::OpenOrders, kind, |slot| {
                    slot.finish();
                    true
                });
            }
            InboundMessage::AccountValue { key, value, currency, account } => {
                self.on_account_value(&key, &value, &currency, &account)
            }
            InboundMessage::PortfolioUpdate(update) => self.on_portfolio_update(update),
            InboundMessage::AccountTime { timestamp } => debug!(timestamp = %timestamp, "Account time"),
            InboundMessage::AccountDownloadEnd { account } => info!(account = %account, "Account download complete"),
            InboundMessage::Error { req_id, code, message } => self.on_error(req_id, code, message),
        }
    }

    fn on_connection(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { server_version } => {
                info!(server_version, "Session connected");
                self.session.set_connected(Some(server_version));
            }
            ConnectionEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Session disconnected");
                self.session.set_connected(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::depth::DepthSnapshot;
    use crate::pending::SlotStatus;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn setup() -> (Arc<Session>, CallbackDispatcher) {
        let config = GatewayConfig { account_id: Some("DU123".to_string()), ..GatewayConfig::default() };
        let session = Arc::new(Session::new(&config));
        let dispatcher = CallbackDispatcher::new(session.clone());
        (session, dispatcher)
    }

    fn id(raw: u32) -> CorrelationId {
        CorrelationId::new(raw).unwrap()
    }

    #[test]
    fn test_snapshot_ticks_routed_by_id() {
        let (session, dispatcher) = setup();
        let guard = session.pending().register(id(2), RequestKind::TickSnapshot).unwrap();

        dispatcher.on_message(InboundMessage::TickPrice { req_id: 2, tick_type: 1, price: dec!(99.5) });
        dispatcher.on_message(InboundMessage::TickSize { req_id: 2, tick_type: 0, size: dec!(300) });
        dispatcher.on_message(InboundMessage::TickString {
            req_id: 2,
            tick_type: TICK_LAST_TIMESTAMP,
            value: "1700000000".to_string(),
        });
        dispatcher.on_message(InboundMessage::TickSnapshotEnd { req_id: 2 });

        assert_eq!(guard.slot().wait(Duration::from_millis(10)), SlotStatus::Finished);
        match guard.slot().take_buffer() {
            SlotBuffer::Ticks(snap) => {
                assert_eq!(snap.bid, Some(dec!(99.5)));
                assert_eq!(snap.bid_size, Some(dec!(300)));
                assert_eq!(snap.last_timestamp, Some(1_700_000_000));
                assert_eq!(snap.ask, None);
            }
            other => panic!("Expected ticks, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let (session, dispatcher) = setup();
        dispatcher.on_message(InboundMessage::HistoricalDataEnd { req_id: 42 });
        dispatcher.on_message(InboundMessage::TickPrice { req_id: 42, tick_type: 4, price: dec!(1) });
        assert!(session.pending().is_empty());
    }

    #[test]
    fn test_mismatched_push_leaves_slot_untouched() {
        let (session, dispatcher) = setup();
        let guard = session.pending().register(id(3), RequestKind::ContractDetails).unwrap();
        dispatcher.on_message(InboundMessage::TickPrice { req_id: 3, tick_type: 4, price: dec!(1) });
        assert_eq!(guard.slot().read(|b| b.clone()), SlotBuffer::Contracts(Vec::new()));
        assert_eq!(guard.slot().status(), SlotStatus::Pending);
    }

    #[test]
    fn test_error_fails_slot_with_code() {
        let (session, dispatcher) = setup();
        let guard = session.pending().register(id(5), RequestKind::PriceHistory).unwrap();
        dispatcher.on_message(InboundMessage::Error {
            req_id: 5,
            code: 162,
            message: "Historical Market Data Service error message".to_string(),
        });
        assert_eq!(guard.slot().status(), SlotStatus::Error);
        assert_eq!(guard.slot().error().map(|e| e.code), Some(162));
    }

    #[test]
    fn test_warning_code_does_not_fail_slot() {
        let (session, dispatcher) = setup();
        let guard = session.pending().register(id(6), RequestKind::PriceHistory).unwrap();
        dispatcher.on_message(InboundMessage::Error { req_id: 6, code: 2109, message: "Order Event Warning".to_string() });
        assert_eq!(guard.slot().status(), SlotStatus::Pending);
    }

    #[test]
    fn test_farm_notices_tracked() {
        let (session, dispatcher) = setup();
        dispatcher.on_message(InboundMessage::Error {
            req_id: -1,
            code: 2104,
            message: "Market data farm connection is OK:usfarm".to_string(),
        });
        dispatcher.on_message(InboundMessage::Error {
            req_id: -1,
            code: 2105,
            message: "HMDS data farm connection is broken:euhmds".to_string(),
        });
        let farms = session.farm_status();
        assert_eq!(farms.get("usfarm"), Some(&FarmStatus::Ok));
        assert_eq!(farms.get("euhmds"), Some(&FarmStatus::Broken));
    }

    #[test]
    fn test_ratios_tick_completes_ratio_slot() {
        let (session, dispatcher) = setup();
        let guard = session.pending().register(id(8), RequestKind::FinancialRatios).unwrap();
        dispatcher.on_message(InboundMessage::TickString {
            req_id: 8,
            tick_type: TICK_DIVIDENDS,
            value: "0.83,0.92,20130219,0.23".to_string(),
        });
        assert_eq!(guard.slot().status(), SlotStatus::Pending);
        dispatcher.on_message(InboundMessage::TickString {
            req_id: 8,
            tick_type: TICK_FINANCIAL_RATIOS,
            value: "NLOW=80.6;".to_string(),
        });
        assert_eq!(guard.slot().status(), SlotStatus::Finished);
        assert_eq!(guard.slot().take_buffer(), SlotBuffer::Text(Some("NLOW=80.6;".to_string())));
    }

    #[test]
    fn test_ordinary_ticks_leave_report_slots_pending() {
        let (session, dispatcher) = setup();
        let ratios = session.pending().register(id(9), RequestKind::FinancialRatios).unwrap();
        let dividends = session.pending().register(id(10), RequestKind::Dividends).unwrap();
        for req_id in [9, 10] {
            dispatcher.on_message(InboundMessage::TickPrice { req_id, tick_type: 4, price: dec!(12.5) });
            dispatcher.on_message(InboundMessage::TickSize { req_id, tick_type: 5, size: dec!(100) });
        }
        for guard in [&ratios, &dividends] {
            assert_eq!(guard.slot().status(), SlotStatus::Pending);
            assert_eq!(guard.slot().read(|b| b.clone()), SlotBuffer::Text(None));
        }
    }

    #[test]
    fn test_next_valid_id_seeds_allocator() {
        let (session, dispatcher) = setup();
        dispatcher.on_message(InboundMessage::NextValidId { order_id: 1000 });
        assert_eq!(session.order_ids.next(), Ok(Some(1000)));
    }

    #[test]
    fn test_order_identity_violation_logged_not_applied() {
        let (session, dispatcher) = setup();
        let update = OrderStatusUpdate {
            order_id: 5,
            client_id: 1,
            status: "Submitted".to_string(),
            filled: dec!(0),
            remaining: dec!(100),
            avg_fill_price: dec!(0),
            perm_id: 1,
            parent_id: 0,
            last_fill_price: dec!(0),
            why_held: String::new(),
        };
        dispatcher.on_message(InboundMessage::OrderStatus(update.clone()));
        dispatcher.on_message(InboundMessage::OrderStatus(OrderStatusUpdate {
            client_id: 2,
            status: "Cancelled".to_string(),
            ..update
        }));
        assert_eq!(session.orders().len(), 1);
        assert_eq!(session.orders().get(5).unwrap().status, "Submitted");
    }

    #[test]
    fn test_account_pushes_feed_portfolio() {
        let (session, dispatcher) = setup();
        dispatcher.on_message(InboundMessage::AccountValue {
            key: "NetLiquidation".to_string(),
            value: "120000".to_string(),
            currency: "USD".to_string(),
            account: "DU123".to_string(),
        });
        dispatcher.on_message(InboundMessage::AccountValue {
            key: "NetLiquidation".to_string(),
            value: "1".to_string(),
            currency: "USD".to_string(),
            account: "DU999".to_string(),
        });
        dispatcher.on_message(InboundMessage::PortfolioUpdate(PortfolioUpdate {
            contract: Contract::stock("IBM", "SMART", "USD").with_contract_id(8314),
            position: dec!(100),
            market_price: dec!(151),
            market_value: dec!(15100),
            average_cost: dec!(150),
            unrealized_pnl: dec!(100),
            realized_pnl: dec!(0),
            account: "DU123".to_string(),
        }));

        let portfolio = session.portfolio().unwrap();
        assert_eq!(portfolio.portfolio_value(), dec!(120000));
        assert_eq!(portfolio.returns(), dec!(1.2));
        assert_eq!(portfolio.position("IBM").unwrap().sid, Some(8314));
    }

    #[test]
    fn test_depth_out_of_range_does_not_panic() {
        let (session, dispatcher) = setup();
        let ladder = session.depth().subscribe(id(9));
        dispatcher.on_message(InboundMessage::MarketDepth {
            req_id: 9,
            position: 10,
            operation: 0,
            side: 1,
            price: dec!(1),
            size: dec!(1),
        });
        assert_eq!(ladder.snapshot(), DepthSnapshot::default());
    }

    #[test]
    fn test_connection_events_gate_session() {
        let (session, dispatcher) = setup();
        dispatcher.on_connection(ConnectionEvent::Connected { server_version: 76 });
        assert!(session.is_connected());
        assert_eq!(session.server_version(), 76);
        dispatcher.on_connection(ConnectionEvent::Disconnected { reason: "eof".to_string() });
        assert!(!session.is_connected());
    }
}
