use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syncgate_account::Portfolio;
use syncgate_core::*;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::depth::{DepthLadder, LADDER_DEPTH};
use crate::pending::{RequestKind, ResponseSlot, SlotBuffer, SlotStatus};
use crate::reports::{Dividends, FinancialRatios};
use crate::session::Session;

/// Blocking facade over an asynchronous broker connection.
///
/// Every request allocates a correlation id, registers a slot, sends, and
/// waits on that slot. The slot is released on every exit path.
pub struct Gateway {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    config: GatewayConfig,
}

/// Live quote stream. Cancel with [`Gateway::cancel_ticks`].
#[derive(Debug, Clone)]
pub struct TickSubscription {
    id: CorrelationId,
    slot: Arc<ResponseSlot>,
}

impl TickSubscription {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Latest value of every field pushed so far.
    pub fn latest(&self) -> TickSnapshot {
        self.slot.read(|buffer| match buffer {
            SlotBuffer::Ticks(snapshot) => snapshot.clone(),
            _ => TickSnapshot::default(),
        })
    }
}

/// Live five-second bar stream. Cancel with [`Gateway::cancel_realtime_bars`].
#[derive(Debug, Clone)]
pub struct RealtimeBarSubscription {
    id: CorrelationId,
    slot: Arc<ResponseSlot>,
}

impl RealtimeBarSubscription {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Bars received so far, oldest first.
    pub fn bars(&self) -> Vec<RealtimeBar> {
        self.slot.read(|buffer| match buffer {
            SlotBuffer::RealtimeBars(bars) => bars.clone(),
            _ => Vec::new(),
        })
    }

    pub fn latest(&self) -> Option<RealtimeBar> {
        self.slot.read(|buffer| match buffer {
            SlotBuffer::RealtimeBars(bars) => bars.last().cloned(),
            _ => None,
        })
    }

    /// Take the buffered bars, leaving the stream running.
    pub fn drain(&self) -> Vec<RealtimeBar> {
        self.slot.accumulate(|buffer| match buffer {
            SlotBuffer::RealtimeBars(bars) => std::mem::take(bars),
            _ => Vec::new(),
        })
    }
}

/// Market depth stream. Cancel with [`Gateway::cancel_depth`].
#[derive(Debug, Clone)]
pub struct DepthSubscription {
    id: CorrelationId,
    ladder: Arc<DepthLadder>,
}

impl DepthSubscription {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn ladder(&self) -> &DepthLadder {
        &self.ladder
    }
}

impl Gateway {
    pub fn new(session: Arc<Session>, transport: Arc<dyn Transport>, config: GatewayConfig) -> Self {
        Self { session, transport, config }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.transport.is_open()
    }

    /// Copy of the account aggregate, `None` when account tracking is off.
    pub fn portfolio(&self) -> Option<Portfolio> {
        self.session.portfolio()
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    fn resolve(&self, instrument: InstrumentRef) -> Result<Contract, GatewayError> {
        instrument.resolve(&self.config.default_exchange, &self.config.default_currency)
    }

    fn send(&self, request: &OutboundRequest) -> Result<(), GatewayError> {
        self.transport.send(request).map_err(|e| {
            warn!(op = request.name(), error = %e, "Send failed");
            GatewayError::Transport(e)
        })
    }

    /// Register, send, wait, harvest. The slot is released on return.
    ///
    /// A fixed-key request already in flight is joined rather than re-sent;
    /// the joiner waits on the same slot and harvests the same buffer.
    fn call<T>(
        &self,
        kind: RequestKind,
        key: SlotKey,
        request: OutboundRequest,
        timeout: Duration,
        harvest: impl FnOnce(&ResponseSlot) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let guard = match key {
            SlotKey::Fixed(_) => self.session.pending.join_or_register(key, kind)?,
            SlotKey::Id(_) => self.session.pending.register(key, kind)?,
        };
        let status = if guard.is_owner() {
            self.send(&request)?;
            debug!(key = %key, op = request.name(), "Request sent");
            guard.slot().wait(timeout)
        } else {
            debug!(key = %key, op = request.name(), "Joined in-flight request");
            guard.slot().wait_shared(timeout)
        };

        match status {
            SlotStatus::Finished => harvest(guard.slot()),
            SlotStatus::Error => Err(guard
                .slot()
                .error()
                .map(GatewayError::from)
                .unwrap_or_else(|| GatewayError::ProtocolViolation(format!("{} failed without error", key)))),
            SlotStatus::TimedOut | SlotStatus::Pending => {
                warn!(key = %key, op = kind.name(), waited = ?timeout, "Request timed out");
                Err(GatewayError::Timeout { operation: kind.name(), waited: timeout })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    /// One-off quote snapshot.
    ///
    /// After the snapshot ends the gateway waits the configured settle delay,
    /// since tick pushes may still trail the terminator.
    pub fn tick_snapshot(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<TickSnapshot, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        let settle = self.config.timeouts.snapshot_settle();
        self.call(
            RequestKind::TickSnapshot,
            id.into(),
            OutboundRequest::MarketData { req_id: id, contract, generic_ticks: String::new(), snapshot: true },
            timeout.unwrap_or_else(|| self.config.timeouts.tick_snapshot()),
            |slot| {
                if !settle.is_zero() {
                    thread::sleep(settle);
                }
                match slot.take_buffer() {
                    SlotBuffer::Ticks(snapshot) => Ok(snapshot),
                    other => Err(unexpected_buffer(&other)),
                }
            },
        )
    }

    /// Start a streaming quote subscription.
    pub fn subscribe_ticks(&self, instrument: impl Into<InstrumentRef>) -> Result<TickSubscription, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        let guard = self.session.pending.register(id, RequestKind::TickStream)?;
        self.send(&OutboundRequest::MarketData { req_id: id, contract, generic_ticks: String::new(), snapshot: false })?;
        info!(req_id = %id, "Tick stream started");
        Ok(TickSubscription { id, slot: guard.detach() })
    }

    /// Stop a quote stream. Local state is removed even when not connected.
    pub fn cancel_ticks(&self, id: CorrelationId) -> Result<(), GatewayError> {
        self.session.pending.release(id);
        self.ensure_connected()?;
        self.send(&OutboundRequest::CancelMarketData { req_id: id })
    }

    /// Start a five-second bar stream.
    pub fn subscribe_realtime_bars(
        &self,
        instrument: impl Into<InstrumentRef>,
        what_to_show: WhatToShow,
    ) -> Result<RealtimeBarSubscription, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        let guard = self.session.pending.register(id, RequestKind::RealtimeBars)?;
        self.send(&OutboundRequest::RealtimeBars {
            req_id: id,
            contract,
            bar_seconds: 5,
            what_to_show,
            use_rth: true,
        })?;
        info!(req_id = %id, "Realtime bar stream started");
        Ok(RealtimeBarSubscription { id, slot: guard.detach() })
    }

    pub fn cancel_realtime_bars(&self, id: CorrelationId) -> Result<(), GatewayError> {
        self.session.pending.release(id);
        self.ensure_connected()?;
        self.send(&OutboundRequest::CancelRealtimeBars { req_id: id })
    }

    /// Trade bars for one instrument, oldest first.
    ///
    /// `end` is `YYYYMMDD` or `YYYYMMDD HH:MM:SS`; `duration` is e.g. `"1 M"`;
    /// `frequency` is `daily`, `minute`, `second` or `5 seconds`.
    pub fn price_history(
        &self,
        instrument: impl Into<InstrumentRef>,
        end: &str,
        duration: &str,
        frequency: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Bar>, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        let end = normalize_end_time(end)?;
        let duration: HistoryDuration = duration.parse()?;
        let frequency: BarFrequency = frequency.parse()?;
        self.ensure_connected()?;
        self.history(contract, &end, duration, frequency, timeout)
    }

    /// Daily or intraday history for several stocks, one request at a time.
    /// Bars carry their symbol.
    pub fn stock_price_history(
        &self,
        symbols: &[&str],
        end: &str,
        duration: &str,
        frequency: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Bar>, GatewayError> {
        let end = normalize_end_time(end)?;
        let duration: HistoryDuration = duration.parse()?;
        let frequency: BarFrequency = frequency.parse()?;
        let contracts = symbols
            .iter()
            .map(|symbol| self.resolve(InstrumentRef::from(*symbol)))
            .collect::<Result<Vec<_>, _>>()?;
        if contracts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_connected()?;

        let mut all = Vec::new();
        for contract in contracts {
            all.extend(self.history(contract, &end, duration, frequency, timeout)?);
        }
        Ok(all)
    }

    fn history(
        &self,
        contract: Contract,
        end: &str,
        duration: HistoryDuration,
        frequency: BarFrequency,
        timeout: Option<Duration>,
    ) -> Result<Vec<Bar>, GatewayError> {
        let id = self.session.correlation_ids.next()?;
        let symbol = contract.display_symbol().to_string();
        self.call(
            RequestKind::PriceHistory,
            id.into(),
            OutboundRequest::HistoricalData {
                req_id: id,
                contract,
                end: end.to_string(),
                duration: duration.to_string(),
                bar_size: frequency.bar_size().to_string(),
                what_to_show: WhatToShow::Trades,
                use_rth: false,
            },
            timeout.unwrap_or_else(|| self.config.timeouts.price_history()),
            |slot| match slot.take_buffer() {
                SlotBuffer::Bars(raw) => Ok(raw
                    .iter()
                    .filter_map(|bar| {
                        let parsed = bar.parse(&symbol);
                        if parsed.is_none() {
                            warn!(req_id = %id, date = %bar.date, "Bar with unparseable time skipped");
                        }
                        parsed
                    })
                    .collect()),
                other => Err(unexpected_buffer(&other)),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Fundamentals and reference data
    // -----------------------------------------------------------------------

    /// Raw XML fundamental report.
    pub fn fundamental_report(
        &self,
        instrument: impl Into<InstrumentRef>,
        report: ReportKind,
        timeout: Option<Duration>,
    ) -> Result<String, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        self.call(
            RequestKind::FundamentalReport,
            id.into(),
            OutboundRequest::FundamentalData { req_id: id, contract, report: report.wire_code().to_string() },
            timeout.unwrap_or_else(|| self.config.timeouts.report(report)),
            |slot| match slot.take_buffer() {
                SlotBuffer::Text(Some(xml)) => Ok(xml),
                other => Err(unexpected_buffer(&other)),
            },
        )
    }

    pub fn financial_ratios(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<FinancialRatios, GatewayError> {
        let raw = self.generic_tick_string(
            instrument.into(),
            RequestKind::FinancialRatios,
            GENERIC_TICKS_RATIOS,
            timeout.unwrap_or_else(|| self.config.timeouts.financial_ratios()),
        )?;
        Ok(FinancialRatios::parse(&raw))
    }

    pub fn dividends(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<Dividends, GatewayError> {
        let raw = self.generic_tick_string(
            instrument.into(),
            RequestKind::Dividends,
            GENERIC_TICKS_DIVIDENDS,
            timeout.unwrap_or_else(|| self.config.timeouts.dividends()),
        )?;
        Ok(Dividends::parse(&raw))
    }

    /// Open a market-data line with a generic tick list and wait for the
    /// matching tick string. The line is cancelled whatever the outcome.
    fn generic_tick_string(
        &self,
        instrument: InstrumentRef,
        kind: RequestKind,
        generic_ticks: &str,
        timeout: Duration,
    ) -> Result<String, GatewayError> {
        let contract = self.resolve(instrument)?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        let result = self.call(
            kind,
            id.into(),
            OutboundRequest::MarketData { req_id: id, contract, generic_ticks: generic_ticks.to_string(), snapshot: false },
            timeout,
            |slot| match slot.take_buffer() {
                SlotBuffer::Text(Some(raw)) => Ok(raw),
                other => Err(unexpected_buffer(&other)),
            },
        );
        if !matches!(result, Err(GatewayError::Transport(_)) | Err(GatewayError::RequestInFlight(_))) {
            if let Err(e) = self.send(&OutboundRequest::CancelMarketData { req_id: id }) {
                warn!(req_id = %id, error = %e, "Failed to cancel market data line");
            }
        }
        result
    }

    /// All details records matching the instrument.
    pub fn all_contract_details(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ContractDetails>, GatewayError> {
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        self.call(
            RequestKind::ContractDetails,
            id.into(),
            OutboundRequest::ContractDetails { req_id: id, contract },
            timeout.unwrap_or_else(|| self.config.timeouts.contract_details()),
            |slot| match slot.take_buffer() {
                SlotBuffer::Contracts(list) => Ok(list),
                other => Err(unexpected_buffer(&other)),
            },
        )
    }

    /// First details record, `None` when nothing matches.
    pub fn contract_details(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<Option<ContractDetails>, GatewayError> {
        Ok(self.all_contract_details(instrument, timeout)?.into_iter().next())
    }

    /// Fully specified contract for a partial one.
    pub fn full_contract(
        &self,
        instrument: impl Into<InstrumentRef>,
        timeout: Option<Duration>,
    ) -> Result<Option<Contract>, GatewayError> {
        Ok(self.contract_details(instrument, timeout)?.map(|details| details.summary))
    }

    // -----------------------------------------------------------------------
    // Market depth
    // -----------------------------------------------------------------------

    pub fn subscribe_depth(
        &self,
        instrument: impl Into<InstrumentRef>,
        rows: usize,
    ) -> Result<DepthSubscription, GatewayError> {
        if rows == 0 || rows > LADDER_DEPTH {
            return Err(GatewayError::InvalidArgument(format!(
                "depth rows must be between 1 and {}, got {}",
                LADDER_DEPTH, rows
            )));
        }
        let contract = self.resolve(instrument.into())?;
        self.ensure_connected()?;
        let id = self.session.correlation_ids.next()?;
        let ladder = self.session.depth.subscribe(id);
        if let Err(e) = self.send(&OutboundRequest::MarketDepth { req_id: id, contract, rows }) {
            self.session.depth.unsubscribe(id);
            return Err(e);
        }
        info!(req_id = %id, rows, "Depth stream started");
        Ok(DepthSubscription { id, ladder })
    }

    pub fn cancel_depth(&self, id: CorrelationId) -> Result<(), GatewayError> {
        self.session.depth.unsubscribe(id);
        self.ensure_connected()?;
        self.send(&OutboundRequest::CancelMarketDepth { req_id: id })
    }

    pub fn depth_ladder(&self, id: CorrelationId) -> Option<Arc<DepthLadder>> {
        self.session.depth.ladder(id)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Refresh and return the full open-order set.
    ///
    /// An empty vector means the broker has no open orders; a refresh that
    /// never completes is a timeout.
    pub fn open_orders(&self, timeout: Option<Duration>) -> Result<Vec<OpenOrder>, GatewayError> {
        self.ensure_connected()?;
        self.call(
            RequestKind::OpenOrders,
            FixedKey::OpenOrders.into(),
            OutboundRequest::AllOpenOrders,
            timeout.unwrap_or_else(|| self.config.timeouts.open_orders()),
            |slot| {
                slot.read(|buffer| match buffer {
                    SlotBuffer::OpenOrders(orders) => Ok(orders.clone()),
                    other => Err(unexpected_buffer(other)),
                })
            },
        )
    }

    /// Next order id, asking the broker when the allocator is unseeded.
    ///
    /// Concurrent callers share one in-flight id request and each take a
    /// distinct id once it seeds the allocator.
    pub fn next_order_id(&self) -> Result<OrderId, GatewayError> {
        if let Some(id) = self.session.order_ids.next()? {
            return Ok(id);
        }
        self.ensure_connected()?;
        self.request_order_ids()?;
        self.session
            .order_ids
            .next()?
            .ok_or_else(|| GatewayError::ProtocolViolation("next valid id push did not seed order ids".to_string()))
    }

    fn request_order_ids(&self) -> Result<OrderId, GatewayError> {
        self.call(
            RequestKind::NextValidId,
            FixedKey::NextValidId.into(),
            OutboundRequest::RequestIds,
            self.config.timeouts.next_order_id(),
            |slot| {
                slot.read(|buffer| match buffer {
                    SlotBuffer::NextId(Some(id)) => Ok(*id),
                    other => Err(unexpected_buffer(other)),
                })
            },
        )
    }

    /// Place an order for a signed share amount: positive buys, negative sells.
    pub fn place_order(
        &self,
        instrument: impl Into<InstrumentRef>,
        amount: i64,
        style: OrderStyle,
    ) -> Result<OrderId, GatewayError> {
        let contract = self.order_contract(instrument.into(), amount, style)?;
        self.ensure_connected()?;
        let order_id = self.next_order_id()?;
        self.submit(order_id, contract, amount, style)
    }

    /// Re-send an existing order with new terms.
    pub fn modify_order(
        &self,
        order_id: OrderId,
        instrument: impl Into<InstrumentRef>,
        amount: i64,
        style: OrderStyle,
    ) -> Result<OrderId, GatewayError> {
        let contract = self.order_contract(instrument.into(), amount, style)?;
        self.ensure_connected()?;
        self.submit(order_id, contract, amount, style)
    }

    pub fn cancel_order(&self, order_id: OrderId) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        self.send(&OutboundRequest::CancelOrder { order_id })?;
        info!(order_id, "Cancel requested");
        Ok(())
    }

    fn order_contract(&self, instrument: InstrumentRef, amount: i64, style: OrderStyle) -> Result<Contract, GatewayError> {
        if amount == 0 {
            return Err(GatewayError::InvalidArgument("order amount must be non-zero".to_string()));
        }
        style.validated()?;
        let contract = self.resolve(instrument)?;
        if style.is_combo() && !contract.is_combo() {
            return Err(GatewayError::InvalidArgument(format!(
                "combo order needs a contract with legs, {} has none",
                contract.display_symbol()
            )));
        }
        Ok(contract)
    }

    fn submit(&self, order_id: OrderId, contract: Contract, amount: i64, style: OrderStyle) -> Result<OrderId, GatewayError> {
        let order = OrderTicket::new(order_id, self.session.client_id(), amount, style)?;
        let symbol = contract.display_symbol().to_string();
        self.send(&OutboundRequest::PlaceOrder { contract, order: order.clone() })?;
        info!(
            order_id,
            symbol = %symbol,
            action = ?order.action,
            quantity = %order.total_quantity,
            order_type = ?order.order_type,
            "Order placed"
        );
        Ok(order_id)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Seed order ids and subscribe to account pushes.
    pub fn start(&self) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        if !self.session.order_ids.is_seeded() {
            let next = self.request_order_ids()?;
            info!(order_id = next, "Order ids seeded");
        }
        if self.session.tracks_account() {
            self.enable_account_updates()?;
        }
        Ok(())
    }

    pub fn enable_account_updates(&self) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        self.send(&OutboundRequest::AccountUpdates { subscribe: true, account: self.account_code() })?;
        info!(account = %self.account_code(), "Account updates enabled");
        Ok(())
    }

    pub fn disable_account_updates(&self) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        self.send(&OutboundRequest::AccountUpdates { subscribe: false, account: self.account_code() })?;
        info!(account = %self.account_code(), "Account updates disabled");
        Ok(())
    }

    fn account_code(&self) -> String {
        self.session
            .portfolio()
            .and_then(|p| p.account().account_id().map(str::to_string))
            .or_else(|| self.config.account_id.clone())
            .unwrap_or_default()
    }

    /// Unsubscribe from account pushes and close the transport.
    pub fn shutdown(&self) {
        if self.session.tracks_account() && self.is_connected() {
            if let Err(e) = self.disable_account_updates() {
                warn!(error = %e, "Failed to disable account updates");
            }
        }
        self.transport.close();
        info!("Gateway shut down");
    }
}

fn unexpected_buffer(buffer: &SlotBuffer) -> GatewayError {
    GatewayError::ProtocolViolation(format!("unexpected slot contents: {:?}", buffer))
}
