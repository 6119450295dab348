use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncgate_core::*;
use tracing::{debug, error};

/// The operation a slot was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    TickSnapshot,
    TickStream,
    RealtimeBars,
    PriceHistory,
    FundamentalReport,
    FinancialRatios,
    Dividends,
    ContractDetails,
    OpenOrders,
    NextValidId,
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::TickSnapshot => "tick_snapshot",
            RequestKind::TickStream => "tick_stream",
            RequestKind::RealtimeBars => "realtime_bars",
            RequestKind::PriceHistory => "price_history",
            RequestKind::FundamentalReport => "fundamental_report",
            RequestKind::FinancialRatios => "financial_ratios",
            RequestKind::Dividends => "dividends",
            RequestKind::ContractDetails => "contract_details",
            RequestKind::OpenOrders => "open_orders",
            RequestKind::NextValidId => "next_valid_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Pending,
    Finished,
    Error,
    TimedOut,
}

/// Per-kind accumulation buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotBuffer {
    Bars(Vec<RawBar>),
    RealtimeBars(Vec<RealtimeBar>),
    Ticks(TickSnapshot),
    Text(Option<String>),
    Contracts(Vec<ContractDetails>),
    OpenOrders(Vec<OpenOrder>),
    NextId(Option<OrderId>),
}

impl SlotBuffer {
    pub fn for_kind(kind: RequestKind) -> Self {
        match kind {
            RequestKind::TickSnapshot | RequestKind::TickStream => SlotBuffer::Ticks(TickSnapshot::default()),
            RequestKind::RealtimeBars => SlotBuffer::RealtimeBars(Vec::new()),
            RequestKind::PriceHistory => SlotBuffer::Bars(Vec::new()),
            RequestKind::FundamentalReport | RequestKind::FinancialRatios | RequestKind::Dividends => {
                SlotBuffer::Text(None)
            }
            RequestKind::ContractDetails => SlotBuffer::Contracts(Vec::new()),
            RequestKind::OpenOrders => SlotBuffer::OpenOrders(Vec::new()),
            RequestKind::NextValidId => SlotBuffer::NextId(None),
        }
    }
}

#[derive(Debug)]
struct SlotState {
    status: SlotStatus,
    buffer: SlotBuffer,
    error: Option<BrokerMessage>,
}

/// One pending request: its buffer, status and completion signal.
#[derive(Debug)]
pub struct ResponseSlot {
    key: SlotKey,
    kind: RequestKind,
    state: Mutex<SlotState>,
    done: Condvar,
}

impl ResponseSlot {
    fn new(key: SlotKey, kind: RequestKind) -> Self {
        Self {
            key,
            kind,
            state: Mutex::new(SlotState {
                status: SlotStatus::Pending,
                buffer: SlotBuffer::for_kind(kind),
                error: None,
            }),
            done: Condvar::new(),
        }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn status(&self) -> SlotStatus {
        self.state.lock().status
    }

    pub fn error(&self) -> Option<BrokerMessage> {
        self.state.lock().error.clone()
    }

    /// Mutate the buffer. Allowed for as long as the slot is registered,
    /// including after its terminator.
    pub fn accumulate<R>(&self, f: impl FnOnce(&mut SlotBuffer) -> R) -> R {
        f(&mut self.state.lock().buffer)
    }

    /// Read the buffer without taking it.
    pub fn read<R>(&self, f: impl FnOnce(&SlotBuffer) -> R) -> R {
        f(&self.state.lock().buffer)
    }

    /// Move the buffer out, leaving an empty one behind.
    pub fn take_buffer(&self) -> SlotBuffer {
        mem::replace(&mut self.state.lock().buffer, SlotBuffer::for_kind(self.kind))
    }

    /// Complete normally. Returns false if the slot was already complete.
    pub fn finish(&self) -> bool {
        self.complete(SlotStatus::Finished, None)
    }

    /// Complete with a broker error. Returns false if already complete.
    pub fn fail(&self, error: BrokerMessage) -> bool {
        self.complete(SlotStatus::Error, Some(error))
    }

    fn complete(&self, status: SlotStatus, error: Option<BrokerMessage>) -> bool {
        let mut state = self.state.lock();
        if state.status != SlotStatus::Pending {
            return false;
        }
        state.status = status;
        state.error = error;
        self.done.notify_all();
        true
    }

    /// Block until the slot completes or `timeout` elapses.
    ///
    /// On expiry a still-pending slot is marked `TimedOut`; a slot the
    /// dispatcher completed in the meantime keeps its status. A timeout too
    /// large to form a deadline waits without one.
    pub fn wait(&self, timeout: Duration) -> SlotStatus {
        self.wait_inner(timeout, true)
    }

    /// Like [`wait`](Self::wait), but a slot still pending at expiry is left
    /// `Pending` for its owner.
    pub fn wait_shared(&self, timeout: Duration) -> SlotStatus {
        self.wait_inner(timeout, false)
    }

    fn wait_inner(&self, timeout: Duration, expire: bool) -> SlotStatus {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while state.status == SlotStatus::Pending {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut state, deadline).timed_out() {
                        if expire && state.status == SlotStatus::Pending {
                            state.status = SlotStatus::TimedOut;
                        }
                        break;
                    }
                }
                None => self.done.wait(&mut state),
            }
        }
        state.status
    }
}

/// Live slots keyed by correlation id or fixed key.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    slots: DashMap<SlotKey, Arc<ResponseSlot>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot. The returned guard releases it when dropped.
    pub fn register(&self, key: impl Into<SlotKey>, kind: RequestKind) -> Result<SlotGuard<'_>, GatewayError> {
        let key = key.into();
        match self.slots.entry(key) {
            Entry::Occupied(_) => {
                error!(key = %key, kind = kind.name(), "Slot already registered");
                Err(GatewayError::RequestInFlight(key))
            }
            Entry::Vacant(vacant) => {
                let slot = Arc::new(ResponseSlot::new(key, kind));
                vacant.insert(slot.clone());
                debug!(key = %key, kind = kind.name(), "Slot registered");
                Ok(SlotGuard { table: self, slot, armed: true })
            }
        }
    }

    /// Register a slot, or join the one already registered under `key`.
    ///
    /// A joined guard shares the slot but never releases it; the registering
    /// caller still owns it. Joining a slot of another kind is refused.
    pub fn join_or_register(&self, key: impl Into<SlotKey>, kind: RequestKind) -> Result<SlotGuard<'_>, GatewayError> {
        let key = key.into();
        match self.slots.entry(key) {
            Entry::Occupied(occupied) => {
                let slot = occupied.get().clone();
                if slot.kind() != kind {
                    error!(key = %key, kind = kind.name(), slot = slot.kind().name(), "Slot registered for another kind");
                    return Err(GatewayError::RequestInFlight(key));
                }
                debug!(key = %key, kind = kind.name(), "Joined in-flight slot");
                Ok(SlotGuard { table: self, slot, armed: false })
            }
            Entry::Vacant(vacant) => {
                let slot = Arc::new(ResponseSlot::new(key, kind));
                vacant.insert(slot.clone());
                debug!(key = %key, kind = kind.name(), "Slot registered");
                Ok(SlotGuard { table: self, slot, armed: true })
            }
        }
    }

    /// Apply `f` to the slot for `key`.
    pub fn route<R>(&self, key: impl Into<SlotKey>, f: impl FnOnce(&ResponseSlot) -> R) -> Result<R, GatewayError> {
        let key = key.into();
        // Clone out so the shard lock is not held while the slot is locked.
        let slot = self
            .slots
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(GatewayError::UnknownId(key))?;
        Ok(f(&*slot))
    }

    pub fn get(&self, key: impl Into<SlotKey>) -> Option<Arc<ResponseSlot>> {
        self.slots.get(&key.into()).map(|entry| entry.value().clone())
    }

    /// Remove the slot for `key`. Returns false if nothing was registered.
    pub fn release(&self, key: impl Into<SlotKey>) -> bool {
        let key = key.into();
        let removed = self.slots.remove(&key).is_some();
        if removed {
            debug!(key = %key, "Slot released");
        }
        removed
    }

    /// Remove `slot` only if it is still the one registered under its key.
    fn release_slot(&self, slot: &Arc<ResponseSlot>) {
        let key = slot.key();
        if self.slots.remove_if(&key, |_, current| Arc::ptr_eq(current, slot)).is_some() {
            debug!(key = %key, "Slot released");
        }
    }

    pub fn contains(&self, key: impl Into<SlotKey>) -> bool {
        self.slots.contains_key(&key.into())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Registration handle. Dropping it releases the slot.
pub struct SlotGuard<'a> {
    table: &'a PendingRequestTable,
    slot: Arc<ResponseSlot>,
    armed: bool,
}

impl SlotGuard<'_> {
    pub fn slot(&self) -> &ResponseSlot {
        &self.slot
    }

    pub fn key(&self) -> SlotKey {
        self.slot.key()
    }

    /// Whether this guard registered the slot and will release it.
    pub fn is_owner(&self) -> bool {
        self.armed
    }

    /// Keep the slot registered past this guard. The caller becomes
    /// responsible for releasing it by key.
    pub fn detach(mut self) -> Arc<ResponseSlot> {
        self.armed = false;
        self.slot.clone()
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.release_slot(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::thread;

    fn id(raw: u32) -> CorrelationId {
        CorrelationId::new(raw).unwrap()
    }

    fn bar(date: &str) -> RawBar {
        RawBar {
            date: date.to_string(),
            open: dec!(1),
            high: dec!(2),
            low: dec!(0.5),
            close: dec!(1.5),
            volume: dec!(100),
        }
    }

    fn push_bar(slot: &ResponseSlot, date: &str) {
        slot.accumulate(|buffer| {
            if let SlotBuffer::Bars(bars) = buffer {
                bars.push(bar(date));
            }
        });
    }

    #[test]
    fn test_history_accumulates_in_order_then_releases() {
        let table = PendingRequestTable::new();
        let guard = table.register(id(7), RequestKind::PriceHistory).unwrap();

        for date in ["20240102", "20240103", "20240104"] {
            table.route(id(7), |slot| push_bar(slot, date)).unwrap();
        }
        table.route(id(7), |slot| slot.finish()).unwrap();

        assert_eq!(guard.slot().wait(Duration::from_secs(1)), SlotStatus::Finished);
        match guard.slot().take_buffer() {
            SlotBuffer::Bars(bars) => {
                let dates: Vec<_> = bars.iter().map(|b| b.date.as_str()).collect();
                assert_eq!(dates, ["20240102", "20240103", "20240104"]);
            }
            other => panic!("Expected bars, got {:?}", other),
        }
        drop(guard);
        assert!(!table.contains(id(7)));
    }

    #[test]
    fn test_timeout_then_late_push_is_dropped() {
        let table = PendingRequestTable::new();
        let guard = table.register(id(9), RequestKind::PriceHistory).unwrap();

        let started = Instant::now();
        let status = guard.slot().wait(Duration::from_millis(100));
        let waited = started.elapsed();
        assert_eq!(status, SlotStatus::TimedOut);
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(1000));
        drop(guard);

        let late = table.route(id(9), |slot| push_bar(slot, "20240102"));
        assert_eq!(late.unwrap_err(), GatewayError::UnknownId(SlotKey::Id(id(9))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_routing_isolation() {
        let table = PendingRequestTable::new();
        let a = table.register(id(1), RequestKind::PriceHistory).unwrap();
        let b = table.register(id(2), RequestKind::PriceHistory).unwrap();

        table.route(id(1), |slot| push_bar(slot, "20240102")).unwrap();
        table.route(id(1), |slot| slot.finish()).unwrap();

        assert_eq!(a.slot().status(), SlotStatus::Finished);
        assert_eq!(b.slot().status(), SlotStatus::Pending);
        assert_eq!(b.slot().read(|buf| buf.clone()), SlotBuffer::Bars(Vec::new()));
    }

    #[test]
    fn test_completion_happens_once() {
        let table = PendingRequestTable::new();
        let guard = table.register(id(3), RequestKind::ContractDetails).unwrap();
        assert!(guard.slot().finish());
        assert!(!guard.slot().fail(BrokerMessage { code: 200, message: "late".to_string() }));
        assert_eq!(guard.slot().status(), SlotStatus::Finished);
        assert!(guard.slot().error().is_none());
    }

    #[test]
    fn test_error_carries_code() {
        let table = PendingRequestTable::new();
        let guard = table.register(id(4), RequestKind::ContractDetails).unwrap();
        guard.slot().fail(BrokerMessage { code: 200, message: "No security definition".to_string() });
        assert_eq!(guard.slot().wait(Duration::from_millis(10)), SlotStatus::Error);
        assert_eq!(guard.slot().error().map(|e| e.code), Some(200));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let table = PendingRequestTable::new();
        let _first = table.register(FixedKey::OpenOrders, RequestKind::OpenOrders).unwrap();
        match table.register(FixedKey::OpenOrders, RequestKind::OpenOrders) {
            Err(GatewayError::RequestInFlight(key)) => assert_eq!(key, SlotKey::Fixed(FixedKey::OpenOrders)),
            _ => panic!("Expected duplicate rejection"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_wakes_waiter_from_other_thread() {
        let table = Arc::new(PendingRequestTable::new());
        let guard = table.register(id(5), RequestKind::TickSnapshot).unwrap();
        let pusher = {
            let table = table.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                table.route(id(5), |slot| slot.finish()).unwrap();
            })
        };
        assert_eq!(guard.slot().wait(Duration::from_secs(5)), SlotStatus::Finished);
        pusher.join().unwrap();
    }

    #[test]
    fn test_detached_slot_survives_guard() {
        let table = PendingRequestTable::new();
        let slot = table.register(id(6), RequestKind::TickStream).unwrap().detach();
        assert!(table.contains(id(6)));
        assert_eq!(slot.kind(), RequestKind::TickStream);
        assert!(table.release(id(6)));
        assert!(!table.release(id(6)));
    }

    #[test]
    fn test_stale_guard_does_not_release_newer_slot() {
        let table = PendingRequestTable::new();
        let old = table.register(FixedKey::NextValidId, RequestKind::NextValidId).unwrap();
        table.release(FixedKey::NextValidId);
        let _new = table.register(FixedKey::NextValidId, RequestKind::NextValidId).unwrap();
        drop(old);
        assert!(table.contains(FixedKey::NextValidId));
    }

    #[test]
    fn test_join_shares_slot_and_owner_releases() {
        let table = PendingRequestTable::new();
        let owner = table.join_or_register(FixedKey::OpenOrders, RequestKind::OpenOrders).unwrap();
        let joined = table.join_or_register(FixedKey::OpenOrders, RequestKind::OpenOrders).unwrap();
        assert!(owner.is_owner());
        assert!(!joined.is_owner());
        assert_eq!(table.len(), 1);

        table.route(FixedKey::OpenOrders, |slot| slot.finish()).unwrap();
        assert_eq!(joined.slot().wait_shared(Duration::from_millis(10)), SlotStatus::Finished);

        drop(joined);
        assert!(table.contains(FixedKey::OpenOrders));
        drop(owner);
        assert!(table.is_empty());
    }

    #[test]
    fn test_join_refuses_other_kind() {
        let table = PendingRequestTable::new();
        let _owner = table.register(FixedKey::NextValidId, RequestKind::NextValidId).unwrap();
        assert_eq!(
            table.join_or_register(FixedKey::NextValidId, RequestKind::OpenOrders).err(),
            Some(GatewayError::RequestInFlight(SlotKey::Fixed(FixedKey::NextValidId)))
        );
    }

    #[test]
    fn test_shared_wait_leaves_slot_pending_for_owner() {
        let table = PendingRequestTable::new();
        let owner = table.register(FixedKey::NextValidId, RequestKind::NextValidId).unwrap();
        let joined = table.join_or_register(FixedKey::NextValidId, RequestKind::NextValidId).unwrap();
        assert_eq!(joined.slot().wait_shared(Duration::from_millis(10)), SlotStatus::Pending);
        assert_eq!(owner.slot().status(), SlotStatus::Pending);
        table.route(FixedKey::NextValidId, |slot| slot.finish()).unwrap();
        assert_eq!(owner.slot().wait(Duration::from_millis(10)), SlotStatus::Finished);
    }

    #[test]
    fn test_unbounded_timeout_waits_for_completion() {
        let table = Arc::new(PendingRequestTable::new());
        let guard = table.register(id(8), RequestKind::ContractDetails).unwrap();
        let pusher = {
            let table = table.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                table.route(id(8), |slot| slot.finish()).unwrap();
            })
        };
        assert_eq!(guard.slot().wait(Duration::MAX), SlotStatus::Finished);
        pusher.join().unwrap();
    }

    proptest! {
        #[test]
        fn register_release_never_leaks(
            ids in proptest::collection::hash_set(1u32..10_000, 0..64),
            finish_mask in proptest::collection::vec(any::<bool>(), 64),
        ) {
            let table = PendingRequestTable::new();
            let _outer = table.register(FixedKey::OpenOrders, RequestKind::OpenOrders).unwrap();
            let before = table.len();
            {
                let guards: Vec<_> = ids
                    .iter()
                    .map(|raw| table.register(id(*raw), RequestKind::PriceHistory).unwrap())
                    .collect();
                prop_assert_eq!(table.len(), before + ids.len());
                for (guard, finish) in guards.iter().zip(finish_mask.iter()) {
                    if *finish {
                        guard.slot().finish();
                    }
                }
            }
            prop_assert_eq!(table.len(), before);
        }
    }
}
