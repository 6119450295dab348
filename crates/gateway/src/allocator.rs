use parking_lot::Mutex;
use syncgate_core::{CorrelationId, GatewayError, OrderId};

/// Issues strictly increasing correlation ids, starting at 1.
///
/// Overflow fails fast with [`GatewayError::IdsExhausted`] instead of wrapping
/// into ids that may still be pending.
#[derive(Debug, Default)]
pub struct CorrelationIdAllocator {
    last: Mutex<u32>,
}

impl CorrelationIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose first id is `first`.
    pub fn starting_at(first: CorrelationId) -> Self {
        Self { last: Mutex::new(first.get() - 1) }
    }

    pub fn next(&self) -> Result<CorrelationId, GatewayError> {
        let mut last = self.last.lock();
        let id = last
            .checked_add(1)
            .and_then(CorrelationId::new)
            .ok_or(GatewayError::IdsExhausted)?;
        *last = id.get();
        Ok(id)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum OrderIdState {
    #[default]
    Unseeded,
    Next(OrderId),
    /// `OrderId::MAX` was handed out.
    Exhausted,
}

/// Order ids for new orders, seeded by the broker's next-valid-id push.
#[derive(Debug, Default)]
pub struct OrderIdAllocator {
    state: Mutex<OrderIdState>,
}

impl OrderIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a broker-reported next valid id. Never moves backwards.
    pub fn seed(&self, order_id: OrderId) {
        let mut state = self.state.lock();
        *state = match *state {
            OrderIdState::Unseeded => OrderIdState::Next(order_id),
            OrderIdState::Next(current) => OrderIdState::Next(current.max(order_id)),
            OrderIdState::Exhausted => OrderIdState::Exhausted,
        };
    }

    pub fn is_seeded(&self) -> bool {
        *self.state.lock() != OrderIdState::Unseeded
    }

    /// Take the next order id, `None` until seeded.
    ///
    /// Once the largest id has been issued every call fails with
    /// [`GatewayError::IdsExhausted`].
    pub fn next(&self) -> Result<Option<OrderId>, GatewayError> {
        let mut state = self.state.lock();
        match *state {
            OrderIdState::Unseeded => Ok(None),
            OrderIdState::Next(id) => {
                *state = id.checked_add(1).map_or(OrderIdState::Exhausted, OrderIdState::Next);
                Ok(Some(id))
            }
            OrderIdState::Exhausted => Err(GatewayError::IdsExhausted),
        }
    }
}
