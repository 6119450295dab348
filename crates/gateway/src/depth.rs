use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use syncgate_core::*;

/// Number of book positions per side.
pub const LADDER_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DepthSlot {
    #[default]
    Empty,
    Level { price: Decimal, size: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepthError {
    #[error("Depth position {0} outside ladder")]
    PositionOutOfRange(i32),
    #[error("Unknown depth operation code {0}")]
    UnknownOperation(i32),
    #[error("Unknown book side code {0}")]
    UnknownSide(i32),
    #[error("No depth subscription for {0}")]
    UnknownSubscription(CorrelationId),
}

/// Both sides of the book at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub bids: [DepthSlot; LADDER_DEPTH],
    pub asks: [DepthSlot; LADDER_DEPTH],
}

/// Fixed-depth bid/ask ladder for one subscription.
///
/// Each slot is written as a whole under the lock, so readers never see a
/// price from one update paired with a size from another.
#[derive(Debug, Default)]
pub struct DepthLadder {
    lanes: RwLock<DepthSnapshot>,
}

impl DepthLadder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, update and delete all replace the slot at `position`;
    /// delete writes [`DepthSlot::Empty`].
    pub fn apply(
        &self,
        position: i32,
        operation: DepthOperation,
        side: BookSide,
        price: Decimal,
        size: Decimal,
    ) -> Result<(), DepthError> {
        let index = usize::try_from(position)
            .ok()
            .filter(|i| *i < LADDER_DEPTH)
            .ok_or(DepthError::PositionOutOfRange(position))?;
        let value = match operation {
            DepthOperation::Insert | DepthOperation::Update => DepthSlot::Level { price, size },
            DepthOperation::Delete => DepthSlot::Empty,
        };
        let mut lanes = self.lanes.write();
        let lane = match side {
            BookSide::Bid => &mut lanes.bids,
            BookSide::Ask => &mut lanes.asks,
        };
        lane[index] = value;
        Ok(())
    }

    pub fn slot(&self, side: BookSide, position: usize) -> Option<DepthSlot> {
        let lanes = self.lanes.read();
        match side {
            BookSide::Bid => lanes.bids.get(position).copied(),
            BookSide::Ask => lanes.asks.get(position).copied(),
        }
    }

    pub fn snapshot(&self) -> DepthSnapshot {
        *self.lanes.read()
    }
}

/// Ladders keyed by depth subscription id.
#[derive(Debug, Default)]
pub struct MarketDepthBook {
    ladders: DashMap<CorrelationId, Arc<DepthLadder>>,
}

impl MarketDepthBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, id: CorrelationId) -> Arc<DepthLadder> {
        self.ladders.entry(id).or_default().value().clone()
    }

    pub fn unsubscribe(&self, id: CorrelationId) -> bool {
        self.ladders.remove(&id).is_some()
    }

    pub fn ladder(&self, id: CorrelationId) -> Option<Arc<DepthLadder>> {
        self.ladders.get(&id).map(|entry| entry.value().clone())
    }

    pub fn is_subscribed(&self, id: CorrelationId) -> bool {
        self.ladders.contains_key(&id)
    }

    /// Apply a raw depth push.
    pub fn apply(
        &self,
        id: CorrelationId,
        position: i32,
        operation: i32,
        side: i32,
        price: Decimal,
        size: Decimal,
    ) -> Result<(), DepthError> {
        let operation = DepthOperation::from_code(operation).ok_or(DepthError::UnknownOperation(operation))?;
        let side = BookSide::from_code(side).ok_or(DepthError::UnknownSide(side))?;
        let ladder = self.ladder(id).ok_or(DepthError::UnknownSubscription(id))?;
        ladder.apply(position, operation, side, price, size)
    }

    pub fn len(&self) -> usize {
        self.ladders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::thread;

    #[test]
    fn test_slots_start_empty() {
        let ladder = DepthLadder::new();
        let snap = ladder.snapshot();
        assert!(snap.bids.iter().chain(snap.asks.iter()).all(|s| *s == DepthSlot::Empty));
    }

    #[test]
    fn test_in_range_update_touches_one_slot() {
        let ladder = DepthLadder::new();
        let before = ladder.snapshot();
        ladder
            .apply(3, DepthOperation::Insert, BookSide::Bid, dec!(99.5), dec!(200))
            .unwrap();
        let after = ladder.snapshot();

        assert_eq!(after.bids[3], DepthSlot::Level { price: dec!(99.5), size: dec!(200) });
        assert_eq!(after.asks, before.asks);
        for i in (0..LADDER_DEPTH).filter(|i| *i != 3) {
            assert_eq!(after.bids[i], before.bids[i]);
        }
    }

    #[test]
    fn test_out_of_range_position_rejected() {
        let ladder = DepthLadder::new();
        for position in [10, 11, -1] {
            assert_eq!(
                ladder.apply(position, DepthOperation::Update, BookSide::Ask, dec!(1), dec!(1)),
                Err(DepthError::PositionOutOfRange(position))
            );
        }
        assert_eq!(ladder.snapshot(), DepthSnapshot::default());
    }

    #[test]
    fn test_delete_sets_empty() {
        let ladder = DepthLadder::new();
        ladder.apply(0, DepthOperation::Insert, BookSide::Ask, dec!(101), dec!(5)).unwrap();
        ladder.apply(0, DepthOperation::Delete, BookSide::Ask, dec!(0), dec!(0)).unwrap();
        assert_eq!(ladder.slot(BookSide::Ask, 0), Some(DepthSlot::Empty));
        assert_eq!(ladder.slot(BookSide::Ask, LADDER_DEPTH), None);
    }

    #[test]
    fn test_book_decodes_codes() {
        let book = MarketDepthBook::new();
        let id = CorrelationId::new(4).unwrap();
        book.subscribe(id);
        book.apply(id, 1, 0, 1, dec!(50), dec!(10)).unwrap();
        assert_eq!(
            book.ladder(id).unwrap().slot(BookSide::Bid, 1),
            Some(DepthSlot::Level { price: dec!(50), size: dec!(10) })
        );
        assert_eq!(book.apply(id, 1, 7, 1, dec!(1), dec!(1)), Err(DepthError::UnknownOperation(7)));
        assert_eq!(book.apply(id, 1, 0, 5, dec!(1), dec!(1)), Err(DepthError::UnknownSide(5)));

        let other = CorrelationId::new(5).unwrap();
        assert_eq!(
            book.apply(other, 0, 0, 0, dec!(1), dec!(1)),
            Err(DepthError::UnknownSubscription(other))
        );
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        let ladder = Arc::new(DepthLadder::new());
        let writer = {
            let ladder = ladder.clone();
            thread::spawn(move || {
                for i in 1..2000i64 {
                    let v = Decimal::from(i);
                    ladder.apply(0, DepthOperation::Update, BookSide::Bid, v, v).unwrap();
                }
            })
        };
        for _ in 0..2000 {
            if let Some(DepthSlot::Level { price, size }) = ladder.slot(BookSide::Bid, 0) {
                assert_eq!(price, size);
            }
        }
        writer.join().unwrap();
    }
}
