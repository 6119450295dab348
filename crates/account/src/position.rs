use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Holding in one security, as last reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Broker contract id.
    pub sid: Option<i64>,
    /// Signed share count; negative is short.
    pub amount: Decimal,
    pub cost_basis: Decimal,
    pub last_sale_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.amount * self.last_sale_price
    }

    pub fn is_flat(&self) -> bool {
        self.amount.is_zero()
    }
}
