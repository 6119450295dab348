use crate::{Account, AccountError, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The account's portfolio: the position set plus performance figures.
///
/// Value figures are read through the owned [`Account`], so they cannot drift
/// from what the broker last reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    account: Account,
    starting_cash: Decimal,
    positions: BTreeMap<String, Position>,
    pnl: Decimal,
    returns: Decimal,
}

impl Portfolio {
    pub fn new(account_id: Option<String>, starting_cash: Decimal) -> Result<Self, AccountError> {
        if starting_cash.is_zero() {
            return Err(AccountError::ZeroStartingCash);
        }
        let mut portfolio = Self {
            account: Account::new(account_id),
            starting_cash,
            positions: BTreeMap::new(),
            pnl: Decimal::ZERO,
            returns: Decimal::ZERO,
        };
        portfolio.recompute();
        Ok(portfolio)
    }

    /// Apply an account value push and refresh performance figures.
    pub fn apply_account_value(
        &mut self,
        key: &str,
        value: &str,
        currency: &str,
        account_id: &str,
    ) -> Result<bool, AccountError> {
        let applied = self.account.apply(key, value, currency, account_id)?;
        if applied {
            self.recompute();
        }
        Ok(applied)
    }

    /// Replace the position for `position.symbol` wholesale.
    ///
    /// Flat positions are kept: the broker reports a closed holding with a
    /// zero amount and its realized P&L.
    pub fn apply_position(&mut self, account_id: &str, position: Position) -> Result<(), AccountError> {
        self.account.claim(account_id)?;
        self.positions.insert(position.symbol.clone(), position);
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        let value = self.portfolio_value();
        self.pnl = value - self.starting_cash;
        self.returns = value.checked_div(self.starting_cash).unwrap_or(Decimal::ZERO);
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn starting_cash(&self) -> Decimal {
        self.starting_cash
    }

    pub fn portfolio_value(&self) -> Decimal {
        self.account.net_liquidation()
    }

    pub fn positions_value(&self) -> Decimal {
        self.account.total_positions_value()
    }

    pub fn cash(&self) -> Decimal {
        self.account.excess_liquidity()
    }

    pub fn leverage(&self) -> Decimal {
        self.account.leverage()
    }

    pub fn pnl(&self) -> Decimal {
        self.pnl
    }

    /// `portfolio_value / starting_cash`.
    pub fn returns(&self) -> Decimal {
        self.returns
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }
}
