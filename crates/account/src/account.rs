use crate::AccountError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

/// Account value keys the aggregate tracks. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountField {
    AvailableFunds,
    AccruedCash,
    BuyingPower,
    Cushion,
    EquityWithLoanValue,
    ExcessLiquidity,
    InitialMarginRequirement,
    MaintenanceMarginRequirement,
    NetLiquidation,
    RegTEquity,
    RegTMargin,
    SettledCash,
    TotalPositionsValue,
}

impl AccountField {
    pub const ALL: [AccountField; 13] = [
        AccountField::AvailableFunds,
        AccountField::AccruedCash,
        AccountField::BuyingPower,
        AccountField::Cushion,
        AccountField::EquityWithLoanValue,
        AccountField::ExcessLiquidity,
        AccountField::InitialMarginRequirement,
        AccountField::MaintenanceMarginRequirement,
        AccountField::NetLiquidation,
        AccountField::RegTEquity,
        AccountField::RegTMargin,
        AccountField::SettledCash,
        AccountField::TotalPositionsValue,
    ];

    /// Map a broker account key to a tracked field.
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "AvailableFunds" => AccountField::AvailableFunds,
            "AccruedCash" => AccountField::AccruedCash,
            "BuyingPower" => AccountField::BuyingPower,
            "Cushion" => AccountField::Cushion,
            "EquityWithLoanValue" => AccountField::EquityWithLoanValue,
            "ExcessLiquidity" => AccountField::ExcessLiquidity,
            "InitMarginReq" => AccountField::InitialMarginRequirement,
            "MaintMarginReq" => AccountField::MaintenanceMarginRequirement,
            "NetLiquidation" => AccountField::NetLiquidation,
            "RegTEquity" => AccountField::RegTEquity,
            "RegTMargin" => AccountField::RegTMargin,
            "SettledCash" => AccountField::SettledCash,
            "GrossPositionValue" => AccountField::TotalPositionsValue,
            _ => return None,
        })
    }

    /// Broker key for this field.
    pub fn key(&self) -> &'static str {
        match self {
            AccountField::AvailableFunds => "AvailableFunds",
            AccountField::AccruedCash => "AccruedCash",
            AccountField::BuyingPower => "BuyingPower",
            AccountField::Cushion => "Cushion",
            AccountField::EquityWithLoanValue => "EquityWithLoanValue",
            AccountField::ExcessLiquidity => "ExcessLiquidity",
            AccountField::InitialMarginRequirement => "InitMarginReq",
            AccountField::MaintenanceMarginRequirement => "MaintMarginReq",
            AccountField::NetLiquidation => "NetLiquidation",
            AccountField::RegTEquity => "RegTEquity",
            AccountField::RegTMargin => "RegTMargin",
            AccountField::SettledCash => "SettledCash",
            AccountField::TotalPositionsValue => "GrossPositionValue",
        }
    }
}

/// Broker-reported financial state of the single live account.
///
/// Starts uninitialized when no account id is known; the first push binds it.
/// After that, pushes for any other account are rejected without touching state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    account_id: Option<String>,
    currency: Option<String>,
    values: BTreeMap<AccountField, Decimal>,
    leverage: Decimal,
}

impl Account {
    pub fn new(account_id: Option<String>) -> Self {
        Self {
            account_id,
            currency: None,
            values: BTreeMap::new(),
            leverage: Decimal::ZERO,
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Check that a push belongs to this account, binding an uninitialized one.
    pub(crate) fn claim(&mut self, account_id: &str) -> Result<(), AccountError> {
        match &self.account_id {
            Some(own) if own == account_id => Ok(()),
            Some(own) => Err(AccountError::AccountMismatch {
                expected: own.clone(),
                got: account_id.to_string(),
            }),
            None => {
                info!(account = %account_id, "Account bound");
                self.account_id = Some(account_id.to_string());
                Ok(())
            }
        }
    }

    /// Apply one account value push.
    ///
    /// Returns `Ok(false)` for keys the aggregate does not track.
    pub fn apply(
        &mut self,
        key: &str,
        value: &str,
        currency: &str,
        account_id: &str,
    ) -> Result<bool, AccountError> {
        if let Some(own) = &self.account_id {
            if own != account_id {
                return Err(AccountError::AccountMismatch {
                    expected: own.clone(),
                    got: account_id.to_string(),
                });
            }
        }
        let Some(field) = AccountField::from_key(key) else {
            return Ok(false);
        };
        let parsed = parse_value(value).ok_or_else(|| AccountError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        self.claim(account_id)?;

        self.values.insert(field, parsed);
        if !currency.is_empty() {
            self.currency = Some(currency.to_string());
        }
        self.recompute_leverage();
        Ok(true)
    }

    fn recompute_leverage(&mut self) {
        let net = self.net_liquidation();
        self.leverage = if net.is_zero() {
            Decimal::ZERO
        } else {
            self.total_positions_value()
                .checked_div(net)
                .unwrap_or(Decimal::ZERO)
        };
    }

    /// Last reported value, zero when never reported.
    pub fn get(&self, field: AccountField) -> Decimal {
        self.values.get(&field).copied().unwrap_or(Decimal::ZERO)
    }

    /// Whether the broker has reported this field yet.
    pub fn has(&self, field: AccountField) -> bool {
        self.values.contains_key(&field)
    }

    pub fn net_liquidation(&self) -> Decimal {
        self.get(AccountField::NetLiquidation)
    }

    pub fn total_positions_value(&self) -> Decimal {
        self.get(AccountField::TotalPositionsValue)
    }

    pub fn excess_liquidity(&self) -> Decimal {
        self.get(AccountField::ExcessLiquidity)
    }

    /// `total_positions_value / net_liquidation`, zero when net liquidation is zero.
    pub fn leverage(&self) -> Decimal {
        self.leverage
    }
}

fn parse_value(value: &str) -> Option<Decimal> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}
