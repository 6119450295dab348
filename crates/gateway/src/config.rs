use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use syncgate_core::{ClientId, ReportKind};

/// Session-level gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client id presented to the broker; stamped on every order.
    pub client_id: ClientId,
    /// Account to track. `None` binds to the first account that pushes.
    pub account_id: Option<String>,
    /// Reference capital for P&L and returns. Zero disables account tracking.
    pub starting_cash: Decimal,
    /// Routing exchange for bare symbols.
    pub default_exchange: String,
    /// Currency for bare symbols.
    pub default_currency: String,
    pub timeouts: Timeouts,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_id: 0,
            account_id: None,
            starting_cash: dec!(100000),
            default_exchange: "SMART".to_string(),
            default_currency: "USD".to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Default waits per operation, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub tick_snapshot_ms: u64,
    /// Extra wait after a snapshot ends; late tick pushes may still follow.
    pub snapshot_settle_ms: u64,
    pub price_history_ms: u64,
    pub financial_statements_ms: u64,
    pub ownership_ms: u64,
    pub analyst_estimates_ms: u64,
    pub company_overview_ms: u64,
    pub financial_summary_ms: u64,
    pub financial_ratios_ms: u64,
    pub dividends_ms: u64,
    pub contract_details_ms: u64,
    pub open_orders_ms: u64,
    pub next_order_id_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            tick_snapshot_ms: 5_000,
            snapshot_settle_ms: 500,
            price_history_ms: 30_000,
            financial_statements_ms: 20_000,
            ownership_ms: 300_000,
            analyst_estimates_ms: 20_000,
            company_overview_ms: 10_000,
            financial_summary_ms: 10_000,
            financial_ratios_ms: 5_000,
            dividends_ms: 5_000,
            contract_details_ms: 5_000,
            open_orders_ms: 3_000,
            next_order_id_ms: 2_000,
        }
    }
}

impl Timeouts {
    pub fn tick_snapshot(&self) -> Duration {
        Duration::from_millis(self.tick_snapshot_ms)
    }

    pub fn snapshot_settle(&self) -> Duration {
        Duration::from_millis(self.snapshot_settle_ms)
    }

    pub fn price_history(&self) -> Duration {
        Duration::from_millis(self.price_history_ms)
    }

    pub fn report(&self, kind: ReportKind) -> Duration {
        Duration::from_millis(match kind {
            ReportKind::FinancialStatements => self.financial_statements_ms,
            ReportKind::Ownership => self.ownership_ms,
            ReportKind::AnalystEstimates => self.analyst_estimates_ms,
            ReportKind::CompanyOverview => self.company_overview_ms,
            ReportKind::FinancialSummary => self.financial_summary_ms,
        })
    }

    pub fn financial_ratios(&self) -> Duration {
        Duration::from_millis(self.financial_ratios_ms)
    }

    pub fn dividends(&self) -> Duration {
        Duration::from_millis(self.dividends_ms)
    }

    pub fn contract_details(&self) -> Duration {
        Duration::from_millis(self.contract_details_ms)
    }

    pub fn open_orders(&self) -> Duration {
        Duration::from_millis(self.open_orders_ms)
    }

    pub fn next_order_id(&self) -> Duration {
        Duration::from_millis(self.next_order_id_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            client_id = 7
            account_id = "DU123"

            [timeouts]
            price_history_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.client_id, 7);
        assert_eq!(config.default_exchange, "SMART");
        assert_eq!(config.timeouts.price_history(), Duration::from_secs(1));
        assert_eq!(config.timeouts.report(ReportKind::Ownership), Duration::from_secs(300));
    }
}
