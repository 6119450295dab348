use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Fundamental ratios from a `KEY=VALUE;KEY=VALUE;` tick string.
///
/// Values stay as text: the set mixes numbers, dates and currency codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialRatios {
    values: BTreeMap<String, String>,
}

impl FinancialRatios {
    /// Malformed entries are skipped.
    pub fn parse(raw: &str) -> Self {
        let values = raw
            .split(';')
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Numeric value, `None` when absent or not a number.
    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        self.get(key).and_then(|v| Decimal::from_str(v).ok())
    }

    pub fn currency(&self) -> Option<&str> {
        self.get("CURRENCY")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Dividend summary from a `past,next,date,amount` tick string,
/// e.g. `0.83,0.92,20130219,0.23`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dividends {
    /// Sum of dividends over the past 12 months.
    pub past_12m: Option<Decimal>,
    /// Expected sum over the next 12 months.
    pub next_12m: Option<Decimal>,
    pub next_date: Option<NaiveDate>,
    pub next_amount: Option<Decimal>,
}

impl Dividends {
    /// Blank or malformed fields come back as `None`.
    pub fn parse(raw: &str) -> Self {
        let mut fields = raw.split(',').map(str::trim);
        let mut decimal = || fields.next().and_then(|f| Decimal::from_str(f).ok());
        let past_12m = decimal();
        let next_12m = decimal();
        let next_date = fields
            .next()
            .and_then(|f| NaiveDate::parse_from_str(f, "%Y%m%d").ok());
        let next_amount = fields.next().and_then(|f| Decimal::from_str(f).ok());
        Self { past_12m, next_12m, next_date, next_amount }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ratios_parse() {
        let ratios = FinancialRatios::parse(
            "TTMNPMGN=16.1298;NLOW=80.6;LATESTADATE=2016-12-31;CURRENCY=HKD;TTMINTCOV=-99999.99;;junk;",
        );
        assert_eq!(ratios.len(), 5);
        assert_eq!(ratios.decimal("NLOW"), Some(dec!(80.6)));
        assert_eq!(ratios.decimal("TTMINTCOV"), Some(dec!(-99999.99)));
        assert_eq!(ratios.currency(), Some("HKD"));
        assert_eq!(ratios.decimal("LATESTADATE"), None);
        assert_eq!(ratios.get("junk"), None);
    }

    #[test]
    fn test_dividends_parse() {
        let divs = Dividends::parse("0.83,0.92,20130219,0.23");
        assert_eq!(divs.past_12m, Some(dec!(0.83)));
        assert_eq!(divs.next_12m, Some(dec!(0.92)));
        assert_eq!(divs.next_date, NaiveDate::from_ymd_opt(2013, 2, 19));
        assert_eq!(divs.next_amount, Some(dec!(0.23)));
    }

    #[test]
    fn test_dividends_blank_fields() {
        let divs = Dividends::parse("0.83,,,");
        assert_eq!(divs.past_12m, Some(dec!(0.83)));
        assert_eq!(divs.next_12m, None);
        assert_eq!(divs.next_date, None);
        assert_eq!(Dividends::parse(""), Dividends::default());
    }
}
