//! Flat exchange-rate lookup built from the API's nested rate table

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Rates as served by `GET /taxas`: `from -> to -> rate`
pub type NestedRates = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatesResponse {
    pub taxas: NestedRates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Lookup key for a currency pair, e.g. `USD_EUR`
pub fn pair_key(from: &str, to: &str) -> String {
    format!("{from}_{to}")
}

/// Snapshot of every known pair. Always rebuilt as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
    currencies: Vec<String>,
}

impl RateTable {
    pub fn from_nested(nested: &NestedRates) -> Self {
        let mut rates = BTreeMap::new();
        let mut currencies = BTreeSet::new();

        for (from, targets) in nested {
            currencies.insert(from.clone());
            for (to, rate) in targets {
                currencies.insert(to.clone());
                if rate.is_finite() && *rate > 0.0 {
                    rates.insert(pair_key(from, to), *rate);
                } else {
                    debug!("Skipping unusable rate {} for {}/{}", rate, from, to);
                }
            }
        }

        Self {
            rates,
            currencies: currencies.into_iter().collect(),
        }
    }

    /// Rate for a `FROM_TO` key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.rates.get(key).copied()
    }

    pub fn rate(&self, from: &str, to: &str) -> Option<f64> {
        self.get(&pair_key(from, to))
    }

    /// Sorted, distinct currency codes appearing on either side of any pair
    pub fn available_currencies(&self) -> &[String] {
        &self.currencies
    }

    /// Advisory conversion; the server's result is authoritative
    pub fn estimate(&self, amount: f64, from: &str, to: &str) -> Option<f64> {
        self.rate(from, to).map(|rate| amount * rate)
    }

    /// Pairs in key order as `(from, to, rate)`
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.rates.iter().filter_map(|(key, rate)| {
            key.split_once('_').map(|(from, to)| (from, to, *rate))
        })
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl From<&RatesResponse> for RateTable {
    fn from(response: &RatesResponse) -> Self {
        Self::from_nested(&response.taxas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RateTable {
        let response: RatesResponse = serde_json::from_str(json).unwrap();
        RateTable::from(&response)
    }

    #[test]
    fn test_flatten_single_pair() {
        let table = parse(r#"{"taxas":{"USD":{"EUR":0.9}}}"#);

        assert_eq!(table.get("USD_EUR"), Some(0.9));
        assert_eq!(table.len(), 1);
        assert_eq!(table.available_currencies(), ["EUR", "USD"]);
    }

    #[test]
    fn test_flatten_multiple_sources() {
        let table = parse(
            r#"{"taxas":{"USD":{"EUR":0.9,"BRL":5.0},"EUR":{"USD":1.1}},"status":"ok"}"#,
        );

        assert_eq!(table.rate("USD", "BRL"), Some(5.0));
        assert_eq!(table.rate("EUR", "USD"), Some(1.1));
        assert_eq!(table.rate("BRL", "USD"), None);
        assert_eq!(table.available_currencies(), ["BRL", "EUR", "USD"]);

        let pairs: Vec<_> = table.pairs().collect();
        assert_eq!(
            pairs,
            vec![("EUR", "USD", 1.1), ("USD", "BRL", 5.0), ("USD", "EUR", 0.9)]
        );
    }

    #[test]
    fn test_every_pair_currency_is_available() {
        let table = parse(r#"{"taxas":{"GBP":{"JPY":190.5},"USD":{"GBP":0.79}}}"#);
        for (from, to, _) in table.pairs() {
            assert!(table.available_currencies().iter().any(|c| c == from));
            assert!(table.available_currencies().iter().any(|c| c == to));
        }
    }

    #[test]
    fn test_non_positive_rates_are_skipped() {
        let table = parse(r#"{"taxas":{"USD":{"EUR":0.0,"GBP":-1.0,"BRL":5.0}}}"#);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rate("USD", "EUR"), None);
    }

    #[test]
    fn test_estimate() {
        let table = parse(r#"{"taxas":{"USD":{"EUR":0.9}}}"#);

        let estimate = table.estimate(100.0, "USD", "EUR").unwrap();
        assert!((estimate - 90.0).abs() < 1e-9);
        assert_eq!(table.estimate(100.0, "EUR", "JPY"), None);
    }

    #[test]
    fn test_empty() {
        let table = RateTable::default();
        assert!(table.is_empty());
        assert!(table.available_currencies().is_empty());
        assert_eq!(table.pairs().count(), 0);
    }
}
