//! Cash-drawer denomination breakdowns ("denominaciones").
//!
//! A breakdown is a JSON object `{ "<face value>": <count>, ... }` as typed by
//! the cashier. Entries whose face value or count is not a non-negative
//! number are ignored when computing the balance, so a malformed map can
//! never poison a shift's totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::money::Money;

/// Face value → count, kept verbatim for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Denominations(BTreeMap<String, Value>);

impl Denominations {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        Denominations(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Σ face_value × count over the valid entries.
    pub fn balance(&self) -> Money {
        self.0
            .iter()
            .filter_map(|(face, count)| {
                let face = Money::parse(face).filter(|m| !m.is_negative())?;
                let count = parse_count(count)?;
                Some(face.multiply_quantity(count))
            })
            .sum()
    }
}

impl FromIterator<(String, Value)> for Denominations {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Denominations(iter.into_iter().collect())
    }
}

/// Whole, non-negative counts only. Numeric strings are tolerated.
fn parse_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return (i >= 0).then_some(i);
            }
            let f = n.as_f64()?;
            (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= i64::MAX as f64)
                .then_some(f as i64)
        }
        Value::String(s) => s.trim().parse::<i64>().ok().filter(|i| *i >= 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn denoms(value: Value) -> Denominations {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_balance() {
        let d = denoms(json!({ "50000": 2, "10000": 3, "500": 4 }));
        assert_eq!(d.balance(), Money::from_major(132_000));
    }

    #[test]
    fn test_empty_map_is_zero() {
        assert_eq!(Denominations::default().balance(), Money::zero());
    }

    #[test]
    fn test_ignores_malformed_entries() {
        let d = denoms(json!({
            "1000": 1,
            "abc": 5,
            "2000": -1,
            "-500": 3,
            "5000": "x",
            "200": null,
            "100": 1.5,
            "50": "2"
        }));
        assert_eq!(d.balance(), Money::from_major(1100));
    }

    #[test]
    fn test_fractional_face_values() {
        let d = denoms(json!({ "0.50": 3 }));
        assert_eq!(d.balance(), Money::from_cents(150));
    }
}
