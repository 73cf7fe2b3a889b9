//! EquityPoint — one equity-curve row per processed bar.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Equity snapshot appended once per bar, monotone in time and never
/// retracted. Equity is realized capital plus any unrealized mark-to-market
/// on the open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub in_position: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn equity_point_roundtrip() {
        let point = EquityPoint {
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(0, 30, 0)
                .unwrap(),
            equity: 101_234.5,
            in_position: true,
        };
        let json = serde_json::to_string(&point).unwrap();
        let deser: EquityPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(point, deser);
    }
}
