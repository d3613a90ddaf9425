//! Steam Community Market fee schedule.
//!
//! Steam deducts a stepped absolute fee from the gross sale price. The step
//! table is open-ended: the price intervals grow by alternating +0.12/+0.11
//! increments and the matching fees by alternating +0.01/+0.02, extended on
//! demand until the requested gross is covered. All arithmetic runs on
//! `Decimal` so identical inputs always produce identical cents.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

const BASE_INTERVALS: [Decimal; 4] = [dec!(0.02), dec!(0.21), dec!(0.32), dec!(0.43)];
const BASE_FEES: [Decimal; 6] = [
    dec!(0.02),
    dec!(0.03),
    dec!(0.04),
    dec!(0.05),
    dec!(0.07),
    dec!(0.09),
];

/// Net amount the seller receives for a gross Steam sale price.
pub fn net_price(gross: Decimal) -> Decimal {
    if gross <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let mut intervals: Vec<Decimal> = BASE_INTERVALS.to_vec();
    while gross > intervals[intervals.len() - 1] {
        let last = intervals[intervals.len() - 1];
        let step = if intervals.len() % 2 == 0 {
            dec!(0.12)
        } else {
            dec!(0.11)
        };
        intervals.push(last + step);
    }

    let mut fees: Vec<Decimal> = BASE_FEES.to_vec();
    while intervals.len() > fees.len() {
        let last = fees[fees.len() - 1];
        let step = if fees.len() % 2 == 0 {
            dec!(0.01)
        } else {
            dec!(0.02)
        };
        fees.push(last + step);
    }

    let idx = intervals
        .iter()
        .position(|iv| gross <= *iv)
        .unwrap_or(intervals.len() - 1);

    let net = (gross - fees[idx]).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    net.max(Decimal::ZERO)
}

/// Absolute and relative profit of buying at `buy` elsewhere and selling at
/// `gross` on Steam.
pub fn profit(gross: Decimal, buy: Decimal) -> (Decimal, Decimal) {
    let profit_abs = net_price(gross) - buy;
    let profit_ratio = if buy > Decimal::ZERO {
        profit_abs / buy
    } else {
        Decimal::ZERO
    };
    (profit_abs, profit_ratio)
}

/// `f64` bridge for callers that keep listing prices as floats.
pub fn net_price_f64(gross: f64) -> f64 {
    Decimal::from_f64_retain(gross)
        .map(net_price)
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

pub fn profit_f64(gross: f64, buy: f64) -> (f64, f64) {
    match (Decimal::from_f64_retain(gross), Decimal::from_f64_retain(buy)) {
        (Some(g), Some(b)) => {
            let (abs, ratio) = profit(g, b);
            (abs.to_f64().unwrap_or(0.0), ratio.to_f64().unwrap_or(0.0))
        }
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(raw: &str) -> Decimal {
        net_price(raw.parse().unwrap())
    }

    #[test]
    fn canonical_samples() {
        // 0.15 falls in the second base interval (<= 0.21), fee 0.03.
        assert_eq!(net("0.15"), dec!(0.12));
        // 1.00 needs the table extended out to 1.01; fee there is 0.13.
        assert_eq!(net("1.00"), dec!(0.87));
        assert_eq!(net("0.32"), dec!(0.28));
        assert_eq!(net("0.50"), dec!(0.43));
    }

    #[test]
    fn table_extends_for_large_grosses() {
        // 2.00 forces the intervals out to 2.04 and the fee there is 0.27.
        assert_eq!(net("2.00"), dec!(1.73));
        assert_eq!(net("10.00"), net("10.00"));
        assert!(net("100.00") > net("10.00"));
    }

    #[test]
    fn tiny_and_zero_grosses_clamp_to_zero() {
        assert_eq!(net("0.00"), Decimal::ZERO);
        assert_eq!(net("0.01"), Decimal::ZERO); // fee 0.02 exceeds gross
        assert_eq!(net_price(dec!(-3)), Decimal::ZERO);
    }

    #[test]
    fn deterministic_across_calls() {
        for _ in 0..3 {
            assert_eq!(net("123.45"), net("123.45"));
        }
    }

    #[test]
    fn near_monotone_over_dense_grid() {
        // The stepped table dips by at most one cent where the fee jumps by
        // 0.02 while the gross moved only 0.01; it must never dip more.
        let mut prev = Decimal::ZERO;
        let mut gross = dec!(0.01);
        while gross < dec!(30.00) {
            let n = net_price(gross);
            assert!(
                n >= prev - dec!(0.01),
                "net dropped too far at gross={gross}: {prev} -> {n}"
            );
            prev = n;
            gross += dec!(0.01);
        }
    }

    #[test]
    fn monotone_within_base_brackets() {
        assert!(net("0.25") <= net("0.30"));
        assert!(net("0.10") <= net("0.18"));
        assert!(net("5.00") <= net("5.05"));
    }

    #[test]
    fn profit_sample() {
        let (abs, ratio) = profit(dec!(1.00), dec!(0.50));
        assert_eq!(abs, dec!(0.37));
        assert_eq!(ratio, dec!(0.74));
    }

    #[test]
    fn profit_with_zero_buy_price_is_flat() {
        let (_, ratio) = profit(dec!(1.00), Decimal::ZERO);
        assert_eq!(ratio, Decimal::ZERO);
    }

    #[test]
    fn f64_bridge_matches_decimal_path() {
        assert_eq!(net_price_f64(1.00), 0.87);
        assert_eq!(net_price_f64(0.15), 0.12);
    }
}
