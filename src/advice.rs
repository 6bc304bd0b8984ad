//! Stocking advice rules

use std::fmt;

/// Products unsold for longer than this many days are cleared.
pub const STALE_AFTER_DAYS: i64 = 60;
/// Invoice count above which a product counts as in demand.
pub const HIGH_FREQUENCY: usize = 20;
/// Price above which a product counts as premium.
pub const PREMIUM_PRICE: f64 = 20.0;

/// Inventory action for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advice {
    Clear,
    Push,
    Regular,
}

impl Advice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Advice::Clear => "Clear",
            Advice::Push => "Push",
            Advice::Regular => "Regular",
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the advice rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockSignals {
    pub recency_days: i64,
    pub frequency: usize,
    pub avg_price: f64,
}

struct Rule {
    advice: Advice,
    applies: fn(&StockSignals) -> bool,
}

fn is_stale(s: &StockSignals) -> bool {
    s.recency_days > STALE_AFTER_DAYS
}

fn is_premium_in_demand(s: &StockSignals) -> bool {
    s.frequency > HIGH_FREQUENCY && s.avg_price > PREMIUM_PRICE
}

/// Evaluated top to bottom, first match wins.
const RULES: [Rule; 2] = [
    Rule {
        advice: Advice::Clear,
        applies: is_stale,
    },
    Rule {
        advice: Advice::Push,
        applies: is_premium_in_demand,
    },
];

const FALLBACK: Advice = Advice::Regular;

/// Map recency, frequency and price to a stocking action.
pub fn advise(signals: &StockSignals) -> Advice {
    RULES
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map_or(FALLBACK, |rule| rule.advice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(recency_days: i64, frequency: usize, avg_price: f64) -> StockSignals {
        StockSignals {
            recency_days,
            frequency,
            avg_price,
        }
    }

    #[test]
    fn test_reference_cases() {
        assert_eq!(advise(&signals(70, 5, 50.0)), Advice::Clear);
        assert_eq!(advise(&signals(10, 25, 25.0)), Advice::Push);
        assert_eq!(advise(&signals(10, 5, 5.0)), Advice::Regular);
    }

    #[test]
    fn test_recency_dominates() {
        assert_eq!(advise(&signals(61, 100, 100.0)), Advice::Clear);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        assert_eq!(advise(&signals(60, 5, 5.0)), Advice::Regular);
        assert_eq!(advise(&signals(10, 20, 50.0)), Advice::Regular);
        assert_eq!(advise(&signals(10, 50, 20.0)), Advice::Regular);
        assert_eq!(advise(&signals(10, 21, 20.01)), Advice::Push);
    }

    #[test]
    fn test_display() {
        assert_eq!(Advice::Push.to_string(), "Push");
        assert_eq!(format!("{}", Advice::Clear), "Clear");
    }

    proptest! {
        #[test]
        fn prop_stale_products_are_always_cleared(
            recency in 61i64..2000,
            frequency in 0usize..500,
            price in 0.0f64..1000.0,
        ) {
            prop_assert_eq!(advise(&signals(recency, frequency, price)), Advice::Clear);
        }

        #[test]
        fn prop_advice_is_deterministic(
            recency in 0i64..1000,
            frequency in 0usize..100,
            price in 0.0f64..100.0,
        ) {
            let s = signals(recency, frequency, price);
            prop_assert_eq!(advise(&s), advise(&s));
        }
    }
}
