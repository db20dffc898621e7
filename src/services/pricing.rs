use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::PricingConfig;

/// Monetary breakdown of an order, computed once from the frozen line
/// prices at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn compute(subtotal: Decimal, pricing: &PricingConfig) -> Self {
        let tax = (subtotal * pricing.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let shipping = if subtotal > pricing.free_shipping_threshold {
            Decimal::ZERO
        } else {
            pricing.flat_shipping_fee
        };
        let discount = Decimal::ZERO;

        Self {
            subtotal,
            tax,
            shipping,
            discount,
            total: subtotal + tax + shipping - discount,
        }
    }
}

/// Issues `ORD-<epoch-millis>-<seq>` numbers.
///
/// Numbers are strictly increasing within one process: the millisecond part
/// never goes backwards, and when the three-digit sequence runs out the
/// millisecond part is pushed forward by one.
#[derive(Debug)]
pub struct OrderNumberGenerator {
    state: Mutex<GeneratorState>,
}

#[derive(Debug)]
struct GeneratorState {
    last_millis: i64,
    seq: u16,
}

const MAX_SEQ: u16 = 999;

impl Default for OrderNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                last_millis: 0,
                seq: 0,
            }),
        }
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_millis: i64) -> String {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if now_millis > state.last_millis {
            state.last_millis = now_millis;
            state.seq = 0;
        } else if state.seq >= MAX_SEQ {
            state.last_millis += 1;
            state.seq = 0;
        } else {
            state.seq += 1;
        }

        format!("ORD-{}-{:03}", state.last_millis, state.seq)
    }
}

static ORDER_NUMBER_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^ORD-\d+-\d{3}$").ok());

pub fn is_valid_order_number(value: &str) -> bool {
    ORDER_NUMBER_RE
        .as_ref()
        .map_or(false, |re| re.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn checkout_scenario_totals() {
        // 2 x 30.00 + 1 x 15.00
        let totals = OrderTotals::compute(dec!(75.00), &PricingConfig::default());
        assert_eq!(totals.subtotal, dec!(75.00));
        assert_eq!(totals.tax, dec!(7.50));
        assert_eq!(totals.shipping, dec!(10));
        assert_eq!(totals.discount, dec!(0));
        assert_eq!(totals.total, dec!(92.50));
    }

    #[test]
    fn shipping_is_free_strictly_above_threshold() {
        let pricing = PricingConfig::default();
        assert_eq!(OrderTotals::compute(dec!(100.00), &pricing).shipping, dec!(10));
        assert_eq!(OrderTotals::compute(dec!(100.01), &pricing).shipping, dec!(0));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        let totals = OrderTotals::compute(dec!(0.05), &PricingConfig::default());
        assert_eq!(totals.tax, dec!(0.01));
        let totals = OrderTotals::compute(dec!(19.99), &PricingConfig::default());
        assert_eq!(totals.tax, dec!(2.00));
    }

    #[test]
    fn rates_come_from_config() {
        let pricing = PricingConfig {
            tax_rate: dec!(0.20),
            free_shipping_threshold: dec!(50),
            flat_shipping_fee: dec!(4.99),
        };
        let totals = OrderTotals::compute(dec!(40), &pricing);
        assert_eq!(totals.tax, dec!(8.00));
        assert_eq!(totals.shipping, dec!(4.99));
        assert_eq!(totals.total, dec!(52.99));
    }

    #[test]
    fn order_numbers_are_unique_and_well_formed() {
        let generator = OrderNumberGenerator::new();
        let numbers: Vec<String> = (0..2_500).map(|_| generator.next()).collect();
        let distinct: HashSet<&String> = numbers.iter().collect();
        assert_eq!(distinct.len(), numbers.len());
        assert!(numbers.iter().all(|n| is_valid_order_number(n)));
    }

    #[test]
    fn sequence_overflow_advances_millis() {
        let generator = OrderNumberGenerator::new();
        let first = generator.next_at(1_700_000_000_000);
        assert_eq!(first, "ORD-1700000000000-000");

        let mut last = first;
        for _ in 0..MAX_SEQ {
            last = generator.next_at(1_700_000_000_000);
        }
        assert_eq!(last, "ORD-1700000000000-999");
        assert_eq!(
            generator.next_at(1_700_000_000_000),
            "ORD-1700000000001-000"
        );
        // Clock catching up to the bumped value must not reuse it.
        assert_eq!(
            generator.next_at(1_700_000_000_001),
            "ORD-1700000000001-001"
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(is_valid_order_number("ORD-1700000000000-042"));
        assert!(!is_valid_order_number("ORD-1700000000000-42"));
        assert!(!is_valid_order_number("ord-1-001"));
        assert!(!is_valid_order_number("ORD--001"));
    }
}
