//! Phase 1: same-day acquisitions for a symbol are aggregated into a
//! single weighted lot before any disposal on that date is matched against
//! them. Canonical ordering guarantees every same-day acquisition has
//! already been folded into the bucket by the time a same-day disposal is
//! processed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    quantity: Decimal,
    cost: Decimal,
}

impl Bucket {
    fn consume(&mut self, quantity: Decimal) -> Decimal {
        let cost = self.cost * quantity / self.quantity;
        self.quantity -= quantity;
        self.cost -= cost;
        cost
    }
}

/// Same-day acquisition buckets, keyed by `(symbol, date)`. A bucket is
/// populated as acquisitions for that day are seen and drained as disposals
/// on the same day consume it; leftover quantity at day's end belongs to the
/// Bed-and-Breakfast/Section 104 phases (Phase 2/3).
#[derive(Debug, Default)]
pub struct SameDayLedger {
    buckets: HashMap<(String, NaiveDate), Bucket>,
}

impl SameDayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_acquisition(&mut self, symbol: &str, date: NaiveDate, quantity: Decimal, cost: Decimal) {
        let bucket = self.buckets.entry((symbol.to_string(), date)).or_default();
        bucket.quantity += quantity;
        bucket.cost += cost;
    }

    /// Match as much of `quantity_needed` against the day's bucket as it can
    /// supply. Returns `(matched_quantity, matched_cost)`; `matched_quantity`
    /// is zero when no bucket exists for `(symbol, date)`.
    pub fn match_disposal(&mut self, symbol: &str, date: NaiveDate, quantity_needed: Decimal) -> (Decimal, Decimal) {
        let Some(bucket) = self.buckets.get_mut(&(symbol.to_string(), date)) else {
            return (Decimal::ZERO, Decimal::ZERO);
        };
        if bucket.quantity.is_zero() || quantity_needed.is_zero() {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        let matched_qty = quantity_needed.min(bucket.quantity);
        let matched_cost = bucket.consume(matched_qty);
        (matched_qty, matched_cost)
    }

    /// Drain every bucket for `date`, returning `(symbol, quantity, cost)`
    /// triples for whatever was never claimed by a same-day disposal. Called
    /// once a date's transactions have all been processed, before the
    /// leftover is offered to Bed-and-Breakfast / Section 104.
    pub fn drain_date(&mut self, date: NaiveDate) -> Vec<(String, Decimal, Decimal)> {
        let keys: Vec<(String, NaiveDate)> = self
            .buckets
            .keys()
            .filter(|(_, d)| *d == date)
            .cloned()
            .collect();
        let mut leftovers = Vec::new();
        for key in keys {
            if let Some(bucket) = self.buckets.remove(&key)
                && !bucket.quantity.is_zero()
            {
                leftovers.push((key.0, bucket.quantity, bucket.cost));
            }
        }
        leftovers
    }
}
