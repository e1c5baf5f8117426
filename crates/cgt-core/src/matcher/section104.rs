//! Phase 3: finalize a pending disposal against the Section 104 pool
//! once its 30-day Bed-and-Breakfast window has closed (or at end of input).
//! Whatever the pool cannot cover is recorded as a [`ShortDisposal`] rather
//! than failing the calculation.

use super::bed_and_breakfast::PendingDisposal;
use crate::error::CgtError;
use crate::ledger::PositionLedger;
use crate::models::{Disposal, ShortDisposal};
use rust_decimal::Decimal;

/// Match `pending`'s remaining quantity against `ledger`'s pool for its
/// symbol, then fold it into a finished [`Disposal`]. Returns a
/// [`ShortDisposal`] alongside it when the pool could not cover the full
/// remaining quantity.
pub fn finalize(
    mut pending: PendingDisposal,
    ledger: &mut PositionLedger,
) -> Result<(Disposal, Option<ShortDisposal>), CgtError> {
    let available = ledger.quantity(&pending.symbol);
    let matched_qty = pending.quantity_remaining().min(available);

    if matched_qty > Decimal::ZERO {
        let allocated_cost = ledger.remove_from_pool(&pending.symbol, matched_qty)?;
        pending.allocate_section104(matched_qty, allocated_cost);
    }

    let short = if pending.short_quantity() > Decimal::ZERO {
        Some(ShortDisposal {
            date: pending.date,
            symbol: pending.symbol.clone(),
            quantity_short: pending.short_quantity(),
        })
    } else {
        None
    };

    Ok((pending.into_disposal(), short))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn finalizes_fully_against_sufficient_pool() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(200), dec!(22022));
        let pending = PendingDisposal::new(
            date("2023-09-15"),
            "AAPL".to_string(),
            dec!(100),
            dec!(100),
            dec!(14985),
            dec!(14985),
            Vec::new(),
        );
        let (disposal, short) = finalize(pending, &mut ledger).unwrap();
        assert!(short.is_none());
        assert_eq!(disposal.quantity_disposed, dec!(100));
        assert_eq!(disposal.total_cost_gbp, dec!(11011));
        assert_eq!(disposal.gain_or_loss, dec!(3974));
        assert_eq!(ledger.quantity("AAPL"), dec!(100));
    }

    #[test]
    fn records_short_disposal_when_pool_insufficient() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(40), dec!(4000));
        let pending = PendingDisposal::new(
            date("2023-09-15"),
            "AAPL".to_string(),
            dec!(100),
            dec!(100),
            dec!(15000),
            dec!(15000),
            Vec::new(),
        );
        let (disposal, short) = finalize(pending, &mut ledger).unwrap();
        let short = short.expect("expected short disposal");
        assert_eq!(short.quantity_short, dec!(60));
        assert_eq!(disposal.quantity_disposed, dec!(40));
        assert_eq!(ledger.quantity("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn no_pool_at_all_is_fully_short() {
        let mut ledger = PositionLedger::new();
        let pending = PendingDisposal::new(
            date("2023-09-15"),
            "AAPL".to_string(),
            dec!(10),
            dec!(10),
            dec!(1500),
            dec!(1500),
            Vec::new(),
        );
        let (disposal, short) = finalize(pending, &mut ledger).unwrap();
        assert_eq!(disposal.quantity_disposed, Decimal::ZERO);
        assert_eq!(short.unwrap().quantity_short, dec!(10));
    }
}
