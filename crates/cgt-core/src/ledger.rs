//! Position ledger: per-symbol Section 104 pool state. Owned
//! exclusively by the matching engine and the corporate-action processor;
//! nothing else mutates it.

use crate::error::CgtError;
use crate::models::Holding;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PositionLedger {
    pools: HashMap<String, Holding>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Current pool state for a symbol, if any shares are held.
    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.pools.get(symbol)
    }

    /// Quantity currently held, zero if the symbol has no pool entry.
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.pools
            .get(symbol)
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Increment both quantity and cost basis. Re-derives WAC lazily (it is
    /// never stored, only computed from `amount / quantity` on demand).
    pub fn add_to_pool(&mut self, symbol: &str, quantity: Decimal, cost: Decimal) {
        let entry = self.pools.entry(symbol.to_string()).or_insert_with(|| Holding {
            symbol: symbol.to_string(),
            quantity: Decimal::ZERO,
            amount: Decimal::ZERO,
        });
        entry.quantity += quantity;
        entry.amount += cost;
    }

    /// Remove `quantity` shares at the pool's current WAC, returning the
    /// proportional cost removed. The amount subtracted is computed as
    /// `amount * quantity / pool.quantity` directly (not `quantity * WAC`) to
    /// avoid rounding the per-share cost before multiplying back out.
    ///
    /// Returns `InvariantViolation` if `quantity` exceeds the pool (callers
    /// performing a Section 104 match must cap at `self.quantity(symbol)`
    /// themselves and record the excess as a short disposal; this method
    /// never silently allows going negative).
    pub fn remove_from_pool(&mut self, symbol: &str, quantity: Decimal) -> Result<Decimal, CgtError> {
        if quantity <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let Some(holding) = self.pools.get_mut(symbol) else {
            return Err(CgtError::InvariantViolation(format!(
                "removed {quantity} shares of {symbol} from an empty pool"
            )));
        };
        if quantity > holding.quantity {
            return Err(CgtError::InvariantViolation(format!(
                "removed {quantity} shares of {symbol} but pool only holds {}",
                holding.quantity
            )));
        }

        let removed_cost = holding.amount * quantity / holding.quantity;
        holding.quantity -= quantity;
        holding.amount -= removed_cost;
        self.zero_normalize(symbol);
        Ok(removed_cost)
    }

    /// If the pool's quantity has settled to zero, also zero its amount and
    /// drop the entry entirely (`quantity == 0 ⇔ pool entry absent`).
    pub fn zero_normalize(&mut self, symbol: &str) {
        if let Some(holding) = self.pools.get(symbol)
            && holding.quantity.is_zero()
        {
            self.pools.remove(symbol);
        }
    }

    /// Reduce a pool's cost basis by `delta_gbp` (ERI, spin-off source-side
    /// reduction). Clamps at zero; returns `Some(warning)` when the
    /// requested reduction exceeded the available basis.
    pub fn reduce_cost_basis(&mut self, symbol: &str, delta_gbp: Decimal) -> Option<String> {
        let Some(holding) = self.pools.get_mut(symbol) else {
            log::warn!("cannot reduce cost basis of {symbol} by {delta_gbp}: no open position");
            return Some(format!(
                "cannot reduce cost basis of {symbol} by {delta_gbp}: no open position"
            ));
        };
        if delta_gbp > holding.amount {
            let warning = Some(format!(
                "cost basis reduction for {symbol} of {delta_gbp} exceeds available basis {}; clamped to zero",
                holding.amount
            ));
            log::warn!(
                "cost basis reduction for {symbol} of {delta_gbp} exceeds available basis {}; clamped to zero",
                holding.amount
            );
            holding.amount = Decimal::ZERO;
            warning
        } else {
            holding.amount -= delta_gbp;
            None
        }
    }

    /// Increase a pool's cost basis directly (spin-off destination receipt
    /// when the destination already has an open position, or a buffered
    /// cost applied after the fact).
    pub fn increase_cost_basis(&mut self, symbol: &str, delta_gbp: Decimal) {
        if let Some(holding) = self.pools.get_mut(symbol) {
            holding.amount += delta_gbp;
        }
    }

    /// Fold `other`'s pool into `symbol`'s pool (ISIN merge / ticker rename),
    /// summing `(quantity, amount)`. `other` is left empty.
    pub fn merge_pool(&mut self, symbol: &str, other: &str) {
        if symbol == other {
            return;
        }
        if let Some(source) = self.pools.remove(other) {
            let entry = self.pools.entry(symbol.to_string()).or_insert_with(|| Holding {
                symbol: symbol.to_string(),
                quantity: Decimal::ZERO,
                amount: Decimal::ZERO,
            });
            entry.quantity += source.quantity;
            entry.amount += source.amount;
        }
    }

    /// Apply a stock split/consolidation: quantity scales by `ratio`, cost
    /// basis is untouched (HMRC treats a split as a reclassification of the
    /// same holding, not a disposal).
    pub fn scale_quantity(&mut self, symbol: &str, ratio: Decimal) {
        if let Some(holding) = self.pools.get_mut(symbol) {
            holding.quantity *= ratio;
        }
    }

    /// All non-empty pools, sorted by symbol for deterministic report output.
    pub fn into_holdings(self) -> Vec<Holding> {
        let mut holdings: Vec<Holding> = self.pools.into_values().collect();
        holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        holdings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_then_remove_full_quantity_zero_normalizes() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(100), dec!(10000));
        let cost = ledger.remove_from_pool("AAPL", dec!(100)).unwrap();
        assert_eq!(cost, dec!(10000));
        assert!(ledger.holding("AAPL").is_none());
    }

    #[test]
    fn remove_partial_keeps_proportional_remainder() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(100), dec!(11011));
        let cost = ledger.remove_from_pool("AAPL", dec!(100)).unwrap();
        assert_eq!(cost, dec!(11011));

        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(200), dec!(11011));
        let cost = ledger.remove_from_pool("AAPL", dec!(100)).unwrap();
        assert_eq!(cost, dec!(5505.5));
        assert_eq!(ledger.holding("AAPL").unwrap().quantity, dec!(100));
        assert_eq!(ledger.holding("AAPL").unwrap().amount, dec!(5505.5));
    }

    #[test]
    fn remove_more_than_held_is_invariant_violation() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(10), dec!(1000));
        let result = ledger.remove_from_pool("AAPL", dec!(20));
        assert!(matches!(result, Err(CgtError::InvariantViolation(_))));
    }

    #[test]
    fn reduce_cost_basis_clamps_at_zero_with_warning() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("AAPL", dec!(10), dec!(100));
        let warning = ledger.reduce_cost_basis("AAPL", dec!(500));
        assert!(warning.is_some());
        assert_eq!(ledger.holding("AAPL").unwrap().amount, Decimal::ZERO);
    }

    #[test]
    fn merge_pool_sums_quantity_and_amount() {
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("OLD", dec!(50), dec!(5000));
        ledger.add_to_pool("NEW", dec!(10), dec!(1200));
        ledger.merge_pool("NEW", "OLD");
        assert!(ledger.holding("OLD").is_none());
        let merged = ledger.holding("NEW").unwrap();
        assert_eq!(merged.quantity, dec!(60));
        assert_eq!(merged.amount, dec!(6200));
    }
}
