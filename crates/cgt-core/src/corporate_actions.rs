//! Corporate-action processing: spin-offs, stock-activity dispatch,
//! splits, ISIN-driven ticker-rename merges, and Excess Reported Income.
//! Everything here mutates the [`PositionLedger`] directly; none of it goes
//! through the matching engine, since these are not trades.

use crate::ledger::PositionLedger;
use crate::models::CalculationLogEntry;
use crate::reference_data::{EriTable, FxRateSource, InitialPriceTable, IsinTable};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

struct BufferedSpinOff {
    cost_gbp: Decimal,
    source_symbol: String,
}

/// Owns the reference-data services and the spin-off cost buffer that spans
/// the gap between a SPIN_OFF row and its destination's STOCK_ACTIVITY
/// receipt.
pub struct CorporateActionProcessor {
    spinoff_buffer: HashMap<String, VecDeque<BufferedSpinOff>>,
    isin_table: IsinTable,
    initial_prices: InitialPriceTable,
    eri_table: EriTable,
}

impl CorporateActionProcessor {
    pub fn new(isin_table: IsinTable, initial_prices: InitialPriceTable, eri_table: EriTable) -> Self {
        Self {
            spinoff_buffer: HashMap::new(),
            isin_table,
            initial_prices,
            eri_table,
        }
    }

    /// SPIN_OFF: move `cost_proportion` of the source
    /// holding's cost basis into a buffer keyed by the destination symbol,
    /// to be picked up by that symbol's STOCK_ACTIVITY receipt row.
    pub fn process_spin_off(
        &mut self,
        ledger: &mut PositionLedger,
        source_symbol: &str,
        dest_symbol: &str,
        cost_proportion: Decimal,
        date: NaiveDate,
        log: &mut Vec<CalculationLogEntry>,
    ) {
        let source_cost = ledger.holding(source_symbol).map(|h| h.amount).unwrap_or(Decimal::ZERO);
        let dest_cost = source_cost * cost_proportion;
        if let Some(warning) = ledger.reduce_cost_basis(source_symbol, dest_cost) {
            log.push(CalculationLogEntry { date, text: warning });
        }
        self.spinoff_buffer
            .entry(dest_symbol.to_string())
            .or_default()
            .push_back(BufferedSpinOff {
                cost_gbp: dest_cost,
                source_symbol: source_symbol.to_string(),
            });
        log.push(CalculationLogEntry {
            date,
            text: format!(
                "spin-off of {dest_symbol} from {source_symbol}: moved {dest_cost} of cost basis, pending receipt"
            ),
        });
    }

    /// STOCK_ACTIVITY: resolve the GBP cost basis to book for
    /// a zero-fee share receipt row. Dispatch order: a buffered spin-off
    /// receipt for this symbol, then a known initial price, then zero with a
    /// warning. The second element of the return value is the source symbol
    /// the cost basis was transferred from, when this receipt resolved a
    /// buffered spin-off.
    pub fn resolve_stock_activity_cost(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        amount: Decimal,
        date: NaiveDate,
        warnings: &mut Vec<String>,
    ) -> (Decimal, Option<String>) {
        if amount != Decimal::ZERO {
            return (amount.abs(), None);
        }
        if let Some(queue) = self.spinoff_buffer.get_mut(symbol)
            && let Some(buffered) = queue.pop_front()
        {
            if queue.is_empty() {
                self.spinoff_buffer.remove(symbol);
            }
            return (buffered.cost_gbp, Some(buffered.source_symbol));
        }
        if let Some(price) = self.initial_prices.price(symbol, date) {
            return (quantity * price, None);
        }
        warnings.push(format!(
            "STOCK_ACTIVITY receipt for {symbol} on {date} has no spin-off buffer or initial price; cost basis recorded as zero"
        ));
        (Decimal::ZERO, None)
    }

    /// SPLIT: scale the pool's quantity, leaving cost basis
    /// untouched.
    pub fn process_split(&self, ledger: &mut PositionLedger, symbol: &str, ratio: Decimal) {
        ledger.scale_quantity(symbol, ratio);
    }

    /// Learn `(isin, symbol)` from any transaction that carries both, merging
    /// the ticker-rename pools together the first time a second symbol
    /// sharing the ISIN shows up with an open position.
    pub fn observe_isin(
        &mut self,
        ledger: &mut PositionLedger,
        symbol: &str,
        isin: &str,
        date: NaiveDate,
        log: &mut Vec<CalculationLogEntry>,
    ) {
        self.isin_table.record(isin, symbol);
        let symbols = self.isin_table.symbols(isin).to_vec();
        if symbols.len() < 2 {
            return;
        }
        for other in symbols.iter().filter(|s| s.as_str() != symbol) {
            if ledger.quantity(other) > Decimal::ZERO {
                ledger.merge_pool(symbol, other);
                log.push(CalculationLogEntry {
                    date,
                    text: format!("merged {other}'s Section 104 pool into {symbol} (shared ISIN {isin})"),
                });
            }
        }
    }

    /// Apply every Excess Reported Income entry whose `period_end_date`
    /// equals `date`: reduce the cost basis of every symbol sharing the
    /// entry's ISIN that currently has an open position, and return the GBP
    /// amount applied per symbol so the caller can add it to the period's
    /// taxable income. A missing FX rate for an entry's currency is recorded
    /// as a warning and that entry is skipped rather than aborting the
    /// calculation.
    pub fn apply_eri_for_date(
        &self,
        ledger: &mut PositionLedger,
        fx: &dyn FxRateSource,
        date: NaiveDate,
        warnings: &mut Vec<String>,
        log: &mut Vec<CalculationLogEntry>,
    ) -> Vec<Decimal> {
        let mut applied = Vec::new();
        for entry in self.eri_table.entries_for_date(date) {
            let symbols = self.isin_table.symbols(&entry.isin);
            if symbols.is_empty() {
                log::debug!("ERI entry for ISIN {} on {date} has no known symbol; skipped", entry.isin);
                warnings.push(format!(
                    "ERI entry for ISIN {} on {date} has no known symbol; skipped",
                    entry.isin
                ));
                continue;
            }
            let rate = match fx.rate(entry.currency, entry.period_end_date) {
                Ok(rate) => rate,
                Err(e) => {
                    warnings.push(format!("ERI entry for ISIN {} on {date}: {e}; skipped", entry.isin));
                    continue;
                }
            };
            for symbol in symbols {
                let Some(holding) = ledger.holding(symbol) else {
                    log::debug!("ERI entry for ISIN {} skips {symbol}: no open position", entry.isin);
                    continue;
                };
                let eri_gbp = holding.quantity * entry.amount_per_share / rate;
                if let Some(warning) = ledger.reduce_cost_basis(symbol, eri_gbp) {
                    log.push(CalculationLogEntry { date, text: warning });
                }
                log.push(CalculationLogEntry {
                    date,
                    text: format!("applied Excess Reported Income of {eri_gbp} to {symbol}'s cost basis, added to taxable income"),
                });
                applied.push(eri_gbp);
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EriEntry;
    use cgt_money::Currency;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn processor() -> CorporateActionProcessor {
        CorporateActionProcessor::new(IsinTable::new(), InitialPriceTable::new(), EriTable::new())
    }

    #[test]
    fn spin_off_moves_cost_basis_to_buffer() {
        let mut proc = processor();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        ledger.add_to_pool("MMM", dec!(100), dec!(10010));
        proc.process_spin_off(&mut ledger, "MMM", "SOLV", dec!(0.25), date("2023-04-01"), &mut log);
        assert_eq!(ledger.holding("MMM").unwrap().amount, dec!(7507.5));

        let mut warnings = Vec::new();
        let (cost, spinoff_source) = proc.resolve_stock_activity_cost("SOLV", dec!(10), Decimal::ZERO, date("2023-04-01"), &mut warnings);
        assert_eq!(spinoff_source.as_deref(), Some("MMM"));
        assert_eq!(cost, dec!(2502.5));
        assert!(warnings.is_empty());
    }

    #[test]
    fn stock_activity_without_buffer_or_price_warns_and_zeroes() {
        let mut proc = processor();
        let mut warnings = Vec::new();
        let (cost, spinoff_source) = proc.resolve_stock_activity_cost("RSU", dec!(10), Decimal::ZERO, date("2023-04-01"), &mut warnings);
        assert_eq!(cost, Decimal::ZERO);
        assert!(spinoff_source.is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn stock_activity_uses_initial_price_when_available() {
        let mut proc = CorporateActionProcessor::new(
            IsinTable::new(),
            InitialPriceTable::from_entries(vec![("RSU".to_string(), date("2023-04-01"), dec!(50))]),
            EriTable::new(),
        );
        let mut warnings = Vec::new();
        let (cost, _) = proc.resolve_stock_activity_cost("RSU", dec!(10), Decimal::ZERO, date("2023-04-01"), &mut warnings);
        assert_eq!(cost, dec!(500));
        assert!(warnings.is_empty());
    }

    #[test]
    fn isin_merge_combines_pools_on_second_symbol_observation() {
        let mut proc = processor();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        ledger.add_to_pool("IWDA", dec!(50), dec!(5000));
        ledger.add_to_pool("SWDA", dec!(30), dec!(3300));
        proc.observe_isin(&mut ledger, "IWDA", "IE00B4L5Y983", date("2023-01-01"), &mut log);
        proc.observe_isin(&mut ledger, "SWDA", "IE00B4L5Y983", date("2023-06-01"), &mut log);
        assert_eq!(ledger.quantity("IWDA"), dec!(80));
        assert_eq!(ledger.quantity("SWDA"), Decimal::ZERO);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn eri_reduces_cost_basis_of_held_symbol() {
        let mut proc = CorporateActionProcessor::new(
            IsinTable::new(),
            InitialPriceTable::new(),
            EriTable::from_entries(vec![EriEntry {
                isin: "IE1".to_string(),
                period_end_date: date("2023-12-31"),
                currency: Currency::GBP,
                amount_per_share: dec!(0.05),
            }]),
        );
        proc.observe_isin(&mut PositionLedger::new(), "SWDA", "IE1", date("2023-01-01"), &mut Vec::new());
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("SWDA", dec!(100), dec!(10000));
        let fx = cgt_money::FxCache::new();
        let mut warnings = Vec::new();
        let mut log = Vec::new();
        let applied = proc.apply_eri_for_date(&mut ledger, &fx, date("2023-12-31"), &mut warnings, &mut log);
        assert_eq!(applied, vec![dec!(5)]);
        assert_eq!(ledger.holding("SWDA").unwrap().amount, dec!(9995));
    }

    #[test]
    fn eri_converts_foreign_amount_per_share_to_gbp_by_dividing_the_rate() {
        let mut proc = CorporateActionProcessor::new(
            IsinTable::new(),
            InitialPriceTable::new(),
            EriTable::from_entries(vec![EriEntry {
                isin: "IE2".to_string(),
                period_end_date: date("2023-12-31"),
                currency: Currency::USD,
                amount_per_share: dec!(0.10),
            }]),
        );
        proc.observe_isin(&mut PositionLedger::new(), "VWRA", "IE2", date("2023-01-01"), &mut Vec::new());
        let mut ledger = PositionLedger::new();
        ledger.add_to_pool("VWRA", dec!(100), dec!(10000));
        let mut fx = cgt_money::FxCache::new();
        fx.insert(cgt_money::RateEntry {
            key: cgt_money::RateKey::new(Currency::USD, 2023, 12),
            rate_per_gbp: dec!(1.25),
            source: cgt_money::RateSource::Bundled { period: None },
        });
        let mut warnings = Vec::new();
        let mut log = Vec::new();
        let applied = proc.apply_eri_for_date(&mut ledger, &fx, date("2023-12-31"), &mut warnings, &mut log);
        // 100 shares * $0.10 / 1.25 USD-per-GBP = £8 reduction
        assert_eq!(applied, vec![dec!(8)]);
        assert_eq!(ledger.holding("VWRA").unwrap().amount, dec!(9992));
    }
}
