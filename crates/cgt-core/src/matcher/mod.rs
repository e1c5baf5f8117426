//! The share-matching engine: Same-Day → Bed-and-Breakfast →
//! Section 104, in that priority order, for every disposal.
//!
//! [`Matcher`] is deliberately FX- and ledger-mutation-agnostic for ordinary
//! trades: [`calculator`](crate::calculator) converts amounts to GBP and
//! drives the per-date flow (`acquire`, `dispose`, then `flush_date` once a
//! date's transactions are all seen), so corporate-action processing can slot
//! its own Section 104 pool mutations in between without the matcher knowing
//! about spin-offs, splits, or ISIN merges.

mod bed_and_breakfast;
mod same_day;
mod section104;

use crate::error::CgtError;
use crate::ledger::PositionLedger;
use crate::models::{CalculationLogEntry, Disposal, Match, MatchRule, ShortDisposal};
use bed_and_breakfast::{PendingDisposal, PendingDisposalQueue};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use same_day::SameDayLedger;

/// Disposals and short-disposal records produced by flushing a date.
#[derive(Debug, Default)]
pub struct MatcherOutput {
    pub disposals: Vec<Disposal>,
    pub short_disposals: Vec<ShortDisposal>,
}

#[derive(Debug, Default)]
pub struct Matcher {
    same_day: SameDayLedger,
    pending: PendingDisposalQueue,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ordinary acquisition (BUY/REINVEST/STOCK_ACTIVITY-as-receipt)
    /// of `quantity` shares at total GBP cost `cost_gbp` (quantity × price,
    /// plus fees). Same-day disposals of this symbol have first claim on it;
    /// only the leftover after `flush_date` is offered to Bed-and-Breakfast.
    pub fn acquire(&mut self, symbol: &str, date: NaiveDate, quantity: Decimal, cost_gbp: Decimal) {
        self.same_day.record_acquisition(symbol, date, quantity, cost_gbp);
    }

    /// Record a disposal. Matches same-day acquisitions immediately; returns
    /// the finished [`Disposal`] if that alone resolved the full quantity, or
    /// `None` if any of it still needs Bed-and-Breakfast/Section 104 (queued
    /// internally, resolved later via `flush_date`).
    pub fn dispose(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        quantity: Decimal,
        gross_proceeds_gbp: Decimal,
        net_proceeds_gbp: Decimal,
    ) -> Option<Disposal> {
        let (matched_qty, matched_cost) = self.same_day.match_disposal(symbol, date, quantity);

        let mut matches = Vec::new();
        if matched_qty > Decimal::ZERO {
            let fraction = matched_qty / quantity;
            let allocated_proceeds = net_proceeds_gbp * fraction;
            matches.push(Match {
                rule: MatchRule::SameDay,
                quantity: matched_qty,
                allocated_cost: matched_cost,
                allocated_proceeds,
                gain_or_loss: allocated_proceeds - matched_cost,
                acquisition_date: Some(date),
            });
        }

        let remaining = quantity - matched_qty;
        if remaining.is_zero() {
            let total_cost_gbp = matches.iter().map(|m| m.allocated_cost).sum();
            let gain_or_loss = matches.iter().map(|m| m.gain_or_loss).sum();
            return Some(Disposal {
                date,
                symbol: symbol.to_string(),
                quantity_disposed: quantity,
                gross_proceeds_gbp,
                total_cost_gbp,
                gain_or_loss,
                matches,
            });
        }

        self.pending.push(PendingDisposal::new(
            date,
            symbol.to_string(),
            quantity,
            remaining,
            gross_proceeds_gbp,
            net_proceeds_gbp,
            matches,
        ));
        None
    }

    /// Flush `date`'s same-day buckets (offering the leftover to pending
    /// Bed-and-Breakfast disposals, then the remainder to the pool) and
    /// finalize any pending disposal whose 30-day window has closed before
    /// `next_date` (or every remaining entry, at end of input, when
    /// `next_date` is `None`). Must be called once per date, after all of
    /// that date's transactions have been processed, before moving to the
    /// next one.
    pub fn flush_date(
        &mut self,
        ledger: &mut PositionLedger,
        date: NaiveDate,
        next_date: Option<NaiveDate>,
        log: &mut Vec<CalculationLogEntry>,
    ) -> Result<MatcherOutput, CgtError> {
        let mut output = MatcherOutput::default();

        for (symbol, quantity, cost) in self.same_day.drain_date(date) {
            let (leftover_qty, leftover_cost, resolved) = self.pending.offer_acquisition(&symbol, date, quantity, cost);
            for entry in resolved {
                log.push(CalculationLogEntry {
                    date: entry.date,
                    text: format!(
                        "disposal of {symbol} on {} fully matched via Bed-and-Breakfast against the acquisition on {date}",
                        entry.date,
                    ),
                });
                output.disposals.push(entry.into_disposal());
            }
            if leftover_qty > Decimal::ZERO {
                ledger.add_to_pool(&symbol, leftover_qty, leftover_cost);
            }
        }

        let expired = match next_date {
            Some(next) => self.pending.take_expired(next),
            None => self.pending.take_all(),
        };
        for entry in expired {
            let entry_date = entry.date;
            let entry_symbol = entry.symbol.clone();
            let (disposal, short) = section104::finalize(entry, ledger)?;
            if let Some(short) = short {
                log.push(CalculationLogEntry {
                    date: entry_date,
                    text: format!(
                        "disposal of {} on {entry_date} exceeded the Section 104 pool by {} shares; recorded as a short disposal",
                        entry_symbol, short.quantity_short
                    ),
                });
                output.short_disposals.push(short);
            }
            output.disposals.push(disposal);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn same_day_acquisition_and_disposal_resolve_immediately() {
        let mut matcher = Matcher::new();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        matcher.acquire("AAPL", date("2023-06-15"), dec!(50), dec!(5005));
        let disposal = matcher.dispose("AAPL", date("2023-06-15"), dec!(50), dec!(7500), dec!(7495));
        assert!(disposal.is_some());
        let output = matcher.flush_date(&mut ledger, date("2023-06-15"), None, &mut log).unwrap();
        assert!(output.disposals.is_empty());
        assert_eq!(ledger.quantity("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn leftover_acquisition_flows_to_pool_when_no_pending_disposal() {
        let mut matcher = Matcher::new();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        matcher.acquire("AAPL", date("2023-05-15"), dec!(100), dec!(10010));
        matcher.flush_date(&mut ledger, date("2023-05-15"), Some(date("2023-06-15")), &mut log).unwrap();
        assert_eq!(ledger.quantity("AAPL"), dec!(100));
        assert_eq!(ledger.holding("AAPL").unwrap().amount, dec!(10010));
    }

    #[test]
    fn unresolved_disposal_defers_to_bed_and_breakfast() {
        let mut matcher = Matcher::new();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();

        let result = matcher.dispose("AAPL", date("2023-06-15"), dec!(50), dec!(7500), dec!(7495));
        assert!(result.is_none());
        let flush = matcher.flush_date(&mut ledger, date("2023-06-15"), Some(date("2023-06-20")), &mut log).unwrap();
        assert!(flush.disposals.is_empty());

        matcher.acquire("AAPL", date("2023-06-20"), dec!(50), dec!(5100));
        let flush = matcher.flush_date(&mut ledger, date("2023-06-20"), None, &mut log).unwrap();
        assert_eq!(flush.disposals.len(), 1);
        assert_eq!(flush.disposals[0].matches[0].rule, MatchRule::BedAndBreakfast);
        assert_eq!(ledger.quantity("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn disposal_finalizes_against_pool_once_window_closes() {
        let mut matcher = Matcher::new();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        ledger.add_to_pool("AAPL", dec!(100), dec!(10000));

        matcher.dispose("AAPL", date("2023-06-15"), dec!(50), dec!(7500), dec!(7495));
        let flush = matcher.flush_date(&mut ledger, date("2023-06-15"), Some(date("2023-07-20")), &mut log).unwrap();
        assert_eq!(flush.disposals.len(), 1);
        assert_eq!(flush.disposals[0].matches[0].rule, MatchRule::Section104);
    }

    #[test]
    fn short_disposal_recorded_when_pool_cannot_cover() {
        let mut matcher = Matcher::new();
        let mut ledger = PositionLedger::new();
        let mut log = Vec::new();
        ledger.add_to_pool("AAPL", dec!(10), dec!(1000));

        matcher.dispose("AAPL", date("2023-06-15"), dec!(50), dec!(7500), dec!(7495));
        let flush = matcher.flush_date(&mut ledger, date("2023-06-15"), None, &mut log).unwrap();
        assert_eq!(flush.short_disposals.len(), 1);
        assert_eq!(flush.short_disposals[0].quantity_short, dec!(40));
    }
}
