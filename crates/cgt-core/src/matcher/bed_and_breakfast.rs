//! Phase 2: the 30-day Bed-and-Breakfast rule. A disposal left with
//! unmatched quantity after Phase 1 is parked in an explicit
//! [`PendingDisposalQueue`] rather than resolved by scanning forward through
//! the transaction list: every later acquisition of the same symbol offers
//! its shares to the oldest outstanding disposal first, and
//! a disposal is only handed to Section 104 once its 30-day window has
//! closed with quantity still unmatched.

use crate::models::{Disposal, Match, MatchRule};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

pub const BNB_WINDOW_DAYS: i64 = 30;

/// A disposal still waiting for Phase 2/3 resolution.
#[derive(Debug, Clone)]
pub struct PendingDisposal {
    seq: u64,
    pub date: NaiveDate,
    pub symbol: String,
    /// Original disposal quantity; never mutated, used only to prorate
    /// proceeds across phases.
    quantity: Decimal,
    quantity_remaining: Decimal,
    gross_proceeds_gbp: Decimal,
    net_proceeds_gbp: Decimal,
    matches: Vec<Match>,
}

impl PendingDisposal {
    pub fn new(
        date: NaiveDate,
        symbol: String,
        quantity: Decimal,
        quantity_remaining: Decimal,
        gross_proceeds_gbp: Decimal,
        net_proceeds_gbp: Decimal,
        matches: Vec<Match>,
    ) -> Self {
        Self {
            seq: 0,
            date,
            symbol,
            quantity,
            quantity_remaining,
            gross_proceeds_gbp,
            net_proceeds_gbp,
            matches,
        }
    }

    /// Last date on which an acquisition can still satisfy this disposal
    /// under the 30-day rule.
    pub fn deadline(&self) -> NaiveDate {
        self.date + Duration::days(BNB_WINDOW_DAYS)
    }

    pub fn quantity_remaining(&self) -> Decimal {
        self.quantity_remaining
    }

    fn is_resolved(&self) -> bool {
        self.quantity_remaining.is_zero()
    }

    fn allocate(&mut self, rule: MatchRule, quantity: Decimal, allocated_cost: Decimal, acquisition_date: Option<NaiveDate>) {
        let fraction = quantity / self.quantity;
        let allocated_proceeds = self.net_proceeds_gbp * fraction;
        self.matches.push(Match {
            rule,
            quantity,
            allocated_cost,
            allocated_proceeds,
            gain_or_loss: allocated_proceeds - allocated_cost,
            acquisition_date,
        });
        self.quantity_remaining -= quantity;
    }

    /// Match `quantity` of this disposal against the Section 104 pool at
    /// `allocated_cost`, marking whatever is still unresolved afterwards as a
    /// short disposal (Phase 3).
    pub fn allocate_section104(&mut self, quantity: Decimal, allocated_cost: Decimal) {
        self.allocate(MatchRule::Section104, quantity, allocated_cost, None);
    }

    pub fn short_quantity(&self) -> Decimal {
        self.quantity_remaining
    }

    /// Consume this entry into its final [`Disposal`] record. Only the
    /// matched quantity (`quantity - quantity_remaining`) counts as disposed;
    /// any leftover is a short sale the caller reports separately.
    pub fn into_disposal(self) -> Disposal {
        let quantity_disposed = self.quantity - self.quantity_remaining;
        let matched_fraction = if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            quantity_disposed / self.quantity
        };
        let total_cost_gbp = self.matches.iter().map(|m| m.allocated_cost).sum();
        let gain_or_loss = self.matches.iter().map(|m| m.gain_or_loss).sum();
        Disposal {
            date: self.date,
            symbol: self.symbol,
            quantity_disposed,
            gross_proceeds_gbp: self.gross_proceeds_gbp * matched_fraction,
            total_cost_gbp,
            gain_or_loss,
            matches: self.matches,
        }
    }
}

/// FIFO (oldest-disposal-first) queue of disposals awaiting Bed-and-Breakfast
/// or Section 104 resolution.
#[derive(Debug, Default)]
pub struct PendingDisposalQueue {
    entries: Vec<PendingDisposal>,
    next_seq: u64,
}

impl PendingDisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a disposal for later resolution. Returns it back immediately,
    /// unresolved, if it was already fully matched in Phase 1 - callers
    /// should check [`PendingDisposal::quantity_remaining`] and only push
    /// entries that still need one.
    pub fn push(&mut self, mut entry: PendingDisposal) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(entry);
    }

    /// Offer newly-acquired shares to pending disposals of `symbol`, oldest
    /// disposal first, consuming as much of `(quantity_available,
    /// cost_available)` as eligible entries need. Returns the leftover
    /// `(quantity, cost)` the caller should add to the Section 104 pool, and
    /// any disposals that became fully resolved (ready to finalize without a
    /// Section 104 match).
    pub fn offer_acquisition(
        &mut self,
        symbol: &str,
        acquisition_date: NaiveDate,
        quantity_available: Decimal,
        cost_available: Decimal,
    ) -> (Decimal, Decimal, Vec<PendingDisposal>) {
        let mut remaining_qty = quantity_available;
        let mut remaining_cost = cost_available;

        let mut candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.symbol == symbol && acquisition_date > e.date && acquisition_date <= e.deadline())
            .map(|(idx, _)| idx)
            .collect();
        candidates.sort_by_key(|&idx| (self.entries[idx].date, self.entries[idx].seq));

        let mut resolved_indices = Vec::new();
        for idx in candidates {
            if remaining_qty.is_zero() {
                break;
            }
            let entry = &mut self.entries[idx];
            let take_qty = remaining_qty.min(entry.quantity_remaining);
            if take_qty.is_zero() {
                continue;
            }
            let take_cost = remaining_cost * take_qty / remaining_qty;
            entry.allocate(MatchRule::BedAndBreakfast, take_qty, take_cost, Some(acquisition_date));
            remaining_qty -= take_qty;
            remaining_cost -= take_cost;
            if entry.is_resolved() {
                resolved_indices.push(idx);
            }
        }

        resolved_indices.sort_unstable();
        let mut resolved = Vec::new();
        for idx in resolved_indices.into_iter().rev() {
            resolved.push(self.entries.remove(idx));
        }
        resolved.reverse();

        (remaining_qty, remaining_cost, resolved)
    }

    /// Remove and return every entry whose 30-day window has closed strictly
    /// before `current_date`, ready for Section 104 finalization.
    pub fn take_expired(&mut self, current_date: NaiveDate) -> Vec<PendingDisposal> {
        let (expired, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.deadline() < current_date);
        self.entries = remaining;
        expired
    }

    /// Remove and return every remaining entry, for end-of-input finalization.
    pub fn take_all(&mut self) -> Vec<PendingDisposal> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
