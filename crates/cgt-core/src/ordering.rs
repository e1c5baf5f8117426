//! Canonical transaction-store ordering: a stable, deterministic total
//! order over the ingested transaction stream so the matching engine always
//! sees buys before sells on a given day, and corporate actions/dividends
//! after both, with spin-offs carved out to precede same-day destination
//! acquisitions.

use crate::models::{CorporateActionOp, Operation, RawTransaction};
use chrono::NaiveDate;

/// A validated transaction paired with its dispatch target and original
/// ingest position, ready for canonical sorting.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub raw: RawTransaction,
    pub operation: Operation,
    pub ingest_index: usize,
}

impl TransactionRecord {
    pub fn date(&self) -> NaiveDate {
        self.raw.date
    }
}

/// Within-day rank. Lower sorts earlier. Spin-offs precede every acquisition
/// so a same-day destination receipt always observes the buffered cost.
fn rank(operation: &Operation) -> u8 {
    match operation {
        Operation::CorporateAction(CorporateActionOp::SpinOff { .. }) => 0,
        Operation::Acquisition(_) => 1,
        Operation::CorporateAction(CorporateActionOp::StockActivity { .. }) => 1,
        Operation::CorporateAction(CorporateActionOp::Transfer { .. }) => 1,
        Operation::Disposal(_) => 2,
        Operation::Dividend(_) => 3,
        Operation::Interest(_) => 3,
        Operation::Cash(_) => 3,
        Operation::CorporateAction(CorporateActionOp::Split { .. }) => 3,
    }
}

/// Sort transaction records into canonical order: date ascending, then rank,
/// then original ingest order (stable). Permuting ingest order among
/// same-date-same-rank records must leave gains unchanged; `ingest_index` is
/// included in the sort key only to make the order itself deterministic, not
/// because later code depends on it for correctness.
pub fn canonical_sort(mut records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    records.sort_by(|left, right| {
        left.date()
            .cmp(&right.date())
            .then_with(|| rank(&left.operation).cmp(&rank(&right.operation)))
            .then_with(|| left.ingest_index.cmp(&right.ingest_index))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn raw(date: &str, action: Action, symbol: &str) -> RawTransaction {
        RawTransaction {
            date: date.parse().unwrap(),
            action,
            symbol: Some(symbol.to_string()),
            description: if action == Action::SpinOff {
                "SOLV:0.25".to_string()
            } else {
                String::new()
            },
            quantity: Some(dec!(1)),
            price: Some(dec!(1)),
            fees: Decimal::ZERO,
            amount: dec!(-1),
            currency: cgt_money::Currency::GBP,
            broker: "Test".to_string(),
            isin: None,
        }
    }

    fn record(date: &str, action: Action, symbol: &str, index: usize) -> TransactionRecord {
        let raw = raw(date, action, symbol);
        let operation = raw.clone().into_operation().unwrap();
        TransactionRecord {
            raw,
            operation,
            ingest_index: index,
        }
    }

    #[test]
    fn buys_sort_before_sells_on_same_day() {
        let records = vec![
            record("2023-06-15", Action::Sell, "AAPL", 0),
            record("2023-06-15", Action::Buy, "AAPL", 1),
        ];
        let sorted = canonical_sort(records);
        assert!(matches!(sorted[0].operation, Operation::Acquisition(_)));
        assert!(matches!(sorted[1].operation, Operation::Disposal(_)));
    }

    #[test]
    fn spinoff_sorts_before_same_day_acquisition() {
        let records = vec![
            record("2023-06-15", Action::StockActivity, "SOLV", 0),
            record("2023-06-15", Action::SpinOff, "MMM", 1),
        ];
        let sorted = canonical_sort(records);
        assert!(matches!(
            sorted[0].operation,
            Operation::CorporateAction(CorporateActionOp::SpinOff { .. })
        ));
    }

    #[test]
    fn dividends_sort_to_end_of_day() {
        let records = vec![
            record("2023-06-15", Action::Dividend, "AAPL", 0),
            record("2023-06-15", Action::Sell, "AAPL", 1),
            record("2023-06-15", Action::Buy, "AAPL", 2),
        ];
        let sorted = canonical_sort(records);
        assert!(matches!(sorted[0].operation, Operation::Acquisition(_)));
        assert!(matches!(sorted[1].operation, Operation::Disposal(_)));
        assert!(matches!(sorted[2].operation, Operation::Dividend(_)));
    }

    #[test]
    fn dates_sort_ascending_across_days() {
        let records = vec![
            record("2023-06-16", Action::Buy, "AAPL", 0),
            record("2023-06-15", Action::Sell, "AAPL", 1),
        ];
        let sorted = canonical_sort(records);
        assert_eq!(sorted[0].date(), "2023-06-15".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn stable_within_identical_date_and_rank() {
        let records = vec![
            record("2023-06-15", Action::Buy, "AAPL", 0),
            record("2023-06-15", Action::Buy, "MSFT", 1),
        ];
        let sorted = canonical_sort(records);
        assert_eq!(sorted[0].ingest_index, 0);
        assert_eq!(sorted[1].ingest_index, 1);
    }
}
