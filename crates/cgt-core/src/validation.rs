//! Pre-calculation validation of the canonical transaction stream.
//!
//! [`validate`] runs ahead of [`crate::calculator::calculate`] and reports the
//! same class of problems [`crate::models::RawTransaction::into_operation`]
//! would reject, but as a non-fatal batch: every row is checked, so a caller
//! can show the user every problem at once instead of one-by-one as the
//! engine would discover them.

use crate::models::{Action, RawTransaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::ser::SerializeStruct;
use std::collections::HashMap;
use std::fmt;

/// Result of validating a transaction list.
///
/// Serializes with an additional `is_valid` field derived from [`Self::is_valid`].
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent calculation.
    pub errors: Vec<ValidationError>,
    /// Warnings that don't prevent calculation but may indicate issues.
    pub warnings: Vec<ValidationWarning>,
}

impl Serialize for ValidationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationResult", 3)?;
        state.serialize_field("is_valid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there are no errors or warnings.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// A validation error that prevents calculation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    /// Position in the ingested list (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub date: NaiveDate,
    pub symbol: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Error (line {}): {} on {} - {}", line, self.symbol, self.date, self.message),
            None => write!(f, "Error: {} on {} - {}", self.symbol, self.date, self.message),
        }
    }
}

/// A validation warning that doesn't prevent calculation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub date: NaiveDate,
    pub symbol: String,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "Warning (line {}): {} on {} - {}", line, self.symbol, self.date, self.message),
            None => write!(f, "Warning: {} on {} - {}", self.symbol, self.date, self.message),
        }
    }
}

fn symbol_or_blank(tx: &RawTransaction) -> String {
    tx.symbol.clone().unwrap_or_default()
}

/// Quantity/price/fees checks shared by BUY, REINVEST and SELL rows.
fn check_trade_fields(result: &mut ValidationResult, line: Option<usize>, tx: &RawTransaction, label: &str) {
    let symbol = symbol_or_blank(tx);

    match tx.quantity {
        None => result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol: symbol.clone(),
            message: format!("{label} is missing a quantity"),
        }),
        Some(q) if q == Decimal::ZERO => result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol: symbol.clone(),
            message: format!("{label} with zero quantity"),
        }),
        Some(q) if q < Decimal::ZERO => result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol: symbol.clone(),
            message: format!("{label} with negative quantity: {q}"),
        }),
        _ => {}
    }

    match tx.price {
        Some(p) if p < Decimal::ZERO => result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol: symbol.clone(),
            message: format!("{label} with negative price: {p}"),
        }),
        None => result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol: symbol.clone(),
            message: format!("{label} is missing a price"),
        }),
        _ => {}
    }

    if tx.fees < Decimal::ZERO {
        result.errors.push(ValidationError {
            line,
            date: tx.date,
            symbol,
            message: format!("{label} with negative fees: {}", tx.fees),
        });
    }
}

/// Validate a list of normalized transactions before calculation.
///
/// Checks quantity/price/fee signs on trade-like rows, split/spin-off ratio
/// bounds, and flags SELLs of a symbol with no earlier BUY as a warning (not
/// an error - a position opened outside the supplied window is legitimate).
pub fn validate(transactions: &[RawTransaction]) -> ValidationResult {
    let mut result = ValidationResult::default();
    let mut first_buy: HashMap<String, NaiveDate> = HashMap::new();

    for (i, tx) in transactions.iter().enumerate() {
        let line = Some(i + 1);
        let symbol = symbol_or_blank(tx);

        match tx.action {
            Action::Buy | Action::Reinvest => {
                check_trade_fields(&mut result, line, tx, if tx.action == Action::Buy { "BUY" } else { "REINVEST" });
                if let Some(sym) = &tx.symbol {
                    first_buy
                        .entry(sym.clone())
                        .and_modify(|d| {
                            if tx.date < *d {
                                *d = tx.date;
                            }
                        })
                        .or_insert(tx.date);
                }
            }
            Action::Sell => {
                check_trade_fields(&mut result, line, tx, "SELL");
                match tx.symbol.as_deref().and_then(|s| first_buy.get(s)) {
                    Some(&first_buy_date) if tx.date < first_buy_date => {
                        result.warnings.push(ValidationWarning {
                            line,
                            date: tx.date,
                            symbol,
                            message: format!("SELL before first BUY (first buy: {first_buy_date})"),
                        });
                    }
                    Some(_) => {}
                    None => result.warnings.push(ValidationWarning {
                        line,
                        date: tx.date,
                        symbol,
                        message: "SELL with no prior BUY for this symbol".to_string(),
                    }),
                }
            }
            Action::Split => match tx.quantity {
                Some(ratio) if ratio <= Decimal::ZERO => result.errors.push(ValidationError {
                    line,
                    date: tx.date,
                    symbol,
                    message: format!("SPLIT with non-positive ratio: {ratio}"),
                }),
                None => result.errors.push(ValidationError {
                    line,
                    date: tx.date,
                    symbol,
                    message: "SPLIT is missing its ratio".to_string(),
                }),
                _ => {}
            },
            Action::SpinOff => {
                match tx.description.split_once(':').and_then(|(_, p)| p.trim().parse::<Decimal>().ok()) {
                    Some(p) if p > Decimal::ZERO && p < Decimal::ONE => {}
                    _ => result.errors.push(ValidationError {
                        line,
                        date: tx.date,
                        symbol,
                        message: "SPIN_OFF description must be '<dest_symbol>:<cost_proportion>' with proportion in (0, 1)".to_string(),
                    }),
                }
            }
            Action::StockActivity => {
                if tx.quantity.is_none_or(|q| q <= Decimal::ZERO) {
                    result.errors.push(ValidationError {
                        line,
                        date: tx.date,
                        symbol,
                        message: "STOCK_ACTIVITY with non-positive quantity".to_string(),
                    });
                }
            }
            Action::Dividend => {
                if tx.amount == Decimal::ZERO {
                    result.warnings.push(ValidationWarning {
                        line,
                        date: tx.date,
                        symbol,
                        message: "DIVIDEND with zero amount".to_string(),
                    });
                }
                if tx.fees < Decimal::ZERO {
                    result.errors.push(ValidationError {
                        line,
                        date: tx.date,
                        symbol,
                        message: format!("DIVIDEND with negative withholding tax: {}", tx.fees),
                    });
                }
            }
            Action::Interest => {
                if tx.amount < Decimal::ZERO {
                    result.warnings.push(ValidationWarning {
                        line,
                        date: tx.date,
                        symbol,
                        message: format!("INTEREST with negative amount: {}", tx.amount),
                    });
                }
            }
            Action::Transfer | Action::Fee | Action::Tax | Action::WireFunds => {}
        }
    }

    result
}
