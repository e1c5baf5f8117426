//! Core FX rate record types shared by the parser, loader, and cache.

use iso_currency::Currency;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::SystemTime;

/// Key identifying a single currency/month exchange-rate period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub code: Currency,
    pub year: i32,
    pub month: u32,
}

impl RateKey {
    pub fn new(code: Currency, year: i32, month: u32) -> Self {
        Self { code, year, month }
    }
}

/// Where a rate entry came from, for audit/debugging purposes.
#[derive(Debug, Clone)]
pub enum RateSource {
    /// Embedded at compile time via `include_dir!`.
    Bundled { period: Option<String> },
    /// Supplied at runtime by the caller (override folder).
    Folder {
        path: PathBuf,
        period: Option<String>,
        modified: Option<SystemTime>,
    },
}

/// A single parsed exchange rate for one currency/month.
#[derive(Debug, Clone)]
pub struct RateEntry {
    pub key: RateKey,
    /// Units of `key.code` per one GBP (HMRC convention: foreign currency per £1).
    pub rate_per_gbp: Decimal,
    pub source: RateSource,
}
