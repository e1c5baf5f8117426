//! Read-only reference-data services the engine consumes: ISIN
//! resolution, historical initial prices, and the ERI bulk snapshot. All
//! three are plain values built once at engine construction time (Design
//! no process-wide singletons, passed in by reference.

use crate::models::EriEntry;
use chrono::NaiveDate;
use cgt_money::Currency;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// ISIN → known symbols, with runtime learning as transactions are observed.
#[derive(Debug, Clone, Default)]
pub struct IsinTable {
    isin_to_symbols: HashMap<String, Vec<String>>,
    symbol_to_isin: HashMap<String, String>,
}

impl IsinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from a bulk snapshot of `(isin, symbol)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut table = Self::new();
        for (isin, symbol) in pairs {
            table.record(&isin, &symbol);
        }
        table
    }

    /// All symbols known to share `isin`.
    pub fn symbols(&self, isin: &str) -> &[String] {
        self.isin_to_symbols
            .get(isin)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The ISIN a symbol was last observed under, if any.
    pub fn isin_for_symbol(&self, symbol: &str) -> Option<&str> {
        self.symbol_to_isin.get(symbol).map(String::as_str)
    }

    /// Learn a `(isin, symbol)` association at runtime. Idempotent:
    /// recording the same pair twice is a no-op.
    pub fn record(&mut self, isin: &str, symbol: &str) {
        let symbols = self.isin_to_symbols.entry(isin.to_string()).or_default();
        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
        self.symbol_to_isin
            .insert(symbol.to_string(), isin.to_string());
    }
}

/// Historical initial prices, used to value STOCK_ACTIVITY rows lacking one.
#[derive(Debug, Clone, Default)]
pub struct InitialPriceTable {
    prices: HashMap<(String, NaiveDate), Decimal>,
}

impl InitialPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, NaiveDate, Decimal)>) -> Self {
        let mut table = Self::new();
        for (symbol, date, price) in entries {
            table.insert(&symbol, date, price);
        }
        table
    }

    pub fn insert(&mut self, symbol: &str, date: NaiveDate, price: Decimal) {
        self.prices.insert((symbol.to_string(), date), price);
    }

    pub fn price(&self, symbol: &str, date: NaiveDate) -> Option<Decimal> {
        self.prices.get(&(symbol.to_string(), date)).copied()
    }
}

/// Bulk Excess Reported Income snapshot, loaded once at engine construction.
#[derive(Debug, Clone, Default)]
pub struct EriTable {
    entries: Vec<EriEntry>,
}

impl EriTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<EriEntry>) -> Self {
        Self { entries }
    }

    /// Entries matching `isin`, in the order they were loaded.
    pub fn entries_for_isin<'a>(&'a self, isin: &'a str) -> impl Iterator<Item = &'a EriEntry> {
        self.entries.iter().filter(move |e| e.isin == isin)
    }

    /// Entries whose `period_end_date` falls on `date`, in load order. The
    /// corporate-action processor calls this once per date so an ERI entry is
    /// applied exactly when its reporting period closes.
    pub fn entries_for_date(&self, date: NaiveDate) -> impl Iterator<Item = &EriEntry> {
        self.entries.iter().filter(move |e| e.period_end_date == date)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// FX lookup abstraction the engine depends on, satisfied by `cgt_money::FxCache`.
pub trait FxRateSource {
    fn rate(&self, currency: Currency, date: NaiveDate) -> Result<Decimal, crate::error::CgtError>;
}

impl FxRateSource for cgt_money::FxCache {
    fn rate(&self, currency: Currency, date: NaiveDate) -> Result<Decimal, crate::error::CgtError> {
        cgt_money::FxCache::rate(self, currency, date).map_err(Into::into)
    }
}
