use crate::types::{RateEntry, RateKey};
use chrono::{Datelike, NaiveDate};
use iso_currency::Currency;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Error converting a foreign amount to GBP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FxConversionError {
    #[error("Missing FX rate for {currency} in {year}-{month:02} (searched back {window} months)")]
    MissingRate {
        currency: String,
        year: i32,
        month: u32,
        window: u32,
    },
}

/// How many months backward `rate()` will search for a published period
/// before giving up. HMRC publishes exchange rates monthly rather than
/// daily, so a bounded nearest-earlier-date fallback is realized here as
/// "fall back at most two published periods" (this month or the one before
/// it) — see DESIGN.md for the reasoning.
const FALLBACK_WINDOW_MONTHS: u32 = 2;

/// Bundled-plus-override cache of monthly GBP exchange rates.
#[derive(Debug, Default, Clone)]
pub struct FxCache {
    rates: HashMap<RateKey, RateEntry>,
}

impl FxCache {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, entry: RateEntry) {
        self.rates.insert(entry.key, entry);
    }

    pub fn extend(&mut self, entries: Vec<RateEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Look up the raw entry for an exact (currency, year, month) period.
    pub fn get(&self, currency: Currency, year: i32, month: u32) -> Option<&RateEntry> {
        self.rates.get(&RateKey::new(currency, year, month))
    }

    /// GBP is always 1; every other currency falls back through up to
    /// [`FALLBACK_WINDOW_MONTHS`] prior periods before failing.
    pub fn rate(&self, currency: Currency, date: NaiveDate) -> Result<Decimal, FxConversionError> {
        if currency == Currency::GBP {
            return Ok(Decimal::ONE);
        }

        let mut year = date.year();
        let mut month = date.month();
        let requested = (date.year(), date.month());

        for step in 0..=FALLBACK_WINDOW_MONTHS {
            if let Some(entry) = self.get(currency, year, month) {
                if step > 0 {
                    log::debug!(
                        "no {} rate for {}-{:02}, falling back {step} period(s) to {year}-{month:02}",
                        currency.code(),
                        requested.0,
                        requested.1
                    );
                }
                return Ok(entry.rate_per_gbp);
            }
            if month == 1 {
                year -= 1;
                month = 12;
            } else {
                month -= 1;
            }
        }

        log::warn!(
            "no {} rate for {}-{:02} within {FALLBACK_WINDOW_MONTHS}-period fallback window",
            currency.code(),
            requested.0,
            requested.1
        );
        Err(FxConversionError::MissingRate {
            currency: currency.code().to_string(),
            year: date.year(),
            month: date.month(),
            window: FALLBACK_WINDOW_MONTHS,
        })
    }

    /// Check whether any rate exists for the given currency code across all cached periods.
    pub fn has_currency(&self, code: &str) -> bool {
        let code = code.trim().to_uppercase();
        let Some(currency) = Currency::from_code(&code) else {
            return false;
        };
        self.rates.keys().any(|k| k.code == currency)
    }
}
