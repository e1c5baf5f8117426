use thiserror::Error;

/// The structured error taxonomy. Only [`CgtError::InvariantViolation`]
/// is fatal to a calculation; every other kind is accumulated into the
/// report's `errors`/`warnings` vectors by the caller and the calculation
/// continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CgtError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid tax year: {0} is out of valid range (1900-2100)")]
    InvalidTaxYear(u16),

    #[error("Unsupported tax year {0} for CGT exemption lookup - please update the tool")]
    UnsupportedExemptionYear(u16),

    #[error("Invalid currency code '{code}': not a recognized ISO 4217 currency")]
    InvalidCurrencyCode { code: String },

    #[error("Missing FX rate for {currency} in {year}-{month:02}: {reason}")]
    ReferenceDataMissing {
        currency: String,
        year: i32,
        month: u32,
        reason: String,
    },

    /// An impossible ledger state: removing more shares from a pool than it
    /// holds outside the authorized short-disposal path, a negative pool
    /// amount, or similar. Aborts the calculation.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<std::io::Error> for CgtError {
    fn from(err: std::io::Error) -> Self {
        CgtError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CgtError {
    fn from(err: serde_json::Error) -> Self {
        CgtError::SerializationError(err.to_string())
    }
}

impl From<cgt_money::FxConversionError> for CgtError {
    fn from(err: cgt_money::FxConversionError) -> Self {
        let cgt_money::FxConversionError::MissingRate {
            currency,
            year,
            month,
            ..
        } = &err;
        CgtError::ReferenceDataMissing {
            currency: currency.clone(),
            year: *year,
            month: *month,
            reason: err.to_string(),
        }
    }
}
