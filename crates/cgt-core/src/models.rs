use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CgtError;

// Re-export money primitives from cgt-money so downstream crates only need cgt-core.
pub use cgt_money::{Currency, CurrencyAmount};

/// Serialize a Decimal to at most 2 decimal places for monetary amounts.
mod decimal_money {
    use rust_decimal::Decimal;
    use serde::{self, Serializer};

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rounded = value.round_dp(2);
        serializer.serialize_str(&rounded.to_string())
    }
}

/// The twelve normalized transaction actions a broker parser may emit.
///
/// Deserialization is case-insensitive (brokers/export tools vary in casing);
/// serialization always uses `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Dividend,
    Interest,
    Transfer,
    StockActivity,
    Fee,
    Tax,
    Split,
    SpinOff,
    Reinvest,
    WireFunds,
}

impl Action {
    fn all() -> &'static [(&'static str, Action)] {
        &[
            ("BUY", Action::Buy),
            ("SELL", Action::Sell),
            ("DIVIDEND", Action::Dividend),
            ("INTEREST", Action::Interest),
            ("TRANSFER", Action::Transfer),
            ("STOCK_ACTIVITY", Action::StockActivity),
            ("FEE", Action::Fee),
            ("TAX", Action::Tax),
            ("SPLIT", Action::Split),
            ("SPIN_OFF", Action::SpinOff),
            ("REINVEST", Action::Reinvest),
            ("WIRE_FUNDS", Action::WireFunds),
        ]
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Dividend => "DIVIDEND",
            Action::Interest => "INTEREST",
            Action::Transfer => "TRANSFER",
            Action::StockActivity => "STOCK_ACTIVITY",
            Action::Fee => "FEE",
            Action::Tax => "TAX",
            Action::Split => "SPLIT",
            Action::SpinOff => "SPIN_OFF",
            Action::Reinvest => "REINVEST",
            Action::WireFunds => "WIRE_FUNDS",
        };
        write!(f, "{name}")
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let normalized = raw.to_uppercase().replace(['-', ' '], "_");
        Action::all()
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, action)| *action)
            .ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "invalid action '{raw}'. Valid actions: {}",
                    Action::all()
                        .iter()
                        .map(|(n, _)| *n)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// The canonical transaction record: the only input surface of the core.
///
/// Fields are nullable exactly where the action leaves them meaningless (a
/// dividend has no `quantity`; a split has no `symbol`-independent price).
/// [`RawTransaction::into_operation`] validates and dispatches into the
/// tagged [`Operation`] enum so the matching engine never re-checks nullability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub action: Action,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub fees: Decimal,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub broker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
}

/// An acquisition of shares: BUY, REINVEST, or a nonzero-amount STOCK_ACTIVITY row.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionOp {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub amount: Decimal,
    pub currency: Currency,
    pub isin: Option<String>,
    /// True for REINVEST rows, kept only to label the calculation log entry.
    pub reinvested: bool,
}

/// A disposal of shares: SELL.
#[derive(Debug, Clone, PartialEq)]
pub struct DisposalOp {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub amount: Decimal,
    pub currency: Currency,
}

/// A dividend or capital-return distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct DividendOp {
    pub symbol: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    /// Withholding tax withheld at source, carried in the raw row's `fees` field.
    pub withholding_tax: Decimal,
}

/// Interest paid by a broker on uninvested cash.
#[derive(Debug, Clone, PartialEq)]
pub struct InterestOp {
    pub broker: String,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Corporate actions that mutate the position ledger outside ordinary trading.
#[derive(Debug, Clone, PartialEq)]
pub enum CorporateActionOp {
    Split {
        symbol: String,
        ratio: Decimal,
    },
    /// `description` carries `"<dest_symbol>:<cost_proportion>"`, the
    /// convention adopted for encoding a spin-off pair inside the flat
    /// canonical record (see DESIGN.md).
    SpinOff {
        source_symbol: String,
        dest_symbol: String,
        cost_proportion: Decimal,
    },
    /// Dispatch between acquisition-like and spin-off-receipt is resolved at
    /// corporate-action-processing time, not at parse time, since it
    /// depends on whether a matching pending spin-off has been observed.
    StockActivity {
        symbol: String,
        quantity: Decimal,
        price: Option<Decimal>,
        amount: Decimal,
        currency: Currency,
        isin: Option<String>,
    },
    /// Broker-to-broker transfer; logged for audit but does not mutate cost
    /// basis (no continuation-of-position semantics are specified).
    Transfer {
        symbol: Option<String>,
        quantity: Option<Decimal>,
    },
}

/// Cash movements with no effect on share positions.
#[derive(Debug, Clone, PartialEq)]
pub enum CashOp {
    Fee {
        amount: Decimal,
        currency: Currency,
        broker: String,
    },
    Tax {
        amount: Decimal,
        currency: Currency,
        broker: String,
    },
    WireFunds {
        amount: Decimal,
        currency: Currency,
        broker: String,
    },
}

/// Tagged dispatch target for a validated [`RawTransaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Acquisition(AcquisitionOp),
    Disposal(DisposalOp),
    Dividend(DividendOp),
    Interest(InterestOp),
    CorporateAction(CorporateActionOp),
    Cash(CashOp),
}

fn require_symbol(tx: &RawTransaction) -> Result<String, CgtError> {
    tx.symbol.clone().ok_or_else(|| {
        CgtError::InvalidTransaction(format!("{} requires a 'symbol' field", tx.action))
    })
}

fn require_quantity(tx: &RawTransaction) -> Result<Decimal, CgtError> {
    let qty = tx
        .quantity
        .ok_or_else(|| CgtError::InvalidTransaction(format!("{} requires a 'quantity' field", tx.action)))?;
    if qty <= Decimal::ZERO {
        return Err(CgtError::InvalidTransaction(format!(
            "{} quantity must be positive (got {qty})",
            tx.action
        )));
    }
    Ok(qty)
}

fn require_price(tx: &RawTransaction) -> Result<Decimal, CgtError> {
    let price = tx
        .price
        .ok_or_else(|| CgtError::InvalidTransaction(format!("{} requires a 'price' field", tx.action)))?;
    if price <= Decimal::ZERO {
        return Err(CgtError::InvalidTransaction(format!(
            "{} price must be positive (got {price})",
            tx.action
        )));
    }
    Ok(price)
}

fn parse_spinoff_description(tx: &RawTransaction) -> Result<(String, Decimal), CgtError> {
    let (dest, proportion) = tx.description.split_once(':').ok_or_else(|| {
        CgtError::InvalidTransaction(
            "SPIN_OFF requires description in '<dest_symbol>:<cost_proportion>' form".to_string(),
        )
    })?;
    let proportion: Decimal = proportion.trim().parse().map_err(|_| {
        CgtError::InvalidTransaction(format!("SPIN_OFF cost proportion is not a decimal: '{proportion}'"))
    })?;
    if !(Decimal::ZERO < proportion && proportion < Decimal::ONE) {
        return Err(CgtError::InvalidTransaction(format!(
            "SPIN_OFF cost proportion must be in (0, 1), got {proportion}"
        )));
    }
    Ok((dest.trim().to_uppercase(), proportion))
}

impl RawTransaction {
    /// Validate nullable fields against `action` and dispatch into a tagged
    /// [`Operation`]. This is the single place that understands which fields
    /// a given action requires; everything downstream consumes a variant
    /// whose fields are always present.
    pub fn into_operation(self) -> Result<Operation, CgtError> {
        match self.action {
            Action::Buy | Action::Reinvest => {
                let symbol = require_symbol(&self)?;
                let quantity = require_quantity(&self)?;
                let price = require_price(&self)?;
                Ok(Operation::Acquisition(AcquisitionOp {
                    symbol,
                    quantity,
                    price,
                    fees: self.fees,
                    amount: self.amount,
                    currency: self.currency,
                    isin: self.isin,
                    reinvested: self.action == Action::Reinvest,
                }))
            }
            Action::Sell => {
                let symbol = require_symbol(&self)?;
                let quantity = require_quantity(&self)?;
                let price = require_price(&self)?;
                Ok(Operation::Disposal(DisposalOp {
                    symbol,
                    quantity,
                    price,
                    fees: self.fees,
                    amount: self.amount,
                    currency: self.currency,
                }))
            }
            Action::Dividend => Ok(Operation::Dividend(DividendOp {
                symbol: self.symbol,
                amount: self.amount,
                currency: self.currency,
                withholding_tax: self.fees,
            })),
            Action::Interest => Ok(Operation::Interest(InterestOp {
                broker: self.broker,
                amount: self.amount,
                currency: self.currency,
            })),
            Action::Split => {
                let symbol = require_symbol(&self)?;
                let ratio = self.quantity.ok_or_else(|| {
                    CgtError::InvalidTransaction("SPLIT requires a 'quantity' field carrying the ratio".to_string())
                })?;
                if ratio <= Decimal::ZERO {
                    return Err(CgtError::InvalidTransaction(format!(
                        "SPLIT ratio must be positive (got {ratio})"
                    )));
                }
                Ok(Operation::CorporateAction(CorporateActionOp::Split { symbol, ratio }))
            }
            Action::SpinOff => {
                let source_symbol = require_symbol(&self)?;
                let (dest_symbol, cost_proportion) = parse_spinoff_description(&self)?;
                Ok(Operation::CorporateAction(CorporateActionOp::SpinOff {
                    source_symbol,
                    dest_symbol,
                    cost_proportion,
                }))
            }
            Action::StockActivity => {
                let symbol = require_symbol(&self)?;
                let quantity = require_quantity(&self)?;
                Ok(Operation::CorporateAction(CorporateActionOp::StockActivity {
                    symbol,
                    quantity,
                    price: self.price,
                    amount: self.amount,
                    currency: self.currency,
                    isin: self.isin,
                }))
            }
            Action::Transfer => Ok(Operation::CorporateAction(CorporateActionOp::Transfer {
                symbol: self.symbol,
                quantity: self.quantity,
            })),
            Action::Fee => Ok(Operation::Cash(CashOp::Fee {
                amount: self.amount,
                currency: self.currency,
                broker: self.broker,
            })),
            Action::Tax => Ok(Operation::Cash(CashOp::Tax {
                amount: self.amount,
                currency: self.currency,
                broker: self.broker,
            })),
            Action::WireFunds => Ok(Operation::Cash(CashOp::WireFunds {
                amount: self.amount,
                currency: self.currency,
                broker: self.broker,
            })),
        }
    }
}

/// A validated UK tax year identifier (April 6 to April 5).
///
/// Stores the start year internally and serializes to "YYYY/YY" format (e.g., "2023/24").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxPeriod(u16);

impl TaxPeriod {
    /// Create a new TaxPeriod from a start year.
    ///
    /// # Errors
    /// Returns `CgtError::InvalidTaxYear` if the year is outside the range 1900-2100.
    pub fn new(start_year: u16) -> Result<Self, CgtError> {
        if !(1900..=2100).contains(&start_year) {
            return Err(CgtError::InvalidTaxYear(start_year));
        }
        Ok(Self(start_year))
    }

    /// Derive the tax year from a date. Infallible: every `NaiveDate` falls
    /// inside exactly one UK tax year and `NaiveDate`'s year range is well
    /// within the 1900-2100 bound `new` enforces.
    ///
    /// UK tax year starts April 6, so:
    /// - 2024-03-15 → "2023/24" (before April 6)
    /// - 2024-04-10 → "2024/25" (on or after April 6)
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year() as u16;
        let month = date.month();
        let day = date.day();
        if month < 4 || (month == 4 && day < 6) {
            Self(year - 1)
        } else {
            Self(year)
        }
    }

    /// Get the start year of this tax period.
    pub fn start_year(&self) -> u16 {
        self.0
    }

    /// Get the end year of this tax period (always start_year + 1).
    pub fn end_year(&self) -> u16 {
        self.0 + 1
    }

    /// Get the start date of this tax year (April 6 of start year).
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0 as i32, 4, 6)
    }

    /// Get the end date of this tax year (April 5 of end year).
    pub fn end_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.end_year() as i32, 4, 5)
    }

    /// Whether `date` falls within this tax year, inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match (self.start_date(), self.end_date()) {
            (Some(start), Some(end)) => date >= start && date <= end,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaxPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end_short = (self.0 + 1) % 100;
        write!(f, "{}/{:02}", self.0, end_short)
    }
}

impl Serialize for TaxPeriod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaxPeriod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 {
            return Err(serde::de::Error::custom(format!(
                "invalid tax period format: expected 'YYYY/YY', got '{s}'"
            )));
        }
        let start: u16 = parts[0]
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid start year: '{}'", parts[0])))?;
        let end_short: u16 = parts[1]
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid end year: '{}'", parts[1])))?;

        let expected_end = (start + 1) % 100;
        if end_short != expected_end {
            return Err(serde::de::Error::custom(format!(
                "tax years must be consecutive: '{s}' should end with '{expected_end:02}', not '{end_short:02}'"
            )));
        }

        TaxPeriod::new(start).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for TaxPeriod {
    fn schema_name() -> String {
        "TaxPeriod".to_owned()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = generator.subschema_for::<String>().into_object();
        schema.metadata().description =
            Some("UK tax year in 'YYYY/YY' format (e.g., '2023/24')".to_owned());
        schema.string().pattern = Some(r"^\d{4}/\d{2}$".to_owned());
        schema.into()
    }
}

/// A Section 104 pool entry, or a resolved-acquisition lot. `amount` is the
/// aggregate GBP cost basis, not market value; `weightedAverageCost` is
/// derived (`amount / quantity`), never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub amount: Decimal,
}

impl Holding {
    /// Weighted average cost per share. `None` when the position is empty.
    pub fn weighted_average_cost(&self) -> Option<Decimal> {
        if self.quantity.is_zero() {
            None
        } else {
            Some(self.amount / self.quantity)
        }
    }
}

/// Enumeration of HMRC share matching rules, in priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum MatchRule {
    SameDay,
    BedAndBreakfast,
    Section104,
}

/// How a disposal (or portion of one) was matched to an acquisition or pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Match {
    pub rule: MatchRule,
    pub quantity: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub allocated_cost: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub allocated_proceeds: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub gain_or_loss: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_date: Option<NaiveDate>,
}

/// A sale event that has been fully resolved across Same-Day/B&B/Section 104.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Disposal {
    pub date: NaiveDate,
    pub symbol: String,
    pub quantity_disposed: Decimal,
    /// Proceeds before disposal fees (quantity × unit price), for SA108 Box 21.
    #[serde(serialize_with = "decimal_money::serialize")]
    pub gross_proceeds_gbp: Decimal,
    /// Cost basis allocated across all matched phases.
    #[serde(serialize_with = "decimal_money::serialize")]
    pub total_cost_gbp: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub gain_or_loss: Decimal,
    /// Breakdown quantities always sum to `quantity_disposed`.
    pub matches: Vec<Match>,
}

/// Quantity sold in excess of the available Section 104 pool.
/// Not an error: recorded separately and excluded from gain/loss until the
/// short position is later covered (a concern left to the caller).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ShortDisposal {
    pub date: NaiveDate,
    pub symbol: String,
    pub quantity_short: Decimal,
}

/// A spin-off corporate action pending or applied: `(source, dest, proportion, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SpinOffEvent {
    pub source_symbol: String,
    pub dest_symbol: String,
    pub cost_proportion: Decimal,
    pub date: NaiveDate,
}

/// Excess Reported Income entry for an offshore reporting fund.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EriEntry {
    pub isin: String,
    pub period_end_date: NaiveDate,
    pub currency: Currency,
    pub amount_per_share: Decimal,
}

/// One ISIN's known set of symbols, used to reconcile ticker renames.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct IsinLink {
    pub isin: String,
    pub symbols: Vec<String>,
}

/// Dividend or capital-return income aggregated per `(symbol, currency)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DividendSummary {
    pub symbol: Option<String>,
    pub currency: Currency,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub gross_amount_gbp: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub withholding_tax_gbp: Decimal,
}

/// Interest aggregated per `(broker, currency, calendar month)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct InterestSummary {
    pub broker: String,
    pub currency: Currency,
    pub year: i32,
    pub month: u32,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub amount_gbp: Decimal,
}

/// One entry of the ordered calculation log, keyed by date but kept as
/// a vector rather than a map so multiple same-day entries are all retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CalculationLogEntry {
    pub date: NaiveDate,
    pub text: String,
}

/// Summary of CGT activity within a single UK tax year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TaxYearSummary {
    pub period: TaxPeriod,
    pub disposals: Vec<Disposal>,
    pub short_disposals: Vec<ShortDisposal>,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub capital_gain: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub capital_loss: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub net_gain_loss: Decimal,
    #[serde(serialize_with = "decimal_money::serialize")]
    pub annual_exemption: Decimal,
    pub dividends: Vec<DividendSummary>,
    pub interest: Vec<InterestSummary>,
    /// Excess Reported Income added to taxable income for the period.
    #[serde(serialize_with = "decimal_money::serialize")]
    pub eri_income_gbp: Decimal,
}

/// The complete CGT calculation output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Report {
    pub tax_years: Vec<TaxYearSummary>,
    /// Post-calculation state of every non-empty Section 104 pool.
    pub portfolio: Vec<Holding>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub calculation_log: Vec<CalculationLogEntry>,
}
