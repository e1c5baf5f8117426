//! Top-level orchestration: turn a canonical transaction stream into
//! a [`Report`]. This is the single place that converts foreign-currency
//! amounts to GBP, drives the matching engine and corporate-action processor
//! date-by-date in canonical order, and folds the results into per-tax-year
//! summaries.

use crate::corporate_actions::CorporateActionProcessor;
use crate::error::CgtError;
use crate::exemption::get_exemption;
use crate::ledger::PositionLedger;
use crate::matcher::Matcher;
use crate::models::{
    CalculationLogEntry, CashOp, CorporateActionOp, Currency, Disposal, DividendSummary,
    InterestSummary, Operation, RawTransaction, Report, ShortDisposal, TaxPeriod, TaxYearSummary,
};
use crate::ordering::{canonical_sort, TransactionRecord};
use crate::reference_data::{EriTable, FxRateSource, InitialPriceTable, IsinTable};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

/// Convert a row's native-currency amount to GBP, using the HMRC convention
/// that a rate is "units of foreign currency per £1" (so GBP = amount / rate).
/// GBP rows skip the lookup entirely - there's no reason a GBP disposal should
/// ever fail for want of a GBP/GBP rate.
fn to_gbp(fx: &dyn FxRateSource, amount: Decimal, currency: Currency, date: NaiveDate) -> Result<Decimal, CgtError> {
    if currency == Currency::GBP {
        return Ok(amount);
    }
    let rate = fx.rate(currency, date)?;
    Ok(amount / rate)
}

/// Run the full calculation against bundled reference data (no ISIN links,
/// initial prices, or ERI entries beyond what's learned at runtime from
/// `isin` fields, and the bundled FX rate snapshot). Callers with their own
/// reference-data files should use [`calculate_with_reference_data`] instead.
pub fn calculate(transactions: Vec<RawTransaction>) -> Result<Report, CgtError> {
    let fx = cgt_money::load_default_cache().map_err(|e| CgtError::SerializationError(e.to_string()))?;
    calculate_with_reference_data(
        transactions,
        &fx,
        IsinTable::new(),
        InitialPriceTable::new(),
        EriTable::new(),
    )
}

/// Run the full calculation, threading through caller-supplied FX rates and
/// bulk reference data (ISIN links, initial prices, ERI entries).
pub fn calculate_with_reference_data(
    transactions: Vec<RawTransaction>,
    fx: &dyn FxRateSource,
    isin_table: IsinTable,
    initial_prices: InitialPriceTable,
    eri_table: EriTable,
) -> Result<Report, CgtError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut log: Vec<CalculationLogEntry> = Vec::new();

    let mut records = Vec::new();
    for (ingest_index, raw) in transactions.into_iter().enumerate() {
        let date = raw.date;
        match raw.clone().into_operation() {
            Ok(operation) => records.push(TransactionRecord {
                raw,
                operation,
                ingest_index,
            }),
            Err(e) => errors.push(format!("transaction {} ({date}): {e}", ingest_index + 1)),
        }
    }
    let records = canonical_sort(records);

    let mut ledger = PositionLedger::new();
    let mut matcher = Matcher::new();
    let mut corp = CorporateActionProcessor::new(isin_table, initial_prices, eri_table);

    let mut disposals: Vec<Disposal> = Vec::new();
    let mut short_disposals: Vec<ShortDisposal> = Vec::new();
    // (date, symbol, currency, gross_gbp, withholding_gbp)
    let mut dividend_records: Vec<(NaiveDate, Option<String>, Currency, Decimal, Decimal)> = Vec::new();
    // (date, broker, currency, amount_gbp)
    let mut interest_records: Vec<(NaiveDate, String, Currency, Decimal)> = Vec::new();
    // (date, eri_gbp), one entry per symbol an ERI reduction was applied to
    let mut eri_records: Vec<(NaiveDate, Decimal)> = Vec::new();

    let mut i = 0;
    while i < records.len() {
        let date = records[i].raw.date;
        let mut j = i;
        while j < records.len() && records[j].raw.date == date {
            j += 1;
        }

        for record in &records[i..j] {
            // A missing FX rate only invalidates this one transaction's
            // contribution; per the error taxonomy, only InvariantViolation
            // aborts the whole calculation.
            let mut fx_or_skip = |amount: Decimal, currency: Currency| -> Option<Decimal> {
                match to_gbp(fx, amount, currency, date) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        errors.push(format!("transaction {} ({date}): {e}", record.ingest_index + 1));
                        None
                    }
                }
            };
            match &record.operation {
                Operation::Acquisition(op) => {
                    let cost_foreign = op.quantity * op.price + op.fees;
                    let Some(cost_gbp) = fx_or_skip(cost_foreign, op.currency) else { continue };
                    matcher.acquire(&op.symbol, date, op.quantity, cost_gbp);
                    if let Some(isin) = &op.isin {
                        corp.observe_isin(&mut ledger, &op.symbol, isin, date, &mut log);
                    }
                    log.push(CalculationLogEntry {
                        date,
                        text: format!(
                            "{} {} shares of {} for £{cost_gbp}",
                            if op.reinvested { "reinvested" } else { "acquired" },
                            op.quantity,
                            op.symbol,
                        ),
                    });
                }
                Operation::Disposal(op) => {
                    let gross_foreign = op.quantity * op.price;
                    let net_foreign = gross_foreign - op.fees;
                    let Some(gross_gbp) = fx_or_skip(gross_foreign, op.currency) else { continue };
                    let Some(net_gbp) = fx_or_skip(net_foreign, op.currency) else { continue };
                    if let Some(disposal) = matcher.dispose(&op.symbol, date, op.quantity, gross_gbp, net_gbp) {
                        log.push(CalculationLogEntry {
                            date,
                            text: format!(
                                "disposed of {} shares of {}, fully matched same-day",
                                op.quantity, op.symbol
                            ),
                        });
                        disposals.push(disposal);
                    }
                }
                Operation::Dividend(op) => {
                    let Some(gross_gbp) = fx_or_skip(op.amount.abs(), op.currency) else { continue };
                    let Some(withholding_gbp) = fx_or_skip(op.withholding_tax, op.currency) else { continue };
                    dividend_records.push((date, op.symbol.clone(), op.currency, gross_gbp, withholding_gbp));
                }
                Operation::Interest(op) => {
                    let Some(amount_gbp) = fx_or_skip(op.amount, op.currency) else { continue };
                    interest_records.push((date, op.broker.clone(), op.currency, amount_gbp));
                }
                Operation::CorporateAction(action) => match action {
                    CorporateActionOp::Split { symbol, ratio } => {
                        corp.process_split(&mut ledger, symbol, *ratio);
                        log.push(CalculationLogEntry {
                            date,
                            text: format!("applied a {ratio}:1 split to {symbol}"),
                        });
                    }
                    CorporateActionOp::SpinOff {
                        source_symbol,
                        dest_symbol,
                        cost_proportion,
                    } => {
                        corp.process_spin_off(&mut ledger, source_symbol, dest_symbol, *cost_proportion, date, &mut log);
                    }
                    CorporateActionOp::StockActivity {
                        symbol,
                        quantity,
                        price: _,
                        amount,
                        currency,
                        isin,
                    } => {
                        let amount_gbp = if amount.is_zero() {
                            Decimal::ZERO
                        } else {
                            let Some(converted) = fx_or_skip(amount.abs(), *currency) else { continue };
                            converted
                        };
                        let (cost_gbp, spinoff_source) =
                            corp.resolve_stock_activity_cost(symbol, *quantity, amount_gbp, date, &mut warnings);
                        matcher.acquire(symbol, date, *quantity, cost_gbp);
                        if let Some(isin) = isin {
                            corp.observe_isin(&mut ledger, symbol, isin, date, &mut log);
                        }
                        log.push(CalculationLogEntry {
                            date,
                            text: match &spinoff_source {
                                Some(source) => format!(
                                    "received {quantity} shares of {symbol} via spin-off from {source}, cost basis £{cost_gbp}"
                                ),
                                None => format!(
                                    "received {quantity} shares of {symbol} via stock activity, cost basis £{cost_gbp}"
                                ),
                            },
                        });
                    }
                    CorporateActionOp::Transfer { symbol, quantity } => {
                        log.push(CalculationLogEntry {
                            date,
                            text: format!(
                                "transfer of {} shares of {}",
                                quantity.map(|q| q.to_string()).unwrap_or_else(|| "?".to_string()),
                                symbol.as_deref().unwrap_or("?"),
                            ),
                        });
                    }
                },
                Operation::Cash(op) => {
                    let (label, amount, currency, broker) = match op {
                        CashOp::Fee { amount, currency, broker } => ("fee", amount, currency, broker),
                        CashOp::Tax { amount, currency, broker } => ("tax", amount, currency, broker),
                        CashOp::WireFunds { amount, currency, broker } => ("wire transfer", amount, currency, broker),
                    };
                    log.push(CalculationLogEntry {
                        date,
                        text: format!("{label} of {amount} {currency} via {broker}"),
                    });
                }
            }
        }

        let next_date = records.get(j).map(|r| r.raw.date);
        let flushed = matcher.flush_date(&mut ledger, date, next_date, &mut log)?;
        disposals.extend(flushed.disposals);
        short_disposals.extend(flushed.short_disposals);

        let eri_amounts = corp.apply_eri_for_date(&mut ledger, fx, date, &mut warnings, &mut log);
        eri_records.extend(eri_amounts.into_iter().map(|amount| (date, amount)));

        i = j;
    }

    let tax_years = build_tax_year_summaries(
        disposals,
        short_disposals,
        &dividend_records,
        &interest_records,
        &eri_records,
        &mut warnings,
    );

    Ok(Report {
        tax_years,
        portfolio: ledger.into_holdings(),
        errors,
        warnings,
        calculation_log: log,
    })
}

fn build_tax_year_summaries(
    mut disposals: Vec<Disposal>,
    mut short_disposals: Vec<ShortDisposal>,
    dividend_records: &[(NaiveDate, Option<String>, Currency, Decimal, Decimal)],
    interest_records: &[(NaiveDate, String, Currency, Decimal)],
    eri_records: &[(NaiveDate, Decimal)],
    warnings: &mut Vec<String>,
) -> Vec<TaxYearSummary> {
    disposals.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));
    short_disposals.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));

    let mut periods: BTreeSet<TaxPeriod> = BTreeSet::new();
    periods.extend(disposals.iter().map(|d| TaxPeriod::from_date(d.date)));
    periods.extend(short_disposals.iter().map(|s| TaxPeriod::from_date(s.date)));
    periods.extend(dividend_records.iter().map(|(date, ..)| TaxPeriod::from_date(*date)));
    periods.extend(interest_records.iter().map(|(date, ..)| TaxPeriod::from_date(*date)));
    periods.extend(eri_records.iter().map(|(date, _)| TaxPeriod::from_date(*date)));

    let mut tax_years = Vec::with_capacity(periods.len());
    for period in periods {
        let period_disposals: Vec<Disposal> = disposals
            .iter()
            .filter(|d| TaxPeriod::from_date(d.date) == period)
            .cloned()
            .collect();
        let period_shorts: Vec<ShortDisposal> = short_disposals
            .iter()
            .filter(|s| TaxPeriod::from_date(s.date) == period)
            .cloned()
            .collect();

        let capital_gain: Decimal = period_disposals
            .iter()
            .map(|d| d.gain_or_loss)
            .filter(|g| *g > Decimal::ZERO)
            .sum();
        let capital_loss: Decimal = period_disposals
            .iter()
            .map(|d| d.gain_or_loss)
            .filter(|g| *g < Decimal::ZERO)
            .map(|g| -g)
            .sum();

        let annual_exemption = match get_exemption(period.start_year()) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(format!("{e}; treating the {period} annual exemption as £0"));
                Decimal::ZERO
            }
        };

        let mut dividend_totals: HashMap<(Option<String>, Currency), (Decimal, Decimal)> = HashMap::new();
        for (date, symbol, currency, gross_gbp, withholding_gbp) in dividend_records {
            if TaxPeriod::from_date(*date) != period {
                continue;
            }
            let entry = dividend_totals.entry((symbol.clone(), *currency)).or_default();
            entry.0 += gross_gbp;
            entry.1 += withholding_gbp;
        }
        let mut dividends: Vec<DividendSummary> = dividend_totals
            .into_iter()
            .map(|((symbol, currency), (gross_amount_gbp, withholding_tax_gbp))| DividendSummary {
                symbol,
                currency,
                gross_amount_gbp,
                withholding_tax_gbp,
            })
            .collect();
        dividends.sort_by(|a, b| {
            (a.symbol.clone(), a.currency.to_string()).cmp(&(b.symbol.clone(), b.currency.to_string()))
        });

        let mut interest_totals: HashMap<(String, Currency, i32, u32), Decimal> = HashMap::new();
        for (date, broker, currency, amount_gbp) in interest_records {
            if TaxPeriod::from_date(*date) != period {
                continue;
            }
            *interest_totals
                .entry((broker.clone(), *currency, date.year(), date.month()))
                .or_insert(Decimal::ZERO) += amount_gbp;
        }
        let mut interest: Vec<InterestSummary> = interest_totals
            .into_iter()
            .map(|((broker, currency, year, month), amount_gbp)| InterestSummary {
                broker,
                currency,
                year,
                month,
                amount_gbp,
            })
            .collect();
        interest.sort_by(|a, b| (a.broker.clone(), a.year, a.month).cmp(&(b.broker.clone(), b.year, b.month)));

        let eri_income_gbp: Decimal = eri_records
            .iter()
            .filter(|(record_date, _)| TaxPeriod::from_date(*record_date) == period)
            .map(|(_, amount)| *amount)
            .sum();

        tax_years.push(TaxYearSummary {
            period,
            net_gain_loss: capital_gain - capital_loss,
            capital_gain,
            capital_loss,
            annual_exemption,
            disposals: period_disposals,
            short_disposals: period_shorts,
            dividends,
            interest,
            eri_income_gbp,
        });
    }

    tax_years
}
