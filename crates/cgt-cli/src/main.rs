use anyhow::{Context, Result, bail};
use cgt_core::calculate;
use cgt_core::models::{RawTransaction, TaxPeriod};
use clap::Parser;
mod commands;
use commands::Commands;
use schemars::schema_for;
use std::fs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Report { file, tax_year, schema } => {
            if *schema {
                let schema = schema_for!(Vec<RawTransaction>);
                println!("{}", serde_json::to_string_pretty(&schema)?);
                return Ok(());
            }

            let Some(path) = file else {
                bail!("a transaction file is required unless --schema is set");
            };
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading transaction file {}", path.display()))?;
            let transactions: Vec<RawTransaction> =
                serde_json::from_str(&content).context("parsing transaction JSON")?;

            let mut report = calculate(transactions)?;
            if let Some(year) = tax_year {
                let period = TaxPeriod::new(*year)?;
                report.tax_years.retain(|summary| summary.period == period);
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
