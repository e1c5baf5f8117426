use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the CGT calculation over a JSON array of canonical transactions.
    Report {
        /// Path to a JSON file containing an array of canonical transactions.
        #[arg(required_unless_present = "schema")]
        file: Option<PathBuf>,

        /// Restrict the printed report to a single UK tax year (e.g. 2023
        /// for 2023/24). Omit to print every tax year present in the input.
        #[arg(long)]
        tax_year: Option<u16>,

        /// Print the JSON schema for the input transaction array instead of
        /// running a calculation.
        #[arg(long)]
        schema: bool,
    },
}
