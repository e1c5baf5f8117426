#![allow(clippy::panic)]

use assert_cmd::cargo::cargo_bin_cmd;
use std::io::Write;

fn write_transactions(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(json.as_bytes()).expect("write temp file");
    file
}

/// Buy 100 @ £100 + £10 fees and sell 50 @ £150, £5 fees, same day.
const SAME_DAY_SCENARIO: &str = r#"[
    {"date": "2023-06-15", "action": "BUY", "symbol": "AAPL", "quantity": "100", "price": "100", "fees": "10", "amount": "-10010", "currency": "GBP", "broker": "Test"},
    {"date": "2023-06-15", "action": "SELL", "symbol": "AAPL", "quantity": "50", "price": "150", "fees": "5", "amount": "7495", "currency": "GBP", "broker": "Test"}
]"#;

#[test]
fn report_fails_without_args() {
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    cmd.assert().failure();
}

#[test]
fn report_fails_without_file_or_schema() {
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    cmd.arg("report").assert().failure();
}

#[test]
fn report_schema_prints_json_schema_without_a_file() {
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    let output = cmd.arg("report").arg("--schema").output().expect("run cgt-tool");
    assert!(output.status.success());
    let schema: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("schema output is valid JSON");
    assert_eq!(schema["definitions"]["RawTransaction"]["type"], "object");
}

#[test]
fn report_computes_same_day_gain_from_json_input() {
    let input = write_transactions(SAME_DAY_SCENARIO);
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    let output = cmd
        .arg("report")
        .arg(input.path())
        .output()
        .expect("run cgt-tool");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report output is valid JSON");
    let tax_years = report["tax_years"].as_array().expect("tax_years array");
    assert_eq!(tax_years.len(), 1);
    assert_eq!(tax_years[0]["capital_gain"], "2490.00");
    assert_eq!(tax_years[0]["disposals"][0]["matches"][0]["rule"], "SameDay");
}

#[test]
fn report_tax_year_filter_excludes_other_years() {
    let input = write_transactions(SAME_DAY_SCENARIO);
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    let output = cmd
        .arg("report")
        .arg(input.path())
        .arg("--tax-year")
        .arg("2020")
        .output()
        .expect("run cgt-tool");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report output is valid JSON");
    assert!(report["tax_years"].as_array().expect("tax_years array").is_empty());
}

#[test]
fn report_rejects_malformed_json() {
    let input = write_transactions("not json");
    let mut cmd = cargo_bin_cmd!("cgt-cli");
    cmd.arg("report").arg(input.path()).assert().failure();
}
