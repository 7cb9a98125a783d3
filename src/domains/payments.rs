//! Payment transactions: status, methods, fees, taxes, settlement.

use crate::analysis::aggregator::{
    all_rows, distinct_count, group_by, group_by_category, mean, percentage, rows_where, sum,
    time_buckets, Granularity,
};
use crate::analysis::Registry;
use crate::dataset::coerce::parse_amount;
use crate::dataset::{Column, ColumnSpec, Dataset, Input, Schema};
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Metric, Table, Value};
use anyhow::Result;
use chrono::Timelike;

const PAYMENT_ID: &str = "Payment ID";
const STATUS: &str = "Payment Status";
const METHOD: &str = "Payment Method";
const EMAIL: &str = "Customer Email";
const AMOUNT: &str = "Amount";
const FEE: &str = "Payment Fee";
const TAX: &str = "Tax";
const SETTLEMENT_AMOUNT: &str = "Settlement Amount";
const SETTLEMENT_TAX: &str = "Settlement Tax";
const SETTLEMENT_CURRENCY: &str = "Settlement Currency";
const CREATED_AT: &str = "Created At";
const WALLET_BALANCE: &str = "Net Amount In Wallet After Fees";

/// Derived: tax as a percentage of the pre-tax amount.
pub const TAX_RATE: &str = "Tax Rate (%)";

const SUCCEEDED: &str = "succeeded";
const FAILED: &str = "failed";

pub fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::identifier(PAYMENT_ID),
        ColumnSpec::category(STATUS).lowercased(),
        ColumnSpec::category(METHOD).trimmed(),
        ColumnSpec::category(EMAIL).lowercased(),
        ColumnSpec::amount(AMOUNT),
        ColumnSpec::amount(FEE),
        ColumnSpec::amount(TAX),
        ColumnSpec::amount(SETTLEMENT_AMOUNT),
        ColumnSpec::amount(SETTLEMENT_TAX),
        ColumnSpec::category(SETTLEMENT_CURRENCY).trimmed(),
        ColumnSpec::timestamp(CREATED_AT),
        // Kept as text so a blank balance stays distinguishable from zero.
        ColumnSpec::identifier(WALLET_BALANCE).optional(),
    ])
}

pub fn prepare(input: Input) -> Result<Dataset, LedgerError> {
    let mut ds = Dataset::load(input, &schema())?;

    let tax_rate: Vec<f64> = {
        let amounts = ds.amounts(AMOUNT)?;
        let taxes = ds.amounts(TAX)?;
        amounts
            .iter()
            .zip(taxes)
            .map(|(&a, &t)| percentage(t, a - t))
            .collect()
    };
    ds.insert_derived(TAX_RATE, Column::Amount(tax_rate));

    Ok(ds)
}

pub fn registry() -> Registry {
    let mut r = Registry::new();
    r.register("payment_status_summary", "Payment Status Summary", payment_status_summary)
        .describe("Summary of payments grouped by status with counts, totals, and fees.");
    r.register("payment_method_analysis", "Payment Method Analysis", payment_method_analysis)
        .describe("Performance of each payment method including volume and success rate.");
    r.register("daily_transaction_volume", "Daily Transaction Volume", daily_transaction_volume)
        .describe("Daily transaction counts with total and successful amounts.");
    r.register("customer_analysis", "Customer Analysis", customer_analysis)
        .describe("Per-customer transaction behavior ranked by total amount.");
    r.register("fee_analysis", "Fee Analysis", fee_analysis)
        .describe("Processing fee totals and their share of successful revenue.");
    r.register("hourly_transaction_pattern", "Hourly Transaction Pattern", hourly_transaction_pattern)
        .describe("Transaction counts, average amount and success rate by hour of day.");
    r.register("failed_payment_analysis", "Failed Payment Analysis", failed_payment_analysis)
        .describe("Failed payments by method with lost revenue and affected customers.");
    r.register("wallet_balance_trend", "Wallet Balance Trend", |ds: &Dataset| {
        wallet_balance_trend(ds, 10)
    })
    .describe("Wallet balance after fees for the most recent successful payments.");
    r.register("tax_analysis", "Tax Analysis", tax_analysis)
        .describe("Tax collected on successful payments by method, with an overall total.");
    r.register("settlement_analysis", "Settlement Analysis", settlement_analysis)
        .describe("Differences between original and settled amounts and taxes per settlement currency.");
    r
}

fn succeeded_rows(ds: &Dataset) -> Result<Vec<usize>> {
    let status = ds.categories(STATUS)?;
    Ok(rows_where(ds.len(), |i| status[i] == SUCCEEDED))
}

/// Share of `rows` whose status is `succeeded`, as a percentage.
fn success_rate(status: &[String], rows: &[usize]) -> f64 {
    let ok = rows.iter().filter(|&&i| status[i] == SUCCEEDED).count();
    percentage(ok as f64, rows.len() as f64)
}

fn payment_status_summary(ds: &Dataset) -> Result<AnalysisResult> {
    let status = ds.categories(STATUS)?;
    let amounts = ds.amounts(AMOUNT)?;
    let fees = ds.amounts(FEE)?;

    let mut table = Table::new(&[
        "Payment Status",
        "Transaction Count",
        "Total Amount",
        "Average Amount",
        "Total Fees",
    ]);
    for (state, rows) in group_by_category(status, &all_rows(ds.len())) {
        table.push_row(vec![
            Value::text(state),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
            Value::amount(sum(fees, &rows)),
        ]);
    }
    Ok(table.into())
}

fn payment_method_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let methods = ds.categories(METHOD)?;
    let status = ds.categories(STATUS)?;
    let amounts = ds.amounts(AMOUNT)?;
    let fees = ds.amounts(FEE)?;

    let mut table = Table::new(&[
        "Payment Method",
        "Total Transactions",
        "Total Amount",
        "Average Amount",
        "Total Fees",
        "Average Fee",
        "Success Rate (%)",
    ]);
    for (method, rows) in group_by_category(methods, &all_rows(ds.len())) {
        table.push_row(vec![
            Value::text(method),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
            Value::amount(sum(fees, &rows)),
            Value::amount(mean(fees, &rows)),
            Value::percent(success_rate(status, &rows)),
        ]);
    }
    Ok(table.into())
}

fn daily_transaction_volume(ds: &Dataset) -> Result<AnalysisResult> {
    let created = ds.timestamps(CREATED_AT)?;
    let status = ds.categories(STATUS)?;
    let amounts = ds.amounts(AMOUNT)?;

    let mut table = Table::new(&["Date", "Transaction Count", "Total Amount", "Successful Amount"]);
    for day in time_buckets(created, &all_rows(ds.len()), Granularity::Day, false) {
        let successful: Vec<usize> = day
            .rows
            .iter()
            .copied()
            .filter(|&i| status[i] == SUCCEEDED)
            .collect();
        table.push_row(vec![
            Value::text(day.label),
            Value::count(day.rows.len()),
            Value::amount(sum(amounts, &day.rows)),
            Value::amount(sum(amounts, &successful)),
        ]);
    }
    Ok(table.into())
}

fn customer_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let emails = ds.categories(EMAIL)?;
    let status = ds.categories(STATUS)?;
    let amounts = ds.amounts(AMOUNT)?;
    let fees = ds.amounts(FEE)?;

    let mut groups: Vec<_> = group_by_category(emails, &all_rows(ds.len()))
        .into_iter()
        .collect();
    // Stable sort keeps alphabetical order among equal totals.
    groups.sort_by(|a, b| sum(amounts, &b.1).total_cmp(&sum(amounts, &a.1)));

    let mut table = Table::new(&[
        "Customer Email",
        "Total Transactions",
        "Total Amount",
        "Average Transaction",
        "Successful Payments",
        "Total Fees Paid",
        "Success Rate (%)",
    ]);
    for (email, rows) in groups {
        let ok = rows.iter().filter(|&&i| status[i] == SUCCEEDED).count();
        table.push_row(vec![
            Value::text(email),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
            Value::count(ok),
            Value::amount(sum(fees, &rows)),
            Value::percent(success_rate(status, &rows)),
        ]);
    }
    Ok(table.into())
}

fn fee_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let fees = ds.amounts(FEE)?;
    let successful = succeeded_rows(ds)?;
    if successful.is_empty() {
        return Ok(AnalysisResult::metrics(Vec::new()));
    }

    let revenue = sum(amounts, &successful);
    let total_fees = sum(fees, &successful);

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Successful Revenue", Value::amount(revenue)),
        Metric::new("Total Processing Fees", Value::amount(total_fees)),
        Metric::new("Average Fee per Transaction", Value::amount(mean(fees, &successful))),
        Metric::new("Fee as % of Revenue", Value::percent(percentage(total_fees, revenue))),
        Metric::new("Net Revenue (After Fees)", Value::amount(revenue - total_fees)),
    ]))
}

fn hourly_transaction_pattern(ds: &Dataset) -> Result<AnalysisResult> {
    let created = ds.timestamps(CREATED_AT)?;
    let status = ds.categories(STATUS)?;
    let amounts = ds.amounts(AMOUNT)?;

    let stamped = rows_where(ds.len(), |i| created[i].is_some());
    let by_hour = group_by(&stamped, |i| created[i].map(|ts| ts.hour()).unwrap_or_default());

    let mut table = Table::new(&["Hour", "Transaction Count", "Average Amount", "Success Rate (%)"]);
    for (hour, rows) in by_hour {
        table.push_row(vec![
            Value::count(hour as usize),
            Value::count(rows.len()),
            Value::amount(mean(amounts, &rows)),
            Value::percent(success_rate(status, &rows)),
        ]);
    }
    Ok(table.into())
}

fn failed_payment_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let status = ds.categories(STATUS)?;
    let methods = ds.categories(METHOD)?;
    let emails = ds.categories(EMAIL)?;
    let amounts = ds.amounts(AMOUNT)?;

    let failed = rows_where(ds.len(), |i| status[i] == FAILED);

    let mut table = Table::new(&[
        "Payment Method",
        "Failed Count",
        "Lost Revenue",
        "Average Failed Amount",
        "Affected Customers",
    ]);
    for (method, rows) in group_by_category(methods, &failed) {
        table.push_row(vec![
            Value::text(method),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
            Value::count(distinct_count(emails, &rows)),
        ]);
    }
    Ok(table.into())
}

fn wallet_balance_trend(ds: &Dataset, last: usize) -> Result<AnalysisResult> {
    let mut table = Table::new(&["Transaction", "Date", "Wallet Balance", "Balance Change"]);
    if !ds.has_column(WALLET_BALANCE) {
        return Ok(table.into());
    }

    let ids = ds.identifiers(PAYMENT_ID)?;
    let balances: Vec<Option<f64>> = ds
        .identifiers(WALLET_BALANCE)?
        .iter()
        .map(|cell| cell.as_deref().and_then(parse_amount))
        .collect();
    let created = ds.timestamps(CREATED_AT)?;

    // Payments without a recorded balance take no part in the trend.
    let mut ordered: Vec<(usize, f64)> = succeeded_rows(ds)?
        .into_iter()
        .filter_map(|i| balances[i].map(|b| (i, b)))
        .collect();
    // Undated payments sort last; equal stamps keep file order.
    ordered.sort_by_key(|&(i, _)| (created[i].is_none(), created[i]));

    let skip = ordered.len().saturating_sub(last);
    for (position, &(i, balance)) in ordered.iter().enumerate().skip(skip) {
        let change = match position.checked_sub(1) {
            Some(prev) => Value::amount(balance - ordered[prev].1),
            None => Value::Empty,
        };
        let date = created[i]
            .map(|ts| Value::text(ts.format("%Y-%m-%d %H:%M").to_string()))
            .unwrap_or(Value::Empty);
        table.push_row(vec![
            ids[i].as_deref().map(Value::text).unwrap_or(Value::Empty),
            date,
            Value::amount(balance),
            change,
        ]);
    }
    Ok(table.into())
}

fn tax_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let methods = ds.categories(METHOD)?;
    let amounts = ds.amounts(AMOUNT)?;
    let taxes = ds.amounts(TAX)?;
    let rates = ds.amounts(TAX_RATE)?;
    let successful = succeeded_rows(ds)?;

    let mut table = Table::new(&[
        "Payment Method",
        "Total Tax Collected",
        "Average Tax per Transaction",
        "Average Tax Rate (%)",
        "Total Gross Amount",
    ]);
    if successful.is_empty() {
        return Ok(table.into());
    }

    let mut push = |label: &str, rows: &[usize]| {
        table.push_row(vec![
            Value::text(label),
            Value::amount(sum(taxes, rows)),
            Value::amount(mean(taxes, rows)),
            Value::percent(mean(rates, rows)),
            Value::amount(sum(amounts, rows)),
        ]);
    };
    for (method, rows) in group_by_category(methods, &successful) {
        push(method, &rows);
    }
    push("TOTAL", &successful);

    Ok(table.into())
}

fn settlement_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let currencies = ds.categories(SETTLEMENT_CURRENCY)?;
    let amounts = ds.amounts(AMOUNT)?;
    let taxes = ds.amounts(TAX)?;
    let settled = ds.amounts(SETTLEMENT_AMOUNT)?;
    let settled_tax = ds.amounts(SETTLEMENT_TAX)?;
    let successful = succeeded_rows(ds)?;

    let amount_diff: Vec<f64> = amounts.iter().zip(settled).map(|(a, s)| s - a).collect();
    let tax_diff: Vec<f64> = taxes.iter().zip(settled_tax).map(|(t, s)| s - t).collect();

    let mut table = Table::new(&[
        "Settlement Currency",
        "Original Amount",
        "Settlement Amount",
        "Total Amount Diff",
        "Avg Amount Diff",
        "Original Tax",
        "Settlement Tax",
        "Total Tax Diff",
        "Avg Tax Diff",
        "Transaction Count",
    ]);
    for (currency, rows) in group_by_category(currencies, &successful) {
        table.push_row(vec![
            Value::text(currency),
            Value::amount(sum(amounts, &rows)),
            Value::amount(sum(settled, &rows)),
            Value::amount(sum(&amount_diff, &rows)),
            Value::amount(mean(&amount_diff, &rows)),
            Value::amount(sum(taxes, &rows)),
            Value::amount(sum(settled_tax, &rows)),
            Value::amount(sum(&tax_diff, &rows)),
            Value::amount(mean(&tax_diff, &rows)),
            Value::count(rows.len()),
        ]);
    }
    Ok(table.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::raw;

    const HEADERS: &[&str] = &[
        "Payment ID",
        "Payment Status",
        "Payment Method",
        "Customer Email",
        "Amount",
        "Payment Fee",
        "Tax",
        "Settlement Amount",
        "Settlement Tax",
        "Settlement Currency",
        "Created At",
        "Net Amount In Wallet After Fees",
    ];

    fn sample() -> Dataset {
        prepare(Input::table(raw(
            HEADERS,
            &[
                &["p1", "Succeeded", "upi", "A@x.com", "118", "2", "18", "118", "18", "INR", "2024-03-01 10:15:00", "116"],
                &["p2", "failed", "card", "b@x.com", "50", "0", "0", "0", "0", "INR", "2024-03-01 11:00:00", ""],
                &["p3", "succeeded", "card", " a@x.com", "200", "4", "0", "190", "0", "USD", "2024-03-02 10:45:00", "312"],
                &["p4", "failed", "card", "c@x.com", "30", "0", "0", "0", "0", "INR", "2024-03-02 12:00:00", ""],
            ],
        )))
        .unwrap()
    }

    fn run(id: &str, ds: &Dataset) -> AnalysisResult {
        registry().get(id).unwrap().run(ds).unwrap()
    }

    #[test]
    fn test_tax_rate_derived_and_zero_guarded() {
        let ds = sample();
        let rates = ds.amounts(TAX_RATE).unwrap();
        assert!((rates[0] - 18.0).abs() < 1e-9);
        assert_eq!(rates[1], 0.0);

        let zero = prepare(Input::table(raw(
            HEADERS,
            &[&["p", "succeeded", "upi", "a", "0", "0", "0", "0", "0", "INR", "", ""]],
        )))
        .unwrap();
        assert_eq!(zero.amounts(TAX_RATE).unwrap(), &[0.0]);
    }

    #[test]
    fn test_status_is_normalized() {
        let result = run("payment_status_summary", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, "Payment Status"), Some(&Value::text("succeeded")));
        assert_eq!(table.cell(1, "Total Amount"), Some(&Value::Amount(318.0)));
    }

    #[test]
    fn test_method_success_rate() {
        let result = run("payment_method_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Payment Method"), Some(&Value::text("card")));
        assert_eq!(table.cell(0, "Success Rate (%)"), Some(&Value::Percent(33.33)));
        assert_eq!(table.cell(1, "Success Rate (%)"), Some(&Value::Percent(100.0)));
    }

    #[test]
    fn test_customer_emails_merge_after_normalization() {
        let result = run("customer_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(0, "Customer Email"), Some(&Value::text("a@x.com")));
        assert_eq!(table.cell(0, "Total Transactions"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_fee_analysis() {
        let result = run("fee_analysis", &sample());
        assert_eq!(result.metric("Total Processing Fees"), Some(&Value::Amount(6.0)));
        assert_eq!(result.metric("Net Revenue (After Fees)"), Some(&Value::Amount(312.0)));
    }

    #[test]
    fn test_failed_payments() {
        let result = run("failed_payment_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "Lost Revenue"), Some(&Value::Amount(80.0)));
        assert_eq!(table.cell(0, "Affected Customers"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_daily_and_hourly() {
        let ds = sample();
        let daily = run("daily_transaction_volume", &ds);
        let table = daily.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Successful Amount"), Some(&Value::Amount(118.0)));

        let hourly = run("hourly_transaction_pattern", &ds);
        let table = hourly.as_table().unwrap();
        assert_eq!(table.cell(0, "Hour"), Some(&Value::Int(10)));
        assert_eq!(table.cell(0, "Transaction Count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_wallet_trend() {
        let result = run("wallet_balance_trend", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Balance Change"), Some(&Value::Empty));
        assert_eq!(table.cell(1, "Balance Change"), Some(&Value::Amount(196.0)));
        assert_eq!(table.cell(0, "Transaction"), Some(&Value::text("p1")));
        assert_eq!(table.cell(1, "Transaction"), Some(&Value::text("p3")));
    }

    #[test]
    fn test_wallet_trend_skips_blank_balances() {
        let ds = prepare(Input::table(raw(
            HEADERS,
            &[
                &["pay_A", "succeeded", "upi", "a@x.com", "100", "0", "0", "100", "0", "INR", "2024-03-01 09:00:00", "500"],
                &["pay_B", "succeeded", "upi", "a@x.com", "100", "0", "0", "100", "0", "INR", "2024-03-01 10:00:00", ""],
                &["pay_C", "succeeded", "card", "b@x.com", "100", "0", "0", "100", "0", "INR", "2024-03-01 11:00:00", "650"],
            ],
        )))
        .unwrap();

        let result = run("wallet_balance_trend", &ds);
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Transaction"), Some(&Value::text("pay_A")));
        assert_eq!(table.cell(1, "Transaction"), Some(&Value::text("pay_C")));
        assert_eq!(table.cell(1, "Balance Change"), Some(&Value::Amount(150.0)));
    }

    #[test]
    fn test_settlement_difference_is_settled_minus_charged() {
        let ds = prepare(Input::table(raw(
            HEADERS,
            &[&["p", "succeeded", "card", "a@x.com", "200", "0", "10", "190", "8", "USD", "2024-03-01 09:00:00", ""]],
        )))
        .unwrap();

        let result = run("settlement_analysis", &ds);
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Total Amount Diff"), Some(&Value::Amount(-10.0)));
        assert_eq!(table.cell(0, "Total Tax Diff"), Some(&Value::Amount(-2.0)));
    }

    #[test]
    fn test_tax_total_row() {
        let result = run("tax_analysis", &sample());
        let table = result.as_table().unwrap();
        let last = table.len() - 1;
        assert_eq!(table.cell(last, "Payment Method"), Some(&Value::text("TOTAL")));
        assert_eq!(table.cell(last, "Total Tax Collected"), Some(&Value::Amount(18.0)));
    }

    #[test]
    fn test_settlement_differences() {
        let ds = sample();
        let result = run("settlement_analysis", &ds);
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(1, "Settlement Currency"), Some(&Value::text("USD")));
        assert_eq!(table.cell(1, "Total Amount Diff"), Some(&Value::Amount(-10.0)));
        assert_eq!(table.cell(1, "Avg Amount Diff"), Some(&Value::Amount(-10.0)));
        assert!(!ds.has_column("Amount Diff"));
    }
}
