//! Ledger entries (account summary): credits, debits, payouts, fees, taxes.

use super::matches_event;
use crate::analysis::aggregator::{
    all_rows, distinct_count, group_by, group_by_category, mean, percentage, ratio, rows_where,
    sum, time_buckets, top_n, Granularity, Pivot, Stats,
};
use crate::analysis::Registry;
use crate::dataset::{Column, ColumnSpec, Dataset, Input, Schema};
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Metric, Table, Value};
use anyhow::Result;

const ENTRY_ID: &str = "Ledger Entry ID";
const EVENT_TYPE: &str = "Event Type";
const AMOUNT: &str = "Amount";
const CURRENCY: &str = "Currency";
const IS_CREDIT: &str = "Is Credit";
const CREATED_AT: &str = "Created At";
const PAYOUT_ID: &str = "Payout ID";
const REFERENCE_ID: &str = "Reference Object ID";

/// Derived: amount with the sign of its direction (credit positive).
pub const SIGNED_AMOUNT: &str = "Signed Amount";

pub fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::identifier(ENTRY_ID),
        ColumnSpec::category(EVENT_TYPE).trimmed(),
        ColumnSpec::amount(AMOUNT),
        ColumnSpec::category(CURRENCY).trimmed(),
        ColumnSpec::flag(IS_CREDIT),
        ColumnSpec::timestamp(CREATED_AT).optional(),
        ColumnSpec::identifier(PAYOUT_ID).optional(),
        ColumnSpec::identifier(REFERENCE_ID).optional(),
    ])
}

pub fn prepare(input: Input) -> Result<Dataset, LedgerError> {
    let mut ds = Dataset::load(input, &schema())?;

    let signed: Vec<f64> = {
        let amounts = ds.amounts(AMOUNT)?;
        let credit = ds.flags(IS_CREDIT)?;
        amounts
            .iter()
            .zip(credit)
            .map(|(&a, &c)| if c { a } else { -a })
            .collect()
    };
    ds.insert_derived(SIGNED_AMOUNT, Column::Amount(signed));

    Ok(ds)
}

pub fn registry() -> Registry {
    let mut r = Registry::new();
    r.register("total_credits_debits", "Total Credits Debits", total_credits_debits)
        .describe("Shows total credited and debited amounts across all transactions.");
    r.register("net_revenue_over_time", "Net Revenue Over Time", |ds: &Dataset| {
        net_revenue_over_time(ds, Granularity::Month)
    })
    .describe("Tracks net revenue trend over time (Credits - Debits), by month.");
    r.register("event_type_summary", "Event Type Summary", event_type_summary)
        .describe("Summarizes total amount and count by event type.");
    r.register("top_transactions", "Top Transactions", |ds: &Dataset| top_transactions(ds, 10))
        .describe("Shows top-N largest transactions by absolute amount.");
    r.register("daily_statistics", "Daily Statistics", daily_statistics)
        .describe("Provides daily average transaction volume, volatility, and peak performance metrics.");
    r.register("payout_analysis", "Payout Analysis", payout_analysis)
        .describe("Summarizes total amounts linked with Payout IDs versus transactions without payout linkage.");
    r.register("currency_breakdown", "Currency Breakdown", currency_breakdown)
        .describe("Shows distribution of transactions across currencies separating credits and debits.");
    r.register("refund_analysis", "Refund Analysis", refund_analysis)
        .describe("Calculates refund metrics including ratio, volume, and impact assessment.");
    r.register("tax_impact_analysis", "Tax Impact Analysis", tax_impact_analysis)
        .describe("Aggregates tax and tax reversal events to evaluate tax burden and reversals.");
    r.register("transaction_size_analysis", "Transaction Size Analysis", transaction_size_analysis)
        .describe("Analyzes transaction sizes segmented by credit/debit type with distribution metrics.");
    r.register("monthly_trend_analysis", "Monthly Trend Analysis", monthly_trend_analysis)
        .describe("Analyzes month-over-month trends in transaction volume and value.");
    r.register("fee_structure_analysis", "Fee Structure Analysis", fee_structure_analysis)
        .describe("Analyzes processing fees, patterns, and cost structure across fee types.");
    r.register("reference_object_analysis", "Reference Object Analysis", reference_object_analysis)
        .describe("Analyzes transaction patterns by reference object type.");
    r
}

fn direction_label(credit: bool) -> &'static str {
    if credit {
        "Credits"
    } else {
        "Debits"
    }
}

fn total_credits_debits(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let credit = ds.flags(IS_CREDIT)?;

    let mut table = Table::new(&["Type", "Total Amount"]);
    for (is_credit, rows) in group_by(&all_rows(ds.len()), |i| credit[i]) {
        table.push_row(vec![
            Value::text(direction_label(is_credit)),
            Value::amount(sum(amounts, &rows)),
        ]);
    }
    Ok(table.into())
}

fn net_revenue_over_time(ds: &Dataset, granularity: Granularity) -> Result<AnalysisResult> {
    let mut table = Table::new(&["Period", "Net Revenue"]);
    if ds.is_empty() || !ds.has_column(CREATED_AT) {
        return Ok(table.into());
    }

    let signed = ds.amounts(SIGNED_AMOUNT)?;
    let created = ds.timestamps(CREATED_AT)?;

    for period in time_buckets(created, &all_rows(ds.len()), granularity, true) {
        table.push_row(vec![
            Value::text(period.label),
            Value::amount(sum(signed, &period.rows)),
        ]);
    }
    Ok(table.into())
}

fn event_type_summary(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let events = ds.categories(EVENT_TYPE)?;

    let mut groups: Vec<_> = group_by_category(events, &all_rows(ds.len()))
        .into_iter()
        .map(|(event, rows)| (event, sum(amounts, &rows), rows.len()))
        .collect();
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut table = Table::new(&["Event Type", "Total Amount", "Transaction Count"]);
    for (event, total, count) in groups {
        table.push_row(vec![Value::text(event), Value::amount(total), Value::count(count)]);
    }
    Ok(table.into())
}

fn top_transactions(ds: &Dataset, n: usize) -> Result<AnalysisResult> {
    let ids = ds.identifiers(ENTRY_ID)?;
    let events = ds.categories(EVENT_TYPE)?;
    let amounts = ds.amounts(AMOUNT)?;
    let currencies = ds.categories(CURRENCY)?;
    let credit = ds.flags(IS_CREDIT)?;
    let created = ds.timestamps(CREATED_AT).ok();

    let mut table = Table::new(&[
        "Ledger Entry ID",
        "Event Type",
        "Amount",
        "Currency",
        "Is Credit",
        "Created At",
    ]);
    for i in top_n(&all_rows(ds.len()), |i| amounts[i].abs(), n) {
        let created_at = created
            .and_then(|c| c[i])
            .map(|ts| Value::text(ts.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Empty);
        table.push_row(vec![
            ids[i].clone().map(Value::Text).unwrap_or(Value::Empty),
            Value::text(&events[i]),
            Value::amount(amounts[i]),
            Value::text(&currencies[i]),
            Value::text(if credit[i] { "Credit" } else { "Debit" }),
            created_at,
        ]);
    }
    Ok(table.into())
}

fn daily_statistics(ds: &Dataset) -> Result<AnalysisResult> {
    if ds.is_empty() || !ds.has_column(CREATED_AT) {
        return Ok(AnalysisResult::metrics(Vec::new()));
    }

    let amounts = ds.amounts(AMOUNT)?;
    let created = ds.timestamps(CREATED_AT)?;
    let days = time_buckets(created, &all_rows(ds.len()), Granularity::Day, true);
    if days.is_empty() {
        return Ok(AnalysisResult::metrics(Vec::new()));
    }

    let mut totals: Vec<f64> = days.iter().map(|d| sum(amounts, &d.rows)).collect();
    // First day holding the maximum, as an index-of-max would report it.
    let peak = totals
        .iter()
        .enumerate()
        .fold(0, |best, (i, &v)| if v > totals[best] { i } else { best });
    let peak_date = days[peak].label.clone();
    let active_days = totals.iter().filter(|&&v| v != 0.0).count();
    let stats = Stats::from_values(&mut totals);

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Average Daily Amount", Value::amount(stats.mean)),
        Metric::new("Daily Standard Deviation", Value::amount(stats.std_dev)),
        Metric::new("Maximum Day Value", Value::amount(stats.max)),
        Metric::new("Maximum Day Date", Value::text(peak_date)),
        Metric::new("Minimum Day Value", Value::amount(stats.min)),
        Metric::new("Total Active Days", Value::count(active_days)),
    ]))
}

fn payout_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let payouts = ds.identifiers(PAYOUT_ID)?;

    let mut table = Table::new(&["Payout Status", "Total Amount", "Transaction Count"]);
    for (linked, rows) in group_by(&all_rows(ds.len()), |i| payouts[i].is_some()) {
        let label = if linked { "With Payout" } else { "Without Payout" };
        table.push_row(vec![
            Value::text(label),
            Value::amount(sum(amounts, &rows)),
            Value::count(rows.len()),
        ]);
    }
    Ok(table.into())
}

fn currency_breakdown(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let currencies = ds.categories(CURRENCY)?;
    let credit = ds.flags(IS_CREDIT)?;

    let pivot = Pivot::sum(
        &all_rows(ds.len()),
        |i| currencies[i].clone(),
        |i| direction_label(credit[i]).to_string(),
        amounts,
    );

    let mut table = Table::new(&["Currency", "Credits", "Debits", "Net Amount"]);
    for currency in pivot.row_keys() {
        let credits = pivot.get(currency, "Credits");
        let debits = pivot.get(currency, "Debits");
        table.push_row(vec![
            Value::text(currency),
            Value::amount(credits),
            Value::amount(debits),
            Value::amount(credits - debits),
        ]);
    }
    Ok(table.into())
}

fn refund_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let events = ds.categories(EVENT_TYPE)?;

    let refunds = rows_where(ds.len(), |i| matches_event(&events[i], "refund"));
    let refund_amount = sum(amounts, &refunds);
    let refund_count = refunds.len();
    let total_amount = sum(amounts, &all_rows(ds.len()));
    let total_count = ds.len();

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Refund Amount", Value::amount(refund_amount)),
        Metric::new("Total Refund Count", Value::count(refund_count)),
        Metric::new(
            "Refund Ratio (Amount)",
            Value::percent(percentage(refund_amount, total_amount)),
        ),
        Metric::new(
            "Refund Ratio (Count)",
            Value::percent(percentage(refund_count as f64, total_count as f64)),
        ),
        Metric::new(
            "Average Refund Size",
            Value::amount(ratio(refund_amount, refund_count as f64)),
        ),
    ]))
}

/// Count, total and mean of `Amount` per event type, for events whose name
/// contains `needle`.
fn event_family_table(ds: &Dataset, needle: &str, columns: &[&str]) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let events = ds.categories(EVENT_TYPE)?;

    let mut table = Table::new(columns);
    let matching = rows_where(ds.len(), |i| matches_event(&events[i], needle));
    for (event, rows) in group_by_category(events, &matching) {
        table.push_row(vec![
            Value::text(event),
            Value::amount(sum(amounts, &rows)),
            Value::count(rows.len()),
            Value::amount(mean(amounts, &rows)),
        ]);
    }
    Ok(table.into())
}

fn tax_impact_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    event_family_table(
        ds,
        "tax",
        &["Tax Event Type", "Total Amount", "Transaction Count", "Average Amount"],
    )
}

fn fee_structure_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    event_family_table(
        ds,
        "fee",
        &["Fee Type", "Total Fees", "Transaction Count", "Average Fee"],
    )
}

fn transaction_size_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let credit = ds.flags(IS_CREDIT)?;

    let mut table = Table::new(&[
        "Transaction Type",
        "Average Amount",
        "Median Amount",
        "Standard Deviation",
        "Minimum Amount",
        "Maximum Amount",
        "Transaction Count",
    ]);
    for (is_credit, rows) in group_by(&all_rows(ds.len()), |i| credit[i]) {
        let stats = Stats::of(amounts, &rows);
        table.push_row(vec![
            Value::text(direction_label(is_credit)),
            Value::amount(stats.mean),
            Value::amount(stats.median),
            Value::amount(stats.std_dev),
            Value::amount(stats.min),
            Value::amount(stats.max),
            Value::count(stats.count),
        ]);
    }
    Ok(table.into())
}

fn monthly_trend_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let mut table = Table::new(&["Month", "Transaction Count", "Total Amount", "Average Amount"]);
    if ds.is_empty() || !ds.has_column(CREATED_AT) {
        return Ok(table.into());
    }

    let amounts = ds.amounts(AMOUNT)?;
    let created = ds.timestamps(CREATED_AT)?;
    for period in time_buckets(created, &all_rows(ds.len()), Granularity::Month, true) {
        table.push_row(vec![
            Value::text(period.label),
            Value::count(period.rows.len()),
            Value::amount(sum(amounts, &period.rows)),
            Value::amount(mean(amounts, &period.rows)),
        ]);
    }
    Ok(table.into())
}

/// Leading run of ASCII letters and underscores, e.g. `ch_` in `ch_3Nx9`.
fn reference_prefix(id: &str) -> &str {
    let end = id
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphabetic() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

fn reference_object_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let mut table = Table::new(&[
        "Reference Type",
        "Unique Objects",
        "Total Transactions",
        "Total Amount",
        "Average Amount per Object",
    ]);
    if !ds.has_column(REFERENCE_ID) {
        return Ok(table.into());
    }

    let amounts = ds.amounts(AMOUNT)?;
    let references = ds.identifiers(REFERENCE_ID)?;

    let linked = rows_where(ds.len(), |i| references[i].is_some());
    let groups = group_by(&linked, |i| {
        let id = references[i].as_deref().unwrap_or_default();
        match reference_prefix(id) {
            "" => "other",
            prefix => prefix,
        }
    });

    for (kind, rows) in groups {
        let unique = distinct_count(references, &rows);
        let total = sum(amounts, &rows);
        table.push_row(vec![
            Value::text(kind),
            Value::count(unique),
            Value::count(rows.len()),
            Value::amount(total),
            Value::amount(ratio(total, unique as f64)),
        ]);
    }
    Ok(table.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::raw;

    const HEADERS: &[&str] = &[
        "Ledger Entry ID",
        "Event Type",
        "Amount",
        "Currency",
        "Is Credit",
        "Created At",
        "Payout ID",
        "Reference Object ID",
    ];

    fn scenario() -> Dataset {
        prepare(Input::table(raw(
            HEADERS,
            &[
                &["le_1", "payment", "100", "INR", "True", "2024-01-05 10:00:00", "po_1", "ch_1"],
                &["le_2", "payment", "50", "INR", "True", "2024-01-20 12:00:00", "", "ch_2"],
                &["le_3", "refund", "30", "USD", "False", "2024-01-21 09:30:00", "", "re_1"],
            ],
        )))
        .unwrap()
    }

    fn run(id: &str, ds: &Dataset) -> AnalysisResult {
        registry().get(id).unwrap().run(ds).unwrap()
    }

    #[test]
    fn test_signed_amount_is_derived() {
        let ds = scenario();
        assert_eq!(ds.amounts(SIGNED_AMOUNT).unwrap(), &[100.0, 50.0, -30.0]);
    }

    #[test]
    fn test_credit_debit_totals_scenario() {
        let result = run("total_credits_debits", &scenario());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Type"), Some(&Value::text("Debits")));
        assert_eq!(table.cell(0, "Total Amount"), Some(&Value::Amount(30.0)));
        assert_eq!(table.cell(1, "Type"), Some(&Value::text("Credits")));
        assert_eq!(table.cell(1, "Total Amount"), Some(&Value::Amount(150.0)));
    }

    #[test]
    fn test_monthly_net_revenue_scenario() {
        let result = run("net_revenue_over_time", &scenario());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "Period"), Some(&Value::text("2024-01")));
        assert_eq!(table.cell(0, "Net Revenue"), Some(&Value::Amount(120.0)));
    }

    #[test]
    fn test_event_summary_additivity() {
        let ds = scenario();
        let result = run("event_type_summary", &ds);
        let table = result.as_table().unwrap();
        let grouped: f64 = table
            .column_values("Total Amount")
            .iter()
            .filter_map(|v| v.as_f64())
            .sum();
        assert_eq!(grouped, sum(ds.amounts(AMOUNT).unwrap(), &all_rows(ds.len())));
        assert_eq!(table.cell(0, "Event Type"), Some(&Value::text("payment")));
    }

    #[test]
    fn test_top_transactions_limit() {
        let ds = scenario();
        let table = top_transactions(&ds, 2).unwrap();
        let table = table.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Ledger Entry ID"), Some(&Value::text("le_1")));
        assert_eq!(table.cell(1, "Is Credit"), Some(&Value::text("Credit")));
    }

    #[test]
    fn test_refund_metrics_zero_denominator() {
        let ds = prepare(Input::table(raw(HEADERS, &[]))).unwrap();
        let result = run("refund_analysis", &ds);
        assert_eq!(result.metric("Refund Ratio (Amount)"), Some(&Value::Percent(0.0)));
        assert_eq!(result.metric("Refund Ratio (Count)"), Some(&Value::Percent(0.0)));
        assert_eq!(result.metric("Average Refund Size"), Some(&Value::Amount(0.0)));
    }

    #[test]
    fn test_refund_metrics() {
        let result = run("refund_analysis", &scenario());
        assert_eq!(result.metric("Total Refund Amount"), Some(&Value::Amount(30.0)));
        assert_eq!(result.metric("Refund Ratio (Amount)"), Some(&Value::Percent(16.67)));
    }

    #[test]
    fn test_currency_pivot_fills_missing_side() {
        let result = run("currency_breakdown", &scenario());
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Currency"), Some(&Value::text("INR")));
        assert_eq!(table.cell(0, "Debits"), Some(&Value::Amount(0.0)));
        assert_eq!(table.cell(1, "Net Amount"), Some(&Value::Amount(-30.0)));
    }

    #[test]
    fn test_payouts_and_references() {
        let ds = scenario();
        let payouts = run("payout_analysis", &ds);
        let table = payouts.as_table().unwrap();
        assert_eq!(table.cell(0, "Payout Status"), Some(&Value::text("Without Payout")));
        assert_eq!(table.cell(0, "Transaction Count"), Some(&Value::Int(2)));

        let refs = run("reference_object_analysis", &ds);
        let table = refs.as_table().unwrap();
        assert_eq!(table.column_values("Reference Type").len(), 2);
        assert_eq!(table.cell(0, "Reference Type"), Some(&Value::text("ch_")));
        assert_eq!(table.cell(0, "Unique Objects"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_missing_optional_timestamp_yields_empty_results() {
        let ds = prepare(Input::table(raw(
            &["Ledger Entry ID", "Event Type", "Amount", "Currency", "Is Credit"],
            &[&["a", "fee", "2", "INR", "false"]],
        )))
        .unwrap();

        assert!(run("net_revenue_over_time", &ds).is_empty());
        assert!(run("daily_statistics", &ds).is_empty());
        assert!(run("monthly_trend_analysis", &ds).is_empty());
        assert!(run("reference_object_analysis", &ds).is_empty());
        assert!(registry().get("payout_analysis").unwrap().run(&ds).is_err());
    }

    #[test]
    fn test_daily_statistics() {
        let result = run("daily_statistics", &scenario());
        assert_eq!(result.metric("Maximum Day Value"), Some(&Value::Amount(100.0)));
        assert_eq!(result.metric("Maximum Day Date"), Some(&Value::text("2024-01-05")));
        assert_eq!(result.metric("Minimum Day Value"), Some(&Value::Amount(0.0)));
        assert_eq!(result.metric("Total Active Days"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_reference_prefix() {
        assert_eq!(reference_prefix("ch_3Nx9"), "ch_");
        assert_eq!(reference_prefix("po_abc"), "po_abc");
        assert_eq!(reference_prefix("123"), "");
    }
}
