//! Refunds: status, reasons, fees, customers, timing and size distribution.

use crate::analysis::aggregator::{
    all_rows, group_by, group_by_category, mean, percentage, sum, time_buckets, Granularity,
    Segmentation,
};
use crate::analysis::Registry;
use crate::dataset::{Column, ColumnSpec, Dataset, Input, Schema};
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Metric, Table, Value};
use anyhow::Result;

const REFUND_ID: &str = "Refund ID";
const STATUS: &str = "Refund Status";
const REFUND_TYPE: &str = "Refund Type";
const REASON: &str = "Refund Reason";
const METHOD: &str = "Payment Method";
const METHOD_TYPE: &str = "Payment Method Type";
const CUSTOMER_NAME: &str = "Customer Name";
const CUSTOMER_EMAIL: &str = "Customer Email";
const CURRENCY: &str = "Refund Currency";
const AMOUNT: &str = "Refund Amount";
const SETTLEMENT_AMOUNT: &str = "Refund Settlement Amount";
const SETTLEMENT_TAX: &str = "Refund Settlement Tax";
const FEE: &str = "Refund Fee";
const CREATED_AT: &str = "Refund Created At";

/// Derived: refund amount minus the refund fee.
pub const NET_REFUND: &str = "Net Refund Amount";
/// Derived: refund fee as a percentage of the refund amount.
pub const FEE_PERCENTAGE: &str = "Fee Percentage";

pub fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::identifier(REFUND_ID),
        ColumnSpec::category(STATUS).trimmed(),
        ColumnSpec::category(REFUND_TYPE).trimmed(),
        ColumnSpec::category(REASON).trimmed(),
        ColumnSpec::category(METHOD).trimmed(),
        ColumnSpec::category(METHOD_TYPE).trimmed(),
        ColumnSpec::category(CUSTOMER_NAME).trimmed(),
        ColumnSpec::category(CUSTOMER_EMAIL).lowercased(),
        ColumnSpec::category(CURRENCY).trimmed(),
        ColumnSpec::amount(AMOUNT),
        ColumnSpec::amount(SETTLEMENT_AMOUNT),
        ColumnSpec::amount(SETTLEMENT_TAX),
        ColumnSpec::amount(FEE),
        ColumnSpec::timestamp(CREATED_AT).optional(),
    ])
}

pub fn prepare(input: Input) -> Result<Dataset, LedgerError> {
    let mut ds = Dataset::load(input, &schema())?;

    let (net, fee_pct): (Vec<f64>, Vec<f64>) = {
        let amounts = ds.amounts(AMOUNT)?;
        let fees = ds.amounts(FEE)?;
        amounts
            .iter()
            .zip(fees)
            .map(|(&a, &f)| (a - f, percentage(f, a)))
            .unzip()
    };
    ds.insert_derived(NET_REFUND, Column::Amount(net));
    ds.insert_derived(FEE_PERCENTAGE, Column::Amount(fee_pct));

    Ok(ds)
}

pub fn registry() -> Registry {
    let mut r = Registry::new();
    r.register("refund_status_summary", "Refund Status Summary", refund_status_summary)
        .describe("Breakdown of refunds by their current status with counts and amounts.");
    r.register("refund_type_breakdown", "Refund Type Breakdown", refund_type_breakdown)
        .describe("Distribution of refunds by type showing share of total refund value.");
    r.register(
        "payment_method_refund_analysis",
        "Payment Method Refund Analysis",
        payment_method_refund_analysis,
    )
    .describe("Refund patterns across payment methods and method types.");
    r.register("refund_fees_analysis", "Refund Fees Analysis", refund_fees_analysis)
        .describe("Fees charged on refunds and their impact on net refund amounts.");
    r.register("refund_reasons_analysis", "Refund Reasons Analysis", refund_reasons_analysis)
        .describe("Most common refund reasons ranked by frequency.");
    r.register("customer_refund_patterns", "Customer Refund Patterns", customer_refund_patterns)
        .describe("Customers ranked by number and value of refunds received.");
    r.register("refund_timeline_analysis", "Refund Timeline Analysis", |ds: &Dataset| {
        refund_timeline_analysis(ds, Granularity::Day)
    })
    .describe("Refund counts and amounts over time, by day.");
    r.register(
        "settlement_vs_refund_analysis",
        "Settlement Vs Refund Analysis",
        settlement_vs_refund_analysis,
    )
    .describe("Comparison of refunded amounts with settled amounts and settlement tax.");
    r.register("currency_wise_refunds", "Currency Wise Refunds", currency_wise_refunds)
        .describe("Refund counts and amounts per refund currency.");
    r.register("refund_size_distribution", "Refund Size Distribution", refund_size_distribution)
        .describe("Distribution of refunds across amount ranges.");
    r
}

/// Count, total and mean refund amount per value of one categorical column.
fn count_total_avg(ds: &Dataset, column: &str, headers: [&str; 4]) -> Result<AnalysisResult> {
    let keys = ds.categories(column)?;
    let amounts = ds.amounts(AMOUNT)?;

    let mut table = Table::new(&headers);
    for (key, rows) in group_by_category(keys, &all_rows(ds.len())) {
        table.push_row(vec![
            Value::text(key),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
        ]);
    }
    Ok(table.into())
}

fn refund_status_summary(ds: &Dataset) -> Result<AnalysisResult> {
    count_total_avg(ds, STATUS, ["Refund Status", "Count", "Total Amount", "Average Amount"])
}

fn currency_wise_refunds(ds: &Dataset) -> Result<AnalysisResult> {
    count_total_avg(ds, CURRENCY, ["Currency", "Count", "Total Amount", "Avg Amount"])
}

fn refund_type_breakdown(ds: &Dataset) -> Result<AnalysisResult> {
    let types = ds.categories(REFUND_TYPE)?;
    let amounts = ds.amounts(AMOUNT)?;
    let rows = all_rows(ds.len());
    let total = sum(amounts, &rows);

    let mut table = Table::new(&["Refund Type", "Count", "Total Amount", "Percentage of Total"]);
    for (kind, group) in group_by_category(types, &rows) {
        let amount = sum(amounts, &group);
        table.push_row(vec![
            Value::text(kind),
            Value::count(group.len()),
            Value::amount(amount),
            Value::percent(percentage(amount, total)),
        ]);
    }
    Ok(table.into())
}

fn payment_method_refund_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let methods = ds.categories(METHOD)?;
    let method_types = ds.categories(METHOD_TYPE)?;
    let amounts = ds.amounts(AMOUNT)?;

    let groups = group_by(&all_rows(ds.len()), |i| {
        (methods[i].as_str(), method_types[i].as_str())
    });

    let mut table = Table::new(&[
        "Payment Method",
        "Payment Method Type",
        "Count",
        "Total Amount",
        "Avg Amount",
    ]);
    for ((method, method_type), rows) in groups {
        table.push_row(vec![
            Value::text(method),
            Value::text(method_type),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
        ]);
    }
    Ok(table.into())
}

fn refund_fees_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    if ds.is_empty() {
        return Ok(AnalysisResult::metrics(Vec::new()));
    }

    let rows = all_rows(ds.len());
    let amounts = ds.amounts(AMOUNT)?;
    let fees = ds.amounts(FEE)?;
    let fee_pct = ds.amounts(FEE_PERCENTAGE)?;
    let net = ds.amounts(NET_REFUND)?;

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Refund Fees", Value::amount(sum(fees, &rows))),
        Metric::new("Average Refund Fee", Value::amount(mean(fees, &rows))),
        Metric::new("Average Fee Percentage", Value::percent(mean(fee_pct, &rows))),
        Metric::new("Total Gross Refund Amount", Value::amount(sum(amounts, &rows))),
        Metric::new("Total Net Refund Amount", Value::amount(sum(net, &rows))),
    ]))
}

fn refund_reasons_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let reasons = ds.categories(REASON)?;
    let amounts = ds.amounts(AMOUNT)?;

    let mut groups: Vec<_> = group_by_category(reasons, &all_rows(ds.len()))
        .into_iter()
        .collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut table = Table::new(&[
        "Refund Reason",
        "Count",
        "Total Amount",
        "Avg Amount",
        "Percentage of Cases",
    ]);
    for (reason, rows) in groups {
        table.push_row(vec![
            Value::text(reason),
            Value::count(rows.len()),
            Value::amount(sum(amounts, &rows)),
            Value::amount(mean(amounts, &rows)),
            Value::percent(percentage(rows.len() as f64, ds.len() as f64)),
        ]);
    }
    Ok(table.into())
}

fn customer_refund_patterns(ds: &Dataset) -> Result<AnalysisResult> {
    let names = ds.categories(CUSTOMER_NAME)?;
    let emails = ds.categories(CUSTOMER_EMAIL)?;
    let amounts = ds.amounts(AMOUNT)?;

    let mut groups: Vec<_> = group_by(&all_rows(ds.len()), |i| {
        (names[i].as_str(), emails[i].as_str())
    })
    .into_iter()
    .map(|(key, rows)| (key, sum(amounts, &rows), rows))
    .collect();
    groups.sort_by(|a, b| {
        b.2.len()
            .cmp(&a.2.len())
            .then_with(|| b.1.total_cmp(&a.1))
    });

    let mut table = Table::new(&[
        "Customer Name",
        "Customer Email",
        "Refund Count",
        "Total Refunded",
        "Avg Refund",
    ]);
    for ((name, email), total, rows) in groups {
        table.push_row(vec![
            Value::text(name),
            Value::text(email),
            Value::count(rows.len()),
            Value::amount(total),
            Value::amount(mean(amounts, &rows)),
        ]);
    }
    Ok(table.into())
}

fn refund_timeline_analysis(ds: &Dataset, granularity: Granularity) -> Result<AnalysisResult> {
    let mut table = Table::new(&["Period", "Refund Count", "Total Amount", "Avg Amount"]);
    if !ds.has_column(CREATED_AT) {
        return Ok(table.into());
    }

    let created = ds.timestamps(CREATED_AT)?;
    let amounts = ds.amounts(AMOUNT)?;
    for period in time_buckets(created, &all_rows(ds.len()), granularity, false) {
        table.push_row(vec![
            Value::text(period.label),
            Value::count(period.rows.len()),
            Value::amount(sum(amounts, &period.rows)),
            Value::amount(mean(amounts, &period.rows)),
        ]);
    }
    Ok(table.into())
}

fn settlement_vs_refund_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let rows = all_rows(ds.len());
    let refunded = sum(ds.amounts(AMOUNT)?, &rows);
    let settled = sum(ds.amounts(SETTLEMENT_AMOUNT)?, &rows);
    let settlement_tax = sum(ds.amounts(SETTLEMENT_TAX)?, &rows);

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Refund Amount", Value::amount(refunded)),
        Metric::new("Total Settlement Amount", Value::amount(settled)),
        Metric::new("Total Settlement Tax", Value::amount(settlement_tax)),
        Metric::new("Settlement Difference", Value::amount(refunded - settled)),
        Metric::new(
            "Tax as % of Refund",
            Value::percent(percentage(settlement_tax, refunded)),
        ),
    ]))
}

fn refund_size_distribution(ds: &Dataset) -> Result<AnalysisResult> {
    let amounts = ds.amounts(AMOUNT)?;
    let sizes = Segmentation::new(
        &[50.0, 100.0, 500.0, 1000.0, 5000.0],
        &["0-50", "51-100", "101-500", "501-1000", "1001-5000", "5000+"],
    );

    let mut table = Table::new(&["Amount Range", "Count", "Percentage"]);
    for (label, rows) in sizes.partition(amounts, &all_rows(ds.len())) {
        table.push_row(vec![
            Value::text(label),
            Value::count(rows.len()),
            Value::percent(percentage(rows.len() as f64, ds.len() as f64)),
        ]);
    }
    Ok(table.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::raw;

    const HEADERS: &[&str] = &[
        "Refund ID",
        "Refund Status",
        "Refund Type",
        "Refund Reason",
        "Payment Method",
        "Payment Method Type",
        "Customer Name",
        "Customer Email",
        "Refund Currency",
        "Refund Amount",
        "Refund Settlement Amount",
        "Refund Settlement Tax",
        "Refund Fee",
        "Refund Created At",
    ];

    fn sample() -> Dataset {
        prepare(Input::table(raw(
            HEADERS,
            &[
                &["r1", "processed", "full", "damaged", "card", "visa", " Asha ", "asha@x.com", "INR", "40", "38", "2", "1", "2024-05-01 09:00:00"],
                &["r2", "processed", "partial", "late", "upi", "upi", "Asha", "ASHA@x.com", "INR", "600", "590", "10", "6", "2024-05-01 18:00:00"],
                &["r3", "pending", "full", "damaged", "card", "visa", "Ben", "ben@x.com", "USD", "7000", "6900", "100", "70", "2024-05-03 12:00:00"],
            ],
        )))
        .unwrap()
    }

    fn run(id: &str, ds: &Dataset) -> AnalysisResult {
        registry().get(id).unwrap().run(ds).unwrap()
    }

    #[test]
    fn test_zero_amounts_give_zero_fee_percentage() {
        let ds = prepare(Input::table(raw(
            HEADERS,
            &[
                &["r1", "processed", "full", "x", "card", "visa", "A", "a", "INR", "0", "0", "0", "0", ""],
                &["r2", "processed", "full", "x", "card", "visa", "B", "b", "INR", "", "0", "0", "5", ""],
            ],
        )))
        .unwrap();
        let pct = ds.amounts(FEE_PERCENTAGE).unwrap();
        assert!(pct.iter().all(|p| *p == 0.0));
        assert_eq!(ds.amounts(NET_REFUND).unwrap(), &[0.0, -5.0]);

        let result = run("refund_fees_analysis", &ds);
        assert_eq!(result.metric("Average Fee Percentage"), Some(&Value::Percent(0.0)));
    }

    #[test]
    fn test_type_breakdown_percentages() {
        let result = run("refund_type_breakdown", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Refund Type"), Some(&Value::text("full")));
        assert_eq!(table.cell(0, "Percentage of Total"), Some(&Value::Percent(92.15)));
        assert_eq!(table.cell(1, "Percentage of Total"), Some(&Value::Percent(7.85)));
    }

    #[test]
    fn test_reasons_ranked_by_frequency() {
        let result = run("refund_reasons_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Refund Reason"), Some(&Value::text("damaged")));
        assert_eq!(table.cell(0, "Percentage of Cases"), Some(&Value::Percent(66.67)));
    }

    #[test]
    fn test_customer_keys_are_normalized() {
        let result = run("customer_refund_patterns", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Customer Name"), Some(&Value::text("Asha")));
        assert_eq!(table.cell(0, "Refund Count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_method_composite_key() {
        let result = run("payment_method_refund_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Payment Method Type"), Some(&Value::text("visa")));
        assert_eq!(table.cell(0, "Count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_timeline_skips_empty_days() {
        let result = run("refund_timeline_analysis", &sample());
        let table = result.as_table().unwrap();
        let periods: Vec<_> = table.column_values("Period").into_iter().cloned().collect();
        assert_eq!(periods, vec![Value::text("2024-05-01"), Value::text("2024-05-03")]);
    }

    #[test]
    fn test_size_distribution_declares_every_bucket() {
        let result = run("refund_size_distribution", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.cell(0, "Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(1, "Count"), Some(&Value::Int(0)));
        assert_eq!(table.cell(3, "Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(5, "Amount Range"), Some(&Value::text("5000+")));
    }

    #[test]
    fn test_settlement_metrics() {
        let result = run("settlement_vs_refund_analysis", &sample());
        assert_eq!(result.metric("Settlement Difference"), Some(&Value::Amount(112.0)));

        let empty = prepare(Input::table(raw(HEADERS, &[]))).unwrap();
        let result = run("settlement_vs_refund_analysis", &empty);
        assert_eq!(result.metric("Tax as % of Refund"), Some(&Value::Percent(0.0)));
    }
}
