//! Customer accounts: revenue, order frequency, refunds, disputes and risk.

use crate::analysis::aggregator::{
    all_rows, group_by_category, mean, percentage, ratio, rows_where, sum, top_n, Segmentation,
};
use crate::analysis::Registry;
use crate::dataset::{Column, ColumnSpec, Dataset, Input, Schema};
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Table, Value};
use anyhow::Result;

const CUSTOMER_ID: &str = "Customer ID";
const NAME: &str = "Customer Name";
const EMAIL: &str = "Customer Email";
const CURRENCY: &str = "Settlement Currency";
const ORDERS_COUNT: &str = "Success Orders Count";
const ORDERS_AMOUNT: &str = "Success Orders Amount";
const REFUNDS_COUNT: &str = "Total Refunds Count";
const REFUNDS_AMOUNT: &str = "Total Refunds Amount";
const DISPUTES_COUNT: &str = "Total Disputes Count";
const DISPUTES_AMOUNT: &str = "Total Disputes Amount";

pub const NET_REVENUE: &str = "Net Revenue";
pub const AVERAGE_ORDER_VALUE: &str = "Average Order Value";
pub const REFUND_RATE: &str = "Refund Rate";
pub const DISPUTE_RATE: &str = "Dispute Rate";

pub fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::identifier(CUSTOMER_ID),
        ColumnSpec::category(NAME).trimmed(),
        ColumnSpec::category(EMAIL).lowercased(),
        ColumnSpec::category(CURRENCY).trimmed(),
        ColumnSpec::amount(ORDERS_COUNT),
        ColumnSpec::amount(ORDERS_AMOUNT),
        ColumnSpec::amount(REFUNDS_COUNT),
        ColumnSpec::amount(REFUNDS_AMOUNT),
        ColumnSpec::amount(DISPUTES_COUNT),
        ColumnSpec::amount(DISPUTES_AMOUNT),
    ])
}

pub fn prepare(input: Input) -> Result<Dataset, LedgerError> {
    let mut ds = Dataset::load(input, &schema())?;
    let n = ds.len();

    let (net, aov, refund_rate, dispute_rate) = {
        let orders = ds.amounts(ORDERS_COUNT)?;
        let revenue = ds.amounts(ORDERS_AMOUNT)?;
        let refunds = ds.amounts(REFUNDS_AMOUNT)?;
        let disputes = ds.amounts(DISPUTES_AMOUNT)?;

        let mut net = Vec::with_capacity(n);
        let mut aov = Vec::with_capacity(n);
        let mut refund_rate = Vec::with_capacity(n);
        let mut dispute_rate = Vec::with_capacity(n);
        for i in 0..n {
            net.push(revenue[i] - refunds[i]);
            aov.push(ratio(revenue[i], orders[i]));
            refund_rate.push(percentage(refunds[i], revenue[i]));
            dispute_rate.push(percentage(disputes[i], revenue[i]));
        }
        (net, aov, refund_rate, dispute_rate)
    };

    ds.insert_derived(NET_REVENUE, Column::Amount(net));
    ds.insert_derived(AVERAGE_ORDER_VALUE, Column::Amount(aov));
    ds.insert_derived(REFUND_RATE, Column::Amount(refund_rate));
    ds.insert_derived(DISPUTE_RATE, Column::Amount(dispute_rate));

    Ok(ds)
}

pub fn registry() -> Registry {
    let mut r = Registry::new();
    r.register("customer_revenue_summary", "Customer Revenue Summary", customer_revenue_summary)
        .describe("Overall revenue, order, refund and dispute totals across all customers.");
    r.register("top_customers_by_revenue", "Top Customers By Revenue", |ds: &Dataset| {
        top_customers(ds, ORDERS_AMOUNT, 10)
    })
    .describe("Customers generating the most successful order revenue.");
    r.register("top_customers_by_order_count", "Top Customers By Order Count", |ds: &Dataset| {
        top_customers(ds, ORDERS_COUNT, 10)
    })
    .describe("Most frequent customers by number of successful orders.");
    r.register("customers_with_refunds", "Customers With Refunds", |ds: &Dataset| {
        customers_with(ds, REFUNDS_COUNT, REFUNDS_AMOUNT, REFUND_RATE)
    })
    .describe("All customers who have received refunds, with their refund rate.");
    r.register("customers_with_disputes", "Customers With Disputes", |ds: &Dataset| {
        customers_with(ds, DISPUTES_COUNT, DISPUTES_AMOUNT, DISPUTE_RATE)
    })
    .describe("All customers who have raised disputes, with their dispute rate.");
    r.register("revenue_distribution_analysis", "Revenue Distribution Analysis", revenue_distribution_analysis)
        .describe("Customer counts and revenue across revenue segments.");
    r.register("average_order_value_analysis", "Average Order Value Analysis", average_order_value_analysis)
        .describe("Active customers grouped by average order value.");
    r.register("customer_loyalty_analysis", "Customer Loyalty Analysis", customer_loyalty_analysis)
        .describe("Customers segmented by order frequency to show loyalty patterns.");
    r.register("risk_assessment_analysis", "Risk Assessment Analysis", risk_assessment_analysis)
        .describe("Active customers grouped by combined refund and dispute rate.");
    r.register("currency_breakdown_analysis", "Currency Breakdown Analysis", currency_breakdown_analysis)
        .describe("Customer totals per settlement currency.");
    r.register("duplicate_email_analysis", "Duplicate Email Analysis", duplicate_email_analysis)
        .describe("Email addresses shared by more than one customer account.");
    r
}

fn customer_revenue_summary(ds: &Dataset) -> Result<AnalysisResult> {
    let rows = all_rows(ds.len());
    let revenue = sum(ds.amounts(ORDERS_AMOUNT)?, &rows);
    let orders = sum(ds.amounts(ORDERS_COUNT)?, &rows);

    let mut table = Table::new(&[
        "Total Customers",
        "Total Revenue",
        "Total Orders",
        "Total Refunds",
        "Total Disputes",
        "Net Revenue",
        "Average Order Value",
    ]);
    table.push_row(vec![
        Value::count(ds.len()),
        Value::amount(revenue),
        Value::number(orders),
        Value::amount(sum(ds.amounts(REFUNDS_AMOUNT)?, &rows)),
        Value::amount(sum(ds.amounts(DISPUTES_AMOUNT)?, &rows)),
        Value::amount(sum(ds.amounts(NET_REVENUE)?, &rows)),
        Value::amount(ratio(revenue, orders)),
    ]);
    Ok(table.into())
}

/// Top `n` customers by one numeric column; the ranking column comes first
/// after name and email.
fn top_customers(ds: &Dataset, by: &str, n: usize) -> Result<AnalysisResult> {
    let names = ds.categories(NAME)?;
    let emails = ds.categories(EMAIL)?;
    let orders = ds.amounts(ORDERS_COUNT)?;
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    let aov = ds.amounts(AVERAGE_ORDER_VALUE)?;
    let key = ds.amounts(by)?;

    let by_revenue = by == ORDERS_AMOUNT;
    let (first, second) = if by_revenue {
        (ORDERS_AMOUNT, ORDERS_COUNT)
    } else {
        (ORDERS_COUNT, ORDERS_AMOUNT)
    };

    let mut table = Table::new(&[NAME, EMAIL, first, second, AVERAGE_ORDER_VALUE]);
    for i in top_n(&all_rows(ds.len()), |i| key[i], n) {
        let (amount, count) = (Value::amount(revenue[i]), Value::number(orders[i]));
        let (a, b) = if by_revenue {
            (amount, count)
        } else {
            (count, amount)
        };
        table.push_row(vec![
            Value::text(&names[i]),
            Value::text(&emails[i]),
            a,
            b,
            Value::amount(aov[i]),
        ]);
    }
    Ok(table.into())
}

/// Customers whose `count_column` is positive, in file order.
fn customers_with(
    ds: &Dataset,
    count_column: &str,
    amount_column: &str,
    rate_column: &str,
) -> Result<AnalysisResult> {
    let names = ds.categories(NAME)?;
    let emails = ds.categories(EMAIL)?;
    let counts = ds.amounts(count_column)?;
    let amounts = ds.amounts(amount_column)?;
    let rates = ds.amounts(rate_column)?;

    let mut table = Table::new(&[NAME, EMAIL, count_column, amount_column, rate_column]);
    for i in rows_where(ds.len(), |i| counts[i] > 0.0) {
        table.push_row(vec![
            Value::text(&names[i]),
            Value::text(&emails[i]),
            Value::number(counts[i]),
            Value::amount(amounts[i]),
            Value::percent(rates[i]),
        ]);
    }
    Ok(table.into())
}

/// Per-segment customer count, revenue, order count and mean order value.
fn segment_table(
    ds: &Dataset,
    label: &str,
    segments: &Segmentation,
    metric: &[f64],
    rows: &[usize],
) -> Result<AnalysisResult> {
    let orders = ds.amounts(ORDERS_COUNT)?;
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    let aov = ds.amounts(AVERAGE_ORDER_VALUE)?;

    let mut table = Table::new(&[
        label,
        "Customer Count",
        ORDERS_AMOUNT,
        ORDERS_COUNT,
        AVERAGE_ORDER_VALUE,
    ]);
    for (segment, members) in segments.partition(metric, rows) {
        table.push_row(vec![
            Value::text(segment),
            Value::count(members.len()),
            Value::amount(sum(revenue, &members)),
            Value::number(sum(orders, &members)),
            Value::amount(mean(aov, &members)),
        ]);
    }
    Ok(table.into())
}

fn revenue_distribution_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let segments = Segmentation::new(
        &[0.0, 5000.0, 15000.0, 30000.0],
        &[
            "No Revenue",
            "Low (≤5K)",
            "Medium (5K-15K)",
            "High (15K-30K)",
            "Premium (>30K)",
        ],
    );
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    segment_table(ds, "Revenue Segment", &segments, revenue, &all_rows(ds.len()))
}

fn customer_loyalty_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let segments = Segmentation::new(
        &[0.0, 1.0, 5.0, 10.0],
        &[
            "Inactive",
            "One-time",
            "Occasional (2-5)",
            "Regular (6-10)",
            "Loyal (>10)",
        ],
    );
    let orders = ds.amounts(ORDERS_COUNT)?;
    segment_table(ds, "Loyalty Segment", &segments, orders, &all_rows(ds.len()))
}

fn average_order_value_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let orders = ds.amounts(ORDERS_COUNT)?;
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    let aov = ds.amounts(AVERAGE_ORDER_VALUE)?;

    let mut table = Table::new(&["AOV Segment", "Customer Count", "Total Revenue", "Average AOV"]);
    let active = rows_where(ds.len(), |i| orders[i] > 0.0);
    if active.is_empty() {
        return Ok(table.into());
    }

    let segments = Segmentation::new(
        &[500.0, 1000.0, 2000.0],
        &[
            "Low AOV (≤500)",
            "Medium AOV (500-1K)",
            "High AOV (1K-2K)",
            "Premium AOV (>2K)",
        ],
    );
    for (segment, members) in segments.partition(aov, &active) {
        table.push_row(vec![
            Value::text(segment),
            Value::count(members.len()),
            Value::amount(sum(revenue, &members)),
            Value::amount(mean(aov, &members)),
        ]);
    }
    Ok(table.into())
}

fn risk_assessment_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    let refund_rate = ds.amounts(REFUND_RATE)?;
    let dispute_rate = ds.amounts(DISPUTE_RATE)?;

    let mut table = Table::new(&[
        "Risk Level",
        "Customer Count",
        "Avg Refund Rate",
        "Avg Dispute Rate",
        "Total Revenue Impact",
    ]);
    let active = rows_where(ds.len(), |i| revenue[i] > 0.0);
    if active.is_empty() {
        return Ok(table.into());
    }

    let risk_score: Vec<f64> = refund_rate
        .iter()
        .zip(dispute_rate)
        .map(|(r, d)| r + d)
        .collect();
    let levels = Segmentation::new(
        &[0.0, 5.0, 15.0],
        &[
            "No Risk",
            "Low Risk (≤5%)",
            "Medium Risk (5-15%)",
            "High Risk (>15%)",
        ],
    );
    for (level, members) in levels.partition(&risk_score, &active) {
        table.push_row(vec![
            Value::text(level),
            Value::count(members.len()),
            Value::percent(mean(refund_rate, &members)),
            Value::percent(mean(dispute_rate, &members)),
            Value::amount(sum(revenue, &members)),
        ]);
    }
    Ok(table.into())
}

fn currency_breakdown_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let currencies = ds.categories(CURRENCY)?;
    let orders = ds.amounts(ORDERS_COUNT)?;
    let revenue = ds.amounts(ORDERS_AMOUNT)?;
    let refunds = ds.amounts(REFUNDS_AMOUNT)?;
    let disputes = ds.amounts(DISPUTES_AMOUNT)?;
    let net = ds.amounts(NET_REVENUE)?;

    let mut table = Table::new(&[
        CURRENCY,
        "Customer Count",
        ORDERS_AMOUNT,
        ORDERS_COUNT,
        REFUNDS_AMOUNT,
        DISPUTES_AMOUNT,
        NET_REVENUE,
    ]);
    for (currency, rows) in group_by_category(currencies, &all_rows(ds.len())) {
        table.push_row(vec![
            Value::text(currency),
            Value::count(rows.len()),
            Value::amount(sum(revenue, &rows)),
            Value::number(sum(orders, &rows)),
            Value::amount(sum(refunds, &rows)),
            Value::amount(sum(disputes, &rows)),
            Value::amount(sum(net, &rows)),
        ]);
    }
    Ok(table.into())
}

fn duplicate_email_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let names = ds.categories(NAME)?;
    let emails = ds.categories(EMAIL)?;
    let orders = ds.amounts(ORDERS_COUNT)?;
    let revenue = ds.amounts(ORDERS_AMOUNT)?;

    let mut table = Table::new(&[EMAIL, "Account Count", NAME, ORDERS_AMOUNT, ORDERS_COUNT]);
    for (email, rows) in group_by_category(emails, &all_rows(ds.len())) {
        if rows.len() < 2 {
            continue;
        }
        let mut distinct: Vec<&str> = Vec::new();
        for &i in &rows {
            if !distinct.contains(&names[i].as_str()) {
                distinct.push(&names[i]);
            }
        }
        table.push_row(vec![
            Value::text(email),
            Value::count(rows.len()),
            Value::text(distinct.join(", ")),
            Value::amount(sum(revenue, &rows)),
            Value::number(sum(orders, &rows)),
        ]);
    }
    Ok(table.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::raw;

    const HEADERS: &[&str] = &[
        "Customer ID",
        "Customer Name",
        "Customer Email",
        "Settlement Currency",
        "Success Orders Count",
        "Success Orders Amount",
        "Total Refunds Count",
        "Total Refunds Amount",
        "Total Disputes Count",
        "Total Disputes Amount",
    ];

    fn sample() -> Dataset {
        prepare(Input::table(raw(
            HEADERS,
            &[
                &["c1", "Asha", "asha@x.com", "INR", "4", "2000", "1", "100", "0", "0"],
                &["c2", "Ravi", "ravi@x.com", "INR", "12", "36000", "0", "0", "1", "3600"],
                &["c3", "A. Asha", " ASHA@x.com", "USD", "0", "0", "0", "0", "0", "0"],
                &["c4", "Meera", "meera@x.com", "USD", "1", "800", "0", "0", "0", "0"],
            ],
        )))
        .unwrap()
    }

    fn run(id: &str, ds: &Dataset) -> AnalysisResult {
        registry().get(id).unwrap().run(ds).unwrap()
    }

    #[test]
    fn test_derived_columns_are_zero_guarded() {
        let ds = sample();
        assert_eq!(ds.amounts(AVERAGE_ORDER_VALUE).unwrap()[2], 0.0);
        assert_eq!(ds.amounts(REFUND_RATE).unwrap()[2], 0.0);
        assert_eq!(ds.amounts(REFUND_RATE).unwrap()[0], 5.0);
        assert_eq!(ds.amounts(DISPUTE_RATE).unwrap()[1], 10.0);
        assert_eq!(ds.amounts(NET_REVENUE).unwrap()[0], 1900.0);
    }

    #[test]
    fn test_revenue_summary() {
        let result = run("customer_revenue_summary", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.cell(0, "Total Customers"), Some(&Value::Int(4)));
        assert_eq!(table.cell(0, "Total Revenue"), Some(&Value::Amount(38800.0)));
        assert_eq!(table.cell(0, "Average Order Value"), Some(&Value::Amount(2282.35)));
    }

    #[test]
    fn test_top_customers() {
        let ds = sample();
        let by_revenue = top_customers(&ds, ORDERS_AMOUNT, 2).unwrap();
        let table = by_revenue.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns[2], ORDERS_AMOUNT);
        assert_eq!(table.cell(0, NAME), Some(&Value::text("Ravi")));

        let by_count = run("top_customers_by_order_count", &ds);
        let table = by_count.as_table().unwrap();
        assert_eq!(table.columns[2], ORDERS_COUNT);
        assert_eq!(table.cell(3, NAME), Some(&Value::text("A. Asha")));
    }

    #[test]
    fn test_refund_and_dispute_lists() {
        let ds = sample();
        let refunds = run("customers_with_refunds", &ds);
        assert_eq!(refunds.as_table().unwrap().len(), 1);
        assert_eq!(
            refunds.as_table().unwrap().cell(0, REFUND_RATE),
            Some(&Value::Percent(5.0))
        );

        let disputes = run("customers_with_disputes", &ds);
        assert_eq!(
            disputes.as_table().unwrap().cell(0, NAME),
            Some(&Value::text("Ravi"))
        );
    }

    #[test]
    fn test_segments_cover_every_customer() {
        let ds = sample();
        for id in ["revenue_distribution_analysis", "customer_loyalty_analysis"] {
            let result = run(id, &ds);
            let table = result.as_table().unwrap();
            assert_eq!(table.len(), 5);
            let total: f64 = table
                .column_values("Customer Count")
                .iter()
                .filter_map(|v| v.as_f64())
                .sum();
            assert_eq!(total, 4.0);
        }

        let loyalty = run("customer_loyalty_analysis", &ds);
        let table = loyalty.as_table().unwrap();
        assert_eq!(table.cell(0, "Customer Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(1, "Customer Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(4, "Loyalty Segment"), Some(&Value::text("Loyal (>10)")));
    }

    #[test]
    fn test_aov_and_risk_use_active_customers() {
        let ds = sample();
        let aov = run("average_order_value_analysis", &ds);
        let table = aov.as_table().unwrap();
        let counted: f64 = table
            .column_values("Customer Count")
            .iter()
            .filter_map(|v| v.as_f64())
            .sum();
        assert_eq!(counted, 3.0);

        let risk = run("risk_assessment_analysis", &ds);
        let table = risk.as_table().unwrap();
        assert_eq!(table.cell(0, "Customer Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(1, "Customer Count"), Some(&Value::Int(1)));
        assert_eq!(table.cell(2, "Customer Count"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_duplicate_emails() {
        let result = run("duplicate_email_analysis", &sample());
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, EMAIL), Some(&Value::text("asha@x.com")));
        assert_eq!(table.cell(0, NAME), Some(&Value::text("Asha, A. Asha")));
    }
}
