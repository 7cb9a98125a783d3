//! Product sales: revenue, volume and unit economics per product.

use crate::analysis::aggregator::{
    all_rows, group_by_category, percentage, ratio, sum, top_n, Stats,
};
use crate::analysis::Registry;
use crate::dataset::{Column, ColumnSpec, Dataset, Input, Schema};
use crate::error::LedgerError;
use crate::models::{AnalysisResult, Metric, Table, Value};
use anyhow::Result;

const PRODUCT_NAME: &str = "Product Name";
const PRODUCT_TYPE: &str = "Product Type";
const QUANTITY: &str = "Quantity";
const SALES_VOLUME: &str = "Total Sales Volume";
const NET_REVENUE: &str = "Net Revenue";

/// Derived: net revenue as a percentage of sales volume.
pub const REVENUE_RATIO: &str = "Revenue Ratio";
/// Derived: sales volume per unit sold.
pub const PRICE_PER_UNIT: &str = "Average Price Per Unit";

pub fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::category(PRODUCT_NAME).trimmed(),
        ColumnSpec::category(PRODUCT_TYPE).trimmed(),
        ColumnSpec::amount(QUANTITY),
        ColumnSpec::amount(SALES_VOLUME),
        ColumnSpec::amount(NET_REVENUE),
    ])
}

pub fn prepare(input: Input) -> Result<Dataset, LedgerError> {
    let mut ds = Dataset::load(input, &schema())?;

    let (revenue_ratio, price_per_unit): (Vec<f64>, Vec<f64>) = {
        let quantity = ds.amounts(QUANTITY)?;
        let volume = ds.amounts(SALES_VOLUME)?;
        let net = ds.amounts(NET_REVENUE)?;
        (0..ds.len())
            .map(|i| (percentage(net[i], volume[i]), ratio(volume[i], quantity[i])))
            .unzip()
    };
    ds.insert_derived(REVENUE_RATIO, Column::Amount(revenue_ratio));
    ds.insert_derived(PRICE_PER_UNIT, Column::Amount(price_per_unit));

    Ok(ds)
}

pub fn registry() -> Registry {
    let mut r = Registry::new();
    r.register("product_performance_summary", "Product Performance Summary", product_performance_summary)
        .describe("Key performance metrics for each product, highest net revenue first.");
    r.register(
        "revenue_breakdown_by_product_type",
        "Revenue Breakdown By Product Type",
        revenue_breakdown_by_product_type,
    )
    .describe("Total revenue and sales volume grouped by product type.");
    r.register("top_revenue_generators", "Top Revenue Generators", |ds: &Dataset| {
        top_revenue_generators(ds, 5)
    })
    .describe("The top products by net revenue generation.");
    r.register(
        "sales_volume_vs_revenue_efficiency",
        "Sales Volume Vs Revenue Efficiency",
        sales_volume_vs_revenue_efficiency,
    )
    .describe("Sales volume compared with net revenue to find the most efficient products.");
    r.register("quantity_distribution_analysis", "Quantity Distribution Analysis", quantity_distribution_analysis)
        .describe("Distribution of quantities sold across all products.");
    r.register("financial_summary_overview", "Financial Summary Overview", financial_summary_overview)
        .describe("Overall financial performance summary across all products.");
    r
}

/// Rows sorted by one column, largest first; ties keep file order.
fn ranked_by(values: &[f64]) -> Vec<usize> {
    top_n(&all_rows(values.len()), |i| values[i], values.len())
}

fn product_performance_summary(ds: &Dataset) -> Result<AnalysisResult> {
    let names = ds.categories(PRODUCT_NAME)?;
    let types = ds.categories(PRODUCT_TYPE)?;
    let quantity = ds.amounts(QUANTITY)?;
    let volume = ds.amounts(SALES_VOLUME)?;
    let net = ds.amounts(NET_REVENUE)?;

    let mut table = Table::new(&[PRODUCT_NAME, PRODUCT_TYPE, QUANTITY, SALES_VOLUME, NET_REVENUE]);
    for i in ranked_by(net) {
        table.push_row(vec![
            Value::text(&names[i]),
            Value::text(&types[i]),
            Value::number(quantity[i]),
            Value::amount(volume[i]),
            Value::amount(net[i]),
        ]);
    }
    Ok(table.into())
}

fn revenue_breakdown_by_product_type(ds: &Dataset) -> Result<AnalysisResult> {
    let types = ds.categories(PRODUCT_TYPE)?;
    let quantity = ds.amounts(QUANTITY)?;
    let volume = ds.amounts(SALES_VOLUME)?;
    let net = ds.amounts(NET_REVENUE)?;

    let mut groups: Vec<_> = group_by_category(types, &all_rows(ds.len()))
        .into_iter()
        .map(|(kind, rows)| {
            (
                kind,
                sum(quantity, &rows),
                sum(volume, &rows),
                sum(net, &rows),
            )
        })
        .collect();
    groups.sort_by(|a, b| b.3.total_cmp(&a.3));

    let mut table = Table::new(&[
        PRODUCT_TYPE,
        QUANTITY,
        SALES_VOLUME,
        NET_REVENUE,
        "Avg Revenue Per Unit",
    ]);
    for (kind, units, sold, revenue) in groups {
        table.push_row(vec![
            Value::text(kind),
            Value::number(units),
            Value::amount(sold),
            Value::amount(revenue),
            Value::amount(ratio(revenue, units)),
        ]);
    }
    Ok(table.into())
}

fn top_revenue_generators(ds: &Dataset, n: usize) -> Result<AnalysisResult> {
    let names = ds.categories(PRODUCT_NAME)?;
    let quantity = ds.amounts(QUANTITY)?;
    let net = ds.amounts(NET_REVENUE)?;
    let price = ds.amounts(PRICE_PER_UNIT)?;

    let mut table = Table::new(&["Rank", PRODUCT_NAME, NET_REVENUE, QUANTITY, PRICE_PER_UNIT]);
    for (rank, i) in top_n(&all_rows(ds.len()), |i| net[i], n).into_iter().enumerate() {
        table.push_row(vec![
            Value::count(rank + 1),
            Value::text(&names[i]),
            Value::amount(net[i]),
            Value::number(quantity[i]),
            Value::amount(price[i]),
        ]);
    }
    Ok(table.into())
}

fn sales_volume_vs_revenue_efficiency(ds: &Dataset) -> Result<AnalysisResult> {
    let names = ds.categories(PRODUCT_NAME)?;
    let volume = ds.amounts(SALES_VOLUME)?;
    let net = ds.amounts(NET_REVENUE)?;
    let revenue_ratio = ds.amounts(REVENUE_RATIO)?;

    let mut table = Table::new(&[PRODUCT_NAME, SALES_VOLUME, NET_REVENUE, REVENUE_RATIO]);
    for i in ranked_by(revenue_ratio) {
        table.push_row(vec![
            Value::text(&names[i]),
            Value::amount(volume[i]),
            Value::amount(net[i]),
            Value::percent(revenue_ratio[i]),
        ]);
    }
    Ok(table.into())
}

fn quantity_distribution_analysis(ds: &Dataset) -> Result<AnalysisResult> {
    let stats = Stats::of(ds.amounts(QUANTITY)?, &all_rows(ds.len()));

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Units Sold", Value::number(stats.sum)),
        Metric::new("Average Units Per Product", Value::number(stats.mean)),
        Metric::new("Highest Single Product Sales", Value::number(stats.max)),
        Metric::new("Lowest Single Product Sales", Value::number(stats.min)),
    ]))
}

fn financial_summary_overview(ds: &Dataset) -> Result<AnalysisResult> {
    let rows = all_rows(ds.len());
    let volume = sum(ds.amounts(SALES_VOLUME)?, &rows);
    let net = sum(ds.amounts(NET_REVENUE)?, &rows);
    let units = sum(ds.amounts(QUANTITY)?, &rows);

    Ok(AnalysisResult::metrics(vec![
        Metric::new("Total Sales Volume", Value::amount(volume)),
        Metric::new("Total Net Revenue", Value::amount(net)),
        Metric::new("Overall Revenue Ratio", Value::percent(percentage(net, volume))),
        Metric::new("Total Units Sold", Value::number(units)),
        Metric::new("Average Revenue Per Unit", Value::amount(ratio(net, units))),
        Metric::new("Number of Products", Value::count(ds.len())),
    ]))
}
