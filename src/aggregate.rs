//! Best-seller selection and monthly (month, product, country) aggregation

use crate::data::{date_values, text_values};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// Sales of one product in one country during one calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    /// First day of the month
    pub month: NaiveDate,
    pub stock_code: String,
    /// Representative description (earliest non-empty one of the group)
    pub description: String,
    pub country: String,
    /// Summed quantity
    pub quantity: i64,
    /// Summed line totals
    pub total_price: f64,
    /// Mean of the line unit prices
    pub avg_unit_price: f64,
}

/// Truncate a timestamp to the first day of its month.
pub fn month_start(timestamp: NaiveDateTime) -> NaiveDate {
    let date = timestamp.date();
    date.with_day(1).unwrap_or(date)
}

/// First day of the month after `month`.
pub fn next_month(month: NaiveDate) -> Option<NaiveDate> {
    month.with_day(1)?.checked_add_months(Months::new(1))
}

pub(crate) fn row_limit(n: usize) -> IdxSize {
    IdxSize::try_from(n).unwrap_or(IdxSize::MAX)
}

/// Rank products by total quantity and keep the best `n`.
///
/// Ties are broken by stock code, ascending.
pub fn top_products(transactions: &DataFrame, n: usize) -> crate::Result<Vec<String>> {
    let ranked = transactions
        .clone()
        .lazy()
        .group_by([col("StockCode")])
        .agg([col("Quantity").sum().alias("TotalQuantity")])
        .sort_by_exprs(
            [col("TotalQuantity"), col("StockCode")],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .limit(row_limit(n))
        .collect()?;

    text_values(&ranked, "StockCode")
}

/// Collapse transactions of the selected products into monthly aggregates.
///
/// The frame is sorted by (product, country, month), which is the order
/// the feature builder walks each series in.
pub fn aggregate_monthly(transactions: &DataFrame, products: &[String]) -> crate::Result<DataFrame> {
    let selected = Series::new("selected", products);

    let monthly = transactions
        .clone()
        .lazy()
        .filter(col("StockCode").is_in(lit(selected)))
        // earliest line first, so `first` picks the earliest description
        .sort_by_exprs(
            [col("InvoiceDate")],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .group_by([col("StockCode"), col("Country"), col("InvoiceMonth")])
        .agg([
            col("Description").drop_nulls().first().alias("Description"),
            col("Quantity").sum().alias("Quantity"),
            col("TotalPrice").sum().alias("TotalPrice"),
            col("UnitPrice").mean().alias("AvgUnitPrice"),
        ])
        .with_columns([col("Description").fill_null(lit(""))])
        .sort_by_exprs(
            [col("StockCode"), col("Country"), col("InvoiceMonth")],
            SortMultipleOptions::default(),
        )
        .collect()?;

    Ok(monthly)
}

/// Typed view of a monthly aggregate frame, in frame order.
pub fn monthly_rows(monthly: &DataFrame) -> crate::Result<Vec<MonthlyAggregate>> {
    let months = date_values(monthly, "InvoiceMonth")?;
    let codes = text_values(monthly, "StockCode")?;
    let descriptions = text_values(monthly, "Description")?;
    let countries = text_values(monthly, "Country")?;
    let quantities = monthly.column("Quantity")?.i64()?;
    let totals = monthly.column("TotalPrice")?.f64()?;
    let prices = monthly.column("AvgUnitPrice")?.f64()?;

    let rows = months
        .into_iter()
        .zip(codes)
        .zip(descriptions)
        .zip(countries)
        .zip(quantities.into_iter().zip(totals).zip(prices))
        .map(
            |((((month, stock_code), description), country), ((quantity, total), price))| {
                MonthlyAggregate {
                    month,
                    stock_code,
                    description,
                    country,
                    quantity: quantity.unwrap_or(0),
                    total_price: total.unwrap_or(0.0),
                    avg_unit_price: price.unwrap_or(f64::NAN),
                }
            },
        )
        .collect();
    Ok(rows)
}

/// Total quantity per month across all aggregates, oldest first.
pub fn monthly_totals(monthly: &DataFrame) -> crate::Result<Vec<(NaiveDate, i64)>> {
    let totals = monthly
        .clone()
        .lazy()
        .group_by([col("InvoiceMonth")])
        .agg([col("Quantity").sum()])
        .sort_by_exprs([col("InvoiceMonth")], SortMultipleOptions::default())
        .collect()?;

    let months = date_values(&totals, "InvoiceMonth")?;
    let quantities = totals.column("Quantity")?.i64()?;
    Ok(months
        .into_iter()
        .zip(quantities)
        .map(|(month, quantity)| (month, quantity.unwrap_or(0)))
        .collect())
}

/// Latest month present in the aggregates.
pub fn last_month(monthly: &DataFrame) -> crate::Result<Option<NaiveDate>> {
    let latest = monthly
        .clone()
        .lazy()
        .select([col("InvoiceMonth").max()])
        .collect()?;
    let month = latest.column("InvoiceMonth")?.date()?.as_date_iter().flatten().next();
    Ok(month)
}

/// Build a monthly aggregate frame from typed rows.
#[cfg(test)]
pub(crate) fn monthly_frame(rows: &[MonthlyAggregate]) -> DataFrame {
    DataFrame::new(vec![
        Series::new(
            "StockCode",
            rows.iter().map(|r| r.stock_code.as_str()).collect::<Vec<_>>(),
        ),
        Series::new("Country", rows.iter().map(|r| r.country.as_str()).collect::<Vec<_>>()),
        DateChunked::from_naive_date("InvoiceMonth", rows.iter().map(|r| r.month)).into_series(),
        Series::new(
            "Description",
            rows.iter().map(|r| r.description.as_str()).collect::<Vec<_>>(),
        ),
        Series::new("Quantity", rows.iter().map(|r| r.quantity).collect::<Vec<_>>()),
        Series::new("TotalPrice", rows.iter().map(|r| r.total_price).collect::<Vec<_>>()),
        Series::new(
            "AvgUnitPrice",
            rows.iter().map(|r| r.avg_unit_price).collect::<Vec<_>>(),
        ),
    ])
    .unwrap()
}
