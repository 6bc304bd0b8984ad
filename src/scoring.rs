//! Product-level recency and frequency signals

use crate::data::text_values;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Recency reported for products absent from the lookup.
pub const UNSEEN_RECENCY_DAYS: i64 = 999;

/// Frequency reported for products with no invoice in the reference month.
pub const DEFAULT_FREQUENCY: usize = 1;

/// Recency and frequency lookups keyed by stock code.
///
/// Both signals are product-level: every country row of a product gets the
/// same values when joined onto the prediction rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityIndex {
    recency: BTreeMap<String, i64>,
    frequency: BTreeMap<String, usize>,
}

impl ActivityIndex {
    /// Build the lookups from the cleaned transaction frame.
    ///
    /// Recency is measured in whole days from the latest invoice of the log;
    /// frequency counts distinct invoices inside `reference_month`.
    pub fn build(transactions: &DataFrame, reference_month: NaiveDate) -> crate::Result<Self> {
        let last_sales = transactions
            .clone()
            .lazy()
            .group_by([col("StockCode")])
            .agg([col("InvoiceDate").max().alias("LastSale")])
            .with_columns([(col("LastSale").max() - col("LastSale"))
                .dt()
                .total_days()
                .alias("Recency")])
            .collect()?;

        let recency = text_values(&last_sales, "StockCode")?
            .into_iter()
            .zip(last_sales.column("Recency")?.i64()?)
            .filter_map(|(code, days)| days.map(|d| (code, d)))
            .collect();

        let invoices = transactions
            .clone()
            .lazy()
            .filter(col("InvoiceMonth").eq(lit(reference_month).cast(DataType::Date)))
            .group_by([col("StockCode")])
            .agg([col("InvoiceNo").drop_nulls().n_unique().alias("Frequency")])
            .filter(col("Frequency").gt(lit(0)))
            .collect()?;

        let frequency = text_values(&invoices, "StockCode")?
            .into_iter()
            .zip(invoices.column("Frequency")?.cast(&DataType::UInt64)?.u64()?)
            .filter_map(|(code, count)| count.map(|c| (code, c as usize)))
            .collect();

        Ok(Self { recency, frequency })
    }

    /// Days since the product last sold, or [`UNSEEN_RECENCY_DAYS`].
    pub fn recency(&self, stock_code: &str) -> i64 {
        self.recency
            .get(stock_code)
            .copied()
            .unwrap_or(UNSEEN_RECENCY_DAYS)
    }

    /// Distinct invoices in the reference month, or [`DEFAULT_FREQUENCY`].
    pub fn frequency(&self, stock_code: &str) -> usize {
        self.frequency
            .get(stock_code)
            .copied()
            .unwrap_or(DEFAULT_FREQUENCY)
    }
}
