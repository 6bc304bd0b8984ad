//! Lagged target, rolling-window features and categorical encoders

use crate::aggregate::{monthly_rows, MonthlyAggregate};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Number of model inputs per row.
pub const FEATURE_COUNT: usize = 4;

/// Feature names, in matrix column order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "StockCode_enc",
    "Country_enc",
    "UnitPrice",
    "Qty_Mean_Last3Months",
];

/// Reserved encoding for categories the encoder never saw.
pub const UNKNOWN_CATEGORY: f64 = -1.0;

/// A monthly aggregate extended with its series-derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    pub aggregate: MonthlyAggregate,
    /// Mean quantity over the trailing window, current month included
    pub rolling_qty: f64,
    /// Quantity of the next row of the same (product, country) series
    pub target: Option<f64>,
}

impl TimeSeriesRow {
    /// Rows with a known next-month quantity are usable for training.
    pub fn is_labeled(&self) -> bool {
        self.target.is_some()
    }
}

/// Derive rolling means and next-month targets per (product, country) series.
///
/// Windows and shifts never cross series boundaries. Rows are returned in
/// (product, country, month) order.
pub fn build_time_series(monthly: &DataFrame, window: usize) -> crate::Result<Vec<TimeSeriesRow>> {
    let series_key = [col("StockCode"), col("Country")];
    let frame = monthly
        .clone()
        .lazy()
        .sort_by_exprs(
            [col("StockCode"), col("Country"), col("InvoiceMonth")],
            SortMultipleOptions::default(),
        )
        .with_columns([
            col("Quantity")
                .cast(DataType::Float64)
                .rolling_mean(RollingOptionsFixedWindow {
                    window_size: window.max(1),
                    min_periods: 1,
                    ..Default::default()
                })
                .over(series_key.clone())
                .alias("RollingQty"),
            col("Quantity")
                .shift(lit(-1i64))
                .over(series_key)
                .alias("NextQty"),
        ])
        .collect()?;

    let aggregates = monthly_rows(&frame)?;
    let rolling = frame.column("RollingQty")?.f64()?;
    let next = frame.column("NextQty")?.i64()?;

    Ok(aggregates
        .into_iter()
        .zip(rolling.into_iter().zip(next))
        .map(|(aggregate, (rolling_qty, next_qty))| TimeSeriesRow {
            rolling_qty: rolling_qty.unwrap_or(aggregate.quantity as f64),
            target: next_qty.map(|q| q as f64),
            aggregate,
        })
        .collect())
}

/// Deterministic category → integer id mapping, fit once and then read-only.
///
/// Ids follow the sorted order of the distinct values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryEncoder {
    ids: BTreeMap<String, usize>,
}

impl CategoryEncoder {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let ids = distinct
            .into_iter()
            .enumerate()
            .map(|(id, value)| (value.to_string(), id))
            .collect();
        Self { ids }
    }

    pub fn id(&self, value: &str) -> Option<usize> {
        self.ids.get(value).copied()
    }

    /// Numeric encoding; unseen values map to [`UNKNOWN_CATEGORY`].
    pub fn encode(&self, value: &str) -> f64 {
        self.id(value).map_or(UNKNOWN_CATEGORY, |id| id as f64)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The product and country encoders shared by training and prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureEncoders {
    pub product: CategoryEncoder,
    pub country: CategoryEncoder,
}

impl FeatureEncoders {
    pub fn fit(rows: &[TimeSeriesRow]) -> Self {
        Self {
            product: CategoryEncoder::fit(rows.iter().map(|r| r.aggregate.stock_code.as_str())),
            country: CategoryEncoder::fit(rows.iter().map(|r| r.aggregate.country.as_str())),
        }
    }

    pub fn vector(&self, row: &TimeSeriesRow) -> FeatureVector {
        FeatureVector {
            product: self.product.encode(&row.aggregate.stock_code),
            country: self.country.encode(&row.aggregate.country),
            avg_price: row.aggregate.avg_unit_price,
            rolling_qty: row.rolling_qty,
        }
    }
}

/// Model inputs of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub product: f64,
    pub country: f64,
    pub avg_price: f64,
    pub rolling_qty: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order; non-finite values become 0.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.product, self.country, self.avg_price, self.rolling_qty].map(finite_or_zero)
    }
}

/// Lenient numeric coercion: NaN and infinities fall back to zero.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Stack feature vectors of `rows` into an (n, 4) matrix.
pub fn feature_matrix<'a, I>(rows: I, encoders: &FeatureEncoders) -> crate::Result<Array2<f64>>
where
    I: IntoIterator<Item = &'a TimeSeriesRow>,
{
    let mut data = Vec::new();
    for row in rows {
        data.extend_from_slice(&encoders.vector(row).to_array());
    }
    let n_samples = data.len() / FEATURE_COUNT;
    Ok(Array2::from_shape_vec((n_samples, FEATURE_COUNT), data)?)
}

/// Features and next-month targets of the labeled rows.
pub fn labeled_matrix(
    rows: &[TimeSeriesRow],
    encoders: &FeatureEncoders,
) -> crate::Result<(Array2<f64>, Array1<f64>)> {
    let labeled: Vec<&TimeSeriesRow> = rows.iter().filter(|r| r.is_labeled()).collect();
    let records = feature_matrix(labeled.iter().copied(), encoders)?;
    let targets = labeled
        .iter()
        .map(|r| finite_or_zero(r.target.unwrap_or(0.0)))
        .collect();
    Ok((records, targets))
}
