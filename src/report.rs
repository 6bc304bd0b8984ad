//! Final ranking, advice join, trend extension and CSV export

use crate::advice::{advise, Advice, StockSignals, HIGH_FREQUENCY, STALE_AFTER_DAYS};
use crate::aggregate::{next_month, row_limit};
use crate::config::MAX_DETAIL_ROWS;
use crate::data::text_values;
use crate::features::TimeSeriesRow;
use crate::scoring::ActivityIndex;
use anyhow::Context;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;

/// Columns of the detailed export, in order.
pub const REPORT_COLUMNS: [&str; 7] = [
    "StockCode",
    "Description",
    "avgPrice",
    "recency",
    "freq",
    "predictedQty",
    "advice",
];

/// One (product, country) row of the most recent month with its forecast
/// and advice. Recency and frequency are product-level values.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub stock_code: String,
    pub description: String,
    pub country: String,
    pub avg_price: f64,
    pub recency: i64,
    pub freq: usize,
    pub predicted_qty: f64,
    pub advice: Advice,
}

/// Next-month demand of a product summed over its countries.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductForecast {
    pub stock_code: String,
    pub description: String,
    pub predicted_qty: f64,
}

/// A point of the monthly total-quantity trend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub month: NaiveDate,
    pub quantity: f64,
    /// Whether this is the synthetic next-month point
    pub forecast: bool,
}

/// Distribution of recency over the report rows, plus the shares the
/// advice rules key on.
#[derive(Debug, Clone, PartialEq)]
pub struct RecencySummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
    /// Share of rows with recency above the stale threshold
    pub stale_share: f64,
    /// Rows whose frequency exceeds the demand threshold
    pub high_frequency_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryReport {
    /// Every prediction row, sorted by predicted quantity (descending)
    pub rows: Vec<ReportRow>,
    /// Leading `rows`, the detailed export (at most [`MAX_DETAIL_ROWS`])
    pub detail: Vec<ReportRow>,
    /// Best products by summed next-month demand
    pub headline: Vec<ProductForecast>,
    /// Historical monthly totals followed by the forecast point
    pub trend: Vec<TrendPoint>,
    pub predicted_total: f64,
}

/// Join forecasts with recency/frequency, derive advice and rank.
///
/// `rows` and `predictions` are parallel: one prediction per row.
pub fn build_report(
    rows: &[&TimeSeriesRow],
    predictions: &[f64],
    activity: &ActivityIndex,
    history: &[(NaiveDate, i64)],
    last_month: NaiveDate,
    detail_rows: usize,
    headline_rows: usize,
) -> crate::Result<InventoryReport> {
    if rows.len() != predictions.len() {
        anyhow::bail!(
            "{} prediction rows but {} predictions",
            rows.len(),
            predictions.len()
        );
    }

    let mut report_rows: Vec<ReportRow> = rows
        .iter()
        .zip(predictions)
        .map(|(row, &predicted_qty)| {
            let agg = &row.aggregate;
            let signals = StockSignals {
                recency_days: activity.recency(&agg.stock_code),
                frequency: activity.frequency(&agg.stock_code),
                avg_price: agg.avg_unit_price,
            };
            ReportRow {
                stock_code: agg.stock_code.clone(),
                description: agg.description.clone(),
                country: agg.country.clone(),
                avg_price: agg.avg_unit_price,
                recency: signals.recency_days,
                freq: signals.frequency,
                predicted_qty,
                advice: advise(&signals),
            }
        })
        .collect();
    sort_by_prediction(&mut report_rows);

    let predicted_total: f64 = predictions.iter().sum();
    let headline = rank_products(&report_rows, headline_rows)?;
    let trend = extend_trend(history, last_month, predicted_total)?;
    let detail = report_rows
        .iter()
        .take(detail_rows.min(MAX_DETAIL_ROWS))
        .cloned()
        .collect();

    Ok(InventoryReport {
        rows: report_rows,
        detail,
        headline,
        trend,
        predicted_total,
    })
}

/// Stable descending sort on predicted quantity.
pub fn sort_by_prediction(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| b.predicted_qty.total_cmp(&a.predicted_qty));
}

/// Sum predictions per product across countries and keep the best `n`.
///
/// Equal totals are ordered by stock code.
pub fn rank_products(rows: &[ReportRow], n: usize) -> crate::Result<Vec<ProductForecast>> {
    let frame = df!(
        "StockCode" => rows.iter().map(|r| r.stock_code.as_str()).collect::<Vec<_>>(),
        "Description" => rows.iter().map(|r| r.description.as_str()).collect::<Vec<_>>(),
        "PredictedQty" => rows.iter().map(|r| r.predicted_qty).collect::<Vec<_>>()
    )?;

    let ranked = frame
        .lazy()
        .group_by([col("StockCode")])
        .agg([
            col("Description").first(),
            col("PredictedQty").sum(),
        ])
        .sort_by_exprs(
            [col("PredictedQty"), col("StockCode")],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .limit(row_limit(n))
        .collect()?;

    let codes = text_values(&ranked, "StockCode")?;
    let descriptions = text_values(&ranked, "Description")?;
    let totals = ranked.column("PredictedQty")?.f64()?;
    Ok(codes
        .into_iter()
        .zip(descriptions)
        .zip(totals)
        .map(|((stock_code, description), total)| ProductForecast {
            stock_code,
            description,
            predicted_qty: total.unwrap_or(0.0),
        })
        .collect())
}

/// Append the predicted total as a point dated the month after `last_month`.
pub fn extend_trend(
    history: &[(NaiveDate, i64)],
    last_month: NaiveDate,
    predicted_total: f64,
) -> crate::Result<Vec<TrendPoint>> {
    let forecast_month = next_month(last_month)
        .with_context(|| format!("no month follows {}", last_month))?;

    let mut trend: Vec<TrendPoint> = history
        .iter()
        .map(|&(month, quantity)| TrendPoint {
            month,
            quantity: quantity as f64,
            forecast: false,
        })
        .collect();
    trend.push(TrendPoint {
        month: forecast_month,
        quantity: predicted_total,
        forecast: true,
    });
    Ok(trend)
}

/// Describe the recency column; `None` for an empty report.
pub fn summarize_recency(rows: &[ReportRow]) -> crate::Result<Option<RecencySummary>> {
    if rows.is_empty() {
        return Ok(None);
    }

    let recency = Float64Chunked::from_vec(
        "recency",
        rows.iter().map(|r| r.recency as f64).collect(),
    );
    let count = recency.len();
    let quantile = |q: f64| -> crate::Result<f64> {
        Ok(recency
            .quantile(q, QuantileInterpolOptions::Linear)?
            .unwrap_or(f64::NAN))
    };
    // Sample standard deviation, undefined for a single row
    let std = if count > 1 {
        recency.std(1).unwrap_or(f64::NAN)
    } else {
        f64::NAN
    };

    Ok(Some(RecencySummary {
        count,
        mean: recency.mean().unwrap_or(f64::NAN),
        std,
        min: recency.min().unwrap_or(f64::NAN),
        q25: quantile(0.25)?,
        median: recency.median().unwrap_or(f64::NAN),
        q75: quantile(0.75)?,
        max: recency.max().unwrap_or(f64::NAN),
        stale_share: rows.iter().filter(|r| r.recency > STALE_AFTER_DAYS).count() as f64
            / count as f64,
        high_frequency_rows: rows.iter().filter(|r| r.freq > HIGH_FREQUENCY).count(),
    }))
}

/// Write report rows as CSV with [`REPORT_COLUMNS`], no index column.
pub fn write_report_csv(path: &str, rows: &[ReportRow]) -> crate::Result<()> {
    let mut df = df!(
        REPORT_COLUMNS[0] => rows.iter().map(|r| r.stock_code.as_str()).collect::<Vec<_>>(),
        REPORT_COLUMNS[1] => rows.iter().map(|r| r.description.as_str()).collect::<Vec<_>>(),
        REPORT_COLUMNS[2] => rows.iter().map(|r| r.avg_price).collect::<Vec<_>>(),
        REPORT_COLUMNS[3] => rows.iter().map(|r| r.recency).collect::<Vec<_>>(),
        REPORT_COLUMNS[4] => rows.iter().map(|r| r.freq as i64).collect::<Vec<_>>(),
        REPORT_COLUMNS[5] => rows.iter().map(|r| r.predicted_qty).collect::<Vec<_>>(),
        REPORT_COLUMNS[6] => rows.iter().map(|r| r.advice.as_str()).collect::<Vec<_>>()
    )?;

    let mut file = File::create(path).with_context(|| format!("cannot create {}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

/// Write the trend series as `InvoiceMonth,Quantity,Forecast`.
pub fn write_trend_csv(path: &str, trend: &[TrendPoint]) -> crate::Result<()> {
    let mut df = df!(
        "InvoiceMonth" => trend.iter().map(|p| p.month.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
        "Quantity" => trend.iter().map(|p| p.quantity).collect::<Vec<_>>(),
        "Forecast" => trend.iter().map(|p| p.forecast).collect::<Vec<_>>()
    )?;

    let mut file = File::create(path).with_context(|| format!("cannot create {}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}
