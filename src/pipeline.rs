//! End-to-end run: clean → aggregate → features → forecast → score → report

use crate::aggregate::{aggregate_monthly, last_month, monthly_totals, top_products};
use crate::config::PipelineConfig;
use crate::data::{clean_frame, CleanStats};
use crate::error::PipelineError;
use crate::features::{build_time_series, FeatureEncoders, TimeSeriesRow};
use crate::model::{DemandForecaster, ForecastEvaluation};
use crate::report::{build_report, InventoryReport};
use crate::scoring::ActivityIndex;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use tracing::{debug, info};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub clean_stats: CleanStats,
    /// Products that entered the aggregation, best seller first
    pub top_products: Vec<String>,
    pub monthly_rows: usize,
    pub last_month: NaiveDate,
    pub evaluation: ForecastEvaluation,
    pub report: InventoryReport,
}

/// Run the forecasting and advice pipeline over a raw transaction frame.
pub fn run_pipeline(raw: &DataFrame, config: &PipelineConfig) -> crate::Result<PipelineOutput> {
    config.validate()?;

    let (transactions, clean_stats) = clean_frame(raw)?;
    info!(
        input = clean_stats.input_rows,
        kept = clean_stats.kept_rows,
        dropped = clean_stats.dropped_rows(),
        "transactions cleaned"
    );
    for (reason, count) in &clean_stats.dropped {
        debug!(%reason, count, "rows dropped");
    }
    if transactions.height() == 0 {
        return Err(PipelineError::NoCleanRecords {
            dropped: clean_stats.dropped_rows(),
        }
        .into());
    }

    let top = top_products(&transactions, config.top_products)?;
    let monthly = aggregate_monthly(&transactions, &top)?;
    let last_month = last_month(&monthly)?.ok_or(PipelineError::EmptyPredictionSet)?;
    info!(
        products = top.len(),
        monthly_rows = monthly.height(),
        %last_month,
        "monthly sales aggregated"
    );

    let series = build_time_series(&monthly, config.rolling_window)?;
    let encoders = FeatureEncoders::fit(&series);
    debug!(
        products = encoders.product.len(),
        countries = encoders.country.len(),
        "encoders fitted"
    );

    let (forecaster, evaluation) = DemandForecaster::train(&series, encoders, config)?;

    let latest: Vec<&TimeSeriesRow> = series
        .iter()
        .filter(|row| row.aggregate.month == last_month)
        .collect();
    if latest.is_empty() {
        return Err(PipelineError::EmptyPredictionSet.into());
    }
    let predictions = forecaster.predict_rows(latest.iter().copied())?;

    let activity = ActivityIndex::build(&transactions, last_month)?;
    let report = build_report(
        &latest,
        &predictions.to_vec(),
        &activity,
        &monthly_totals(&monthly)?,
        last_month,
        config.detail_rows,
        config.headline_rows,
    )?;
    info!(
        rows = report.rows.len(),
        predicted_total = report.predicted_total,
        "report built"
    );

    Ok(PipelineOutput {
        clean_stats,
        top_products: top,
        monthly_rows: monthly.height(),
        last_month,
        evaluation,
        report,
    })
}
