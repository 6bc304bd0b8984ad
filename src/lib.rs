//! StockForge: next-month demand forecasting and stocking advice
//!
//! This library cleans a retail transaction log, aggregates the best-selling
//! products into monthly series with polars, forecasts next-month quantity
//! with a random-forest ensemble and turns recency, frequency and price into an
//! inventory action per product.

pub mod advice;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scoring;

// Re-export public items for easier access
pub use advice::{advise, Advice, StockSignals};
pub use cli::Args;
pub use config::{ForestConfig, PipelineConfig, MAX_DETAIL_ROWS};
pub use data::{clean_frame, load_raw_transactions, CleanStats, Transaction};
pub use error::{DropReason, PipelineError};
pub use model::{permutation_importances, DemandForecaster, DemandForest, ForecastEvaluation};
pub use pipeline::{run_pipeline, PipelineOutput};
pub use report::{write_report_csv, write_trend_csv, InventoryReport, ReportRow};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
