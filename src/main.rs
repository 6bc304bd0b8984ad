//! StockForge: demand forecasting and stocking advice CLI
//!
//! This is the main entrypoint that orchestrates data loading, model fitting,
//! reporting, and ad-hoc advice.

use anyhow::Result;
use clap::Parser;
use stockforge::report::summarize_recency;
use stockforge::{
    advise, load_raw_transactions, logging, run_pipeline, write_report_csv, write_trend_csv, Args,
    PipelineOutput, StockSignals,
};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    logging::init(args.verbose, args.json_logs);

    // Check if in advice mode
    if let Some(signals) = args.parse_signals()? {
        run_advice_mode(signals);
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

/// Evaluate the advice rules for a single product
fn run_advice_mode(signals: StockSignals) {
    println!("=== Advice Mode ===");
    println!(
        "Input: recency={} days, frequency={}, avgPrice={:.2}",
        signals.recency_days, signals.frequency, signals.avg_price
    );
    println!("\n✓ Advice: {}", advise(&signals));
}

/// Run the full forecasting pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Demand Forecasting Pipeline ===\n");

    let start_time = Instant::now();
    let config = args.pipeline_config();

    // Step 1: Load raw transactions
    let load_start = Instant::now();
    let raw = load_raw_transactions(&args.input)?;
    info!(
        rows = raw.height(),
        columns = raw.width(),
        input = %args.input,
        elapsed_s = load_start.elapsed().as_secs_f64(),
        "transactions loaded"
    );
    println!("✓ Data loaded: {} rows x {} columns", raw.height(), raw.width());

    // Step 2: Clean, aggregate, train, predict, score
    let run_start = Instant::now();
    let output = run_pipeline(&raw, &config)?;
    info!(elapsed_s = run_start.elapsed().as_secs_f64(), "pipeline finished");

    print_diagnostics(&output)?;

    // Step 3: Export
    write_report_csv(&args.output, &output.report.detail)?;
    println!("\nDetailed predictions saved to: {}", args.output);
    if let Some(trend_path) = &args.trend_output {
        write_trend_csv(trend_path, &output.report.trend)?;
        println!("Monthly trend saved to: {}", trend_path);
    }

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn print_diagnostics(output: &PipelineOutput) -> Result<()> {
    let stats = &output.clean_stats;
    println!(
        "✓ Cleaned: {} kept, {} dropped",
        stats.kept_rows,
        stats.dropped_rows()
    );
    for (reason, count) in &stats.dropped {
        println!("  {:<24} {}", reason.to_string(), count);
    }
    println!(
        "✓ Aggregated: {} products, {} monthly rows",
        output.top_products.len(),
        output.monthly_rows
    );

    let evaluation = &output.evaluation;
    println!("\n=== Model Evaluation ===");
    println!(
        "Labeled rows: {} (train {}, test {})",
        evaluation.labeled_rows, evaluation.train_rows, evaluation.test_rows
    );
    match evaluation.mse {
        Some(mse) => println!("Test MSE: {:.4}", mse),
        None => println!("Test MSE: n/a (empty held-out split)"),
    }
    for (feature, importance) in &evaluation.importances {
        println!("Feature: {}, Importance: {:.4}", feature, importance);
    }
    println!("Last available month in dataset: {}", output.last_month);

    println!("\n=== Predicted Top Product Sales (next month, all countries) ===");
    for (rank, product) in output.report.headline.iter().enumerate() {
        println!(
            "{:>2}. {:<10} {:<40} {:>10.1}",
            rank + 1,
            product.stock_code,
            product.description,
            product.predicted_qty
        );
    }

    if let Some(summary) = summarize_recency(&output.report.rows)? {
        println!("\n=== Recency Summary ===");
        println!("count {:>10}", summary.count);
        println!("mean  {:>10.2}", summary.mean);
        println!("std   {:>10.2}", summary.std);
        println!("min   {:>10.2}", summary.min);
        println!("25%   {:>10.2}", summary.q25);
        println!("50%   {:>10.2}", summary.median);
        println!("75%   {:>10.2}", summary.q75);
        println!("max   {:>10.2}", summary.max);
        println!("Share with recency > 60: {:.3}", summary.stale_share);
        println!("Rows with freq > 20: {}", summary.high_frequency_rows);
    }

    Ok(())
}
