//! Integration tests for StockForge

use stockforge::aggregate::{aggregate_monthly, monthly_rows, top_products};
use stockforge::scoring::ActivityIndex;
use stockforge::{
    clean_frame, load_raw_transactions, run_pipeline, write_report_csv, Advice, ForestConfig,
    PipelineConfig, PipelineError, MAX_DETAIL_ROWS,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

const PRODUCTS: [(&str, &str, f64, i64); 5] = [
    ("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", 2.55, 40),
    ("71053", "WHITE METAL LANTERN", 3.39, 25),
    ("22633", "HAND WARMER UNION JACK", 1.85, 60),
    ("84406B", "CREAM CUPID HEARTS COAT HANGER", 2.75, 15),
    ("22752", "SET 7 BABUSHKA NESTING BOXES", 7.65, 10),
];

/// Number of malformed or returned rows written by `create_test_csv`.
const NOISE_ROWS: usize = 4;

/// Six months of sales for five products in two countries, a premium
/// product with many June invoices, and a few rows the cleaner must drop.
fn create_test_csv() -> NamedTempFile {
    create_test_csv_with(&[])
}

/// `create_test_csv` plus the given data lines.
fn create_test_csv_with(extra_rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();

    let mut invoice = 536000;
    for month in 1..=6 {
        for (code, description, price, base) in PRODUCTS {
            for (offset, country) in ["United Kingdom", "France"].iter().enumerate() {
                invoice += 1;
                let quantity = base + month * 3 + offset as i64 * 2;
                writeln!(
                    file,
                    "{},{},{},{},2011-{:02}-10T10:00:00,{},12345,{}",
                    invoice, code, description, quantity, month, price, country
                )
                .unwrap();
            }
        }

        let luxury_invoices = if month == 6 { 22 } else { 2 };
        for i in 0..luxury_invoices {
            invoice += 1;
            writeln!(
                file,
                "{},LUX01,LUXURY MANTEL CLOCK,2,2011-{:02}-{:02}T12:00:00,25.00,17850,United Kingdom",
                invoice,
                month,
                1 + i % 25
            )
            .unwrap();
        }
    }

    // Rows the cleaner must drop
    writeln!(file, "C536999,85123A,WHITE HANGING HEART T-LIGHT HOLDER,-6,2011-06-12T10:00:00,2.55,12345,United Kingdom").unwrap();
    writeln!(file, "537000,71053,WHITE METAL LANTERN,6,not-a-date,3.39,12345,United Kingdom").unwrap();
    writeln!(file, "537001,22633,HAND WARMER UNION JACK,six,2011-06-12T10:00:00,1.85,12345,France").unwrap();
    writeln!(file, "537002,,MYSTERY ITEM,3,2011-06-12T10:00:00,1.00,12345,France").unwrap();

    for row in extra_rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

fn fast_config(n_jobs: usize) -> PipelineConfig {
    PipelineConfig {
        forest: ForestConfig {
            n_trees: 25,
            max_depth: 8,
            n_jobs,
            ..ForestConfig::default()
        },
        ..PipelineConfig::default()
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();

    let output = run_pipeline(&raw, &fast_config(2)).unwrap();

    // Cleaning
    assert_eq!(output.clean_stats.input_rows, raw.height());
    assert_eq!(output.clean_stats.dropped_rows(), NOISE_ROWS);

    // Aggregation: 5 products x 2 countries + 1 product x 1 country, 6 months
    assert_eq!(output.top_products.len(), 6);
    assert_eq!(output.monthly_rows, 11 * 6);
    assert_eq!(output.last_month, ymd(2011, 6, 1));

    // Training: the last month of each of the 11 series has no target
    assert_eq!(output.evaluation.labeled_rows, 11 * 5);
    assert!(output.evaluation.mse.is_some());

    // Report: one row per (product, country) of June
    let report = &output.report;
    assert_eq!(report.rows.len(), 11);
    assert!(report.detail.len() <= 30);
    assert!(report
        .detail
        .windows(2)
        .all(|pair| pair[0].predicted_qty >= pair[1].predicted_qty));
    assert!(report.headline.len() <= 10);
    assert_eq!(report.headline.len(), 6);

    for row in &report.rows {
        if row.stock_code == "LUX01" {
            assert_eq!(row.freq, 22);
            assert_eq!(row.advice, Advice::Push);
        } else {
            assert_eq!(row.freq, 2);
            assert_eq!(row.advice, Advice::Regular);
        }
        assert!(row.recency <= 60);
    }

    let forecast_point = report.trend.last().unwrap();
    assert!(forecast_point.forecast);
    assert_eq!(forecast_point.month, ymd(2011, 7, 1));
    assert!((forecast_point.quantity - report.predicted_total).abs() < 1e-9);
    assert_eq!(report.trend.len(), 7);
}

#[test]
fn test_detail_export_is_capped() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();
    let config = PipelineConfig {
        detail_rows: 4,
        ..fast_config(1)
    };

    let output = run_pipeline(&raw, &config).unwrap();
    assert_eq!(output.report.detail.len(), 4);
    assert_eq!(output.report.detail[..], output.report.rows[..4]);

    let out_file = NamedTempFile::new().unwrap();
    let out_path = out_file.path().to_str().unwrap();
    write_report_csv(out_path, &output.report.detail).unwrap();

    let content = std::fs::read_to_string(out_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "StockCode,Description,avgPrice,recency,freq,predictedQty,advice"
    );
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_detail_rows_above_cap_are_rejected() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();
    let config = PipelineConfig {
        detail_rows: MAX_DETAIL_ROWS + 15,
        ..fast_config(1)
    };

    let err = run_pipeline(&raw, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn test_product_new_in_last_month_is_forecast() {
    let test_file = create_test_csv_with(&[
        "538001,NEW01,NEW SEASON CANDLE,12,2011-06-20T09:00:00,4.25,17850,United Kingdom",
    ]);
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();

    let output = run_pipeline(&raw, &fast_config(1)).unwrap();
    assert!(output.top_products.iter().any(|code| code == "NEW01"));

    let new_rows: Vec<_> = output
        .report
        .rows
        .iter()
        .filter(|r| r.stock_code == "NEW01")
        .collect();
    assert_eq!(new_rows.len(), 1);
    let row = new_rows[0];
    assert_eq!(row.country, "United Kingdom");
    assert_eq!(row.description, "NEW SEASON CANDLE");
    assert!(row.predicted_qty.is_finite());
    assert_eq!(row.freq, 1);
    assert_eq!(output.report.rows.len(), 12);
}

#[test]
fn test_product_absent_from_reference_month_has_default_frequency() {
    let test_file = create_test_csv_with(&[
        "538002,OLD01,DISCONTINUED TEA TIN,500,2011-03-15T09:00:00,1.95,17850,United Kingdom",
    ]);
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();

    let (transactions, _) = clean_frame(&raw).unwrap();
    let activity = ActivityIndex::build(&transactions, ymd(2011, 6, 1)).unwrap();
    assert_eq!(activity.frequency("OLD01"), 1);
    // Last sale 2011-03-15 09:00, latest invoice of the log 2011-06-22 12:00
    assert_eq!(activity.recency("OLD01"), 99);

    let output = run_pipeline(&raw, &fast_config(1)).unwrap();
    assert!(output.top_products.iter().any(|code| code == "OLD01"));
    assert!(output.report.rows.iter().all(|r| r.stock_code != "OLD01"));
    assert_eq!(output.report.rows.len(), 11);
}

#[test]
fn test_pipeline_is_reproducible() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();

    let first = run_pipeline(&raw, &fast_config(1)).unwrap();
    let second = run_pipeline(&raw, &fast_config(4)).unwrap();

    assert_eq!(first.evaluation, second.evaluation);
    assert_eq!(first.report, second.report);
}

#[test]
fn test_aggregation_is_a_partition() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();
    let (transactions, _) = clean_frame(&raw).unwrap();
    let quantities: Vec<i64> = transactions
        .column("Quantity")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(quantities.len(), transactions.height());
    assert!(quantities.iter().all(|&q| q > 0));

    let selected = top_products(&transactions, 100).unwrap();
    let aggregates = monthly_rows(&aggregate_monthly(&transactions, &selected).unwrap()).unwrap();

    let cleaned_total: i64 = quantities.iter().sum();
    let aggregated_total: i64 = aggregates.iter().map(|a| a.quantity).sum();
    assert_eq!(cleaned_total, aggregated_total);

    let keys: BTreeSet<(&str, &str, NaiveDate)> = aggregates
        .iter()
        .map(|a| (a.stock_code.as_str(), a.country.as_str(), a.month))
        .collect();
    assert_eq!(keys.len(), aggregates.len());
}

#[test]
fn test_top_products_restriction() {
    let test_file = create_test_csv();
    let raw = load_raw_transactions(test_file.path().to_str().unwrap()).unwrap();
    let config = PipelineConfig {
        top_products: 2,
        ..fast_config(1)
    };

    let output = run_pipeline(&raw, &config).unwrap();
    // 22633 and 85123A sell the most
    assert_eq!(output.top_products, vec!["22633", "85123A"]);
    assert!(output
        .report
        .rows
        .iter()
        .all(|r| r.stock_code == "22633" || r.stock_code == "85123A"));
}

#[test]
fn test_single_month_is_insufficient_history() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536366,71053,WHITE METAL LANTERN,6,2010-12-01T08:28:00,3.39,17850,United Kingdom").unwrap();

    let raw = load_raw_transactions(file.path().to_str().unwrap()).unwrap();
    let err = run_pipeline(&raw, &fast_config(1)).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InsufficientHistory { got: 0, .. })
    ));
}

#[test]
fn test_all_rows_dropped() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "C1,85123A,WHITE HANGING HEART T-LIGHT HOLDER,-6,2010-12-01T08:26:00,2.55,17850,United Kingdom").unwrap();

    let raw = load_raw_transactions(file.path().to_str().unwrap()).unwrap();
    let err = run_pipeline(&raw, &fast_config(1)).unwrap_err();

    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::NoCleanRecords { dropped: 1 })
    );
}
