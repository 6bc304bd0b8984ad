//! Transaction loading (Polars CSV reader) and record cleaning

use crate::aggregate::month_start;
use crate::error::{DropReason, PipelineError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Columns every transaction source must provide.
const REQUIRED_COLUMNS: [&str; 6] = [
    "StockCode",
    "Description",
    "Quantity",
    "InvoiceDate",
    "UnitPrice",
    "Country",
];

/// Columns filled with nulls when the source lacks them.
const OPTIONAL_COLUMNS: [&str; 2] = ["InvoiceNo", "CustomerID"];

/// Largest quantity a single line may carry.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Timestamp layouts accepted besides RFC 3339.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// One row of the tabular source, untouched. Blank cells are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawTransaction<'a> {
    pub invoice_no: Option<&'a str>,
    pub stock_code: Option<&'a str>,
    pub description: Option<&'a str>,
    pub quantity: Option<&'a str>,
    pub invoice_date: Option<&'a str>,
    pub unit_price: Option<&'a str>,
    pub country: Option<&'a str>,
}

/// A cleaned transaction line: quantity > 0, every required field present.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoice_no: Option<String>,
    pub stock_code: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub country: String,
    pub invoice_date: NaiveDateTime,
}

/// Counters collected while cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanStats {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl CleanStats {
    pub fn dropped_rows(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Read a transaction CSV with every column kept as text.
///
/// `StockCode`, `Description`, `Quantity`, `InvoiceDate`, `UnitPrice` and
/// `Country` must exist; `InvoiceNo` and `CustomerID` are optional.
pub fn load_raw_transactions(file_path: &str) -> crate::Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()?;

    for name in REQUIRED_COLUMNS {
        if df.column(name).is_err() {
            return Err(PipelineError::MissingColumn(name.to_string()).into());
        }
    }
    for name in OPTIONAL_COLUMNS {
        if df.column(name).is_err() {
            let height = df.height();
            df.with_column(Series::full_null(name, height, &DataType::String))?;
        }
    }

    debug!(rows = df.height(), columns = df.width(), "raw frame loaded");
    Ok(df)
}

/// Clean a raw text frame into a typed transaction frame.
///
/// The result has `InvoiceNo`, `StockCode`, `Description`, `Quantity`,
/// `UnitPrice`, `Country`, `InvoiceDate`, `InvoiceMonth` and `TotalPrice`.
pub fn clean_frame(raw: &DataFrame) -> crate::Result<(DataFrame, CleanStats)> {
    let invoice_no = text_column(raw, "InvoiceNo")?;
    let stock_code = text_column(raw, "StockCode")?;
    let description = text_column(raw, "Description")?;
    let quantity = text_column(raw, "Quantity")?;
    let invoice_date = text_column(raw, "InvoiceDate")?;
    let unit_price = text_column(raw, "UnitPrice")?;
    let country = text_column(raw, "Country")?;

    let rows = (0..raw.height()).map(|i| RawTransaction {
        invoice_no: invoice_no.get(i),
        stock_code: stock_code.get(i),
        description: description.get(i),
        quantity: quantity.get(i),
        invoice_date: invoice_date.get(i),
        unit_price: unit_price.get(i),
        country: country.get(i),
    });
    let (records, stats) = clean_records(rows);

    Ok((transactions_frame(&records)?, stats))
}

fn text_column<'a>(df: &'a DataFrame, name: &str) -> crate::Result<&'a StringChunked> {
    let series = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?;
    Ok(series.str()?)
}

/// Clean raw rows, dropping anything incomplete or malformed.
pub fn clean_records<'a, I>(raw: I) -> (Vec<Transaction>, CleanStats)
where
    I: IntoIterator<Item = RawTransaction<'a>>,
{
    let mut stats = CleanStats::default();
    let mut records = Vec::new();

    for row in raw {
        stats.input_rows += 1;
        match clean_record(&row) {
            Ok(record) => records.push(record),
            Err(reason) => *stats.dropped.entry(reason).or_insert(0) += 1,
        }
    }

    stats.kept_rows = records.len();
    (records, stats)
}

/// Validate and type a single raw row.
pub fn clean_record(row: &RawTransaction) -> Result<Transaction, DropReason> {
    let invoice_date = required(row.invoice_date, "InvoiceDate")?;
    let stock_code = required(row.stock_code, "StockCode")?;
    let country = required(row.country, "Country")?;
    let unit_price = required(row.unit_price, "UnitPrice")?;
    let quantity = required(row.quantity, "Quantity")?;

    let invoice_date = parse_invoice_date(invoice_date).ok_or(DropReason::UnparsableDate)?;
    let quantity = parse_quantity(quantity).ok_or(DropReason::NonNumeric("Quantity"))?;
    let unit_price = parse_price(unit_price).ok_or(DropReason::NonNumeric("UnitPrice"))?;

    if quantity <= 0 {
        return Err(DropReason::NonPositiveQuantity);
    }
    if quantity > MAX_QUANTITY {
        return Err(DropReason::QuantityOutOfRange);
    }
    if unit_price < 0.0 {
        return Err(DropReason::NegativePrice);
    }

    Ok(Transaction {
        invoice_no: non_blank(row.invoice_no).map(str::to_string),
        stock_code: stock_code.to_string(),
        description: non_blank(row.description).map(str::to_string),
        quantity,
        unit_price,
        country: country.to_string(),
        invoice_date,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, DropReason> {
    non_blank(value).ok_or(DropReason::MissingField(field))
}

/// Stack cleaned transactions into a frame and derive `InvoiceMonth` and
/// `TotalPrice`.
pub fn transactions_frame(records: &[Transaction]) -> crate::Result<DataFrame> {
    let invoice_dates = DatetimeChunked::from_naive_datetime(
        "InvoiceDate",
        records.iter().map(|r| r.invoice_date),
        TimeUnit::Microseconds,
    );
    let invoice_months =
        DateChunked::from_naive_date("InvoiceMonth", records.iter().map(|r| month_start(r.invoice_date)));

    let df = DataFrame::new(vec![
        Series::new(
            "InvoiceNo",
            records.iter().map(|r| r.invoice_no.as_deref()).collect::<Vec<_>>(),
        ),
        Series::new(
            "StockCode",
            records.iter().map(|r| r.stock_code.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "Description",
            records.iter().map(|r| r.description.as_deref()).collect::<Vec<_>>(),
        ),
        Series::new("Quantity", records.iter().map(|r| r.quantity).collect::<Vec<_>>()),
        Series::new("UnitPrice", records.iter().map(|r| r.unit_price).collect::<Vec<_>>()),
        Series::new(
            "Country",
            records.iter().map(|r| r.country.as_str()).collect::<Vec<_>>(),
        ),
        invoice_dates.into_series(),
        invoice_months.into_series(),
    ])?;

    let df = df
        .lazy()
        .with_columns([
            (col("Quantity").cast(DataType::Float64) * col("UnitPrice")).alias("TotalPrice"),
        ])
        .collect()?;
    Ok(df)
}

/// Non-null text values of a column, in row order.
pub(crate) fn text_values(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    df.column(name)?
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("null value in column {}", name))
        })
        .collect()
}

/// Non-null date values of a column, in row order.
pub(crate) fn date_values(df: &DataFrame, name: &str) -> crate::Result<Vec<NaiveDate>> {
    df.column(name)?
        .date()?
        .as_date_iter()
        .map(|value| value.ok_or_else(|| anyhow::anyhow!("null value in column {}", name)))
        .collect()
}

/// Parse an invoice timestamp; offsets are normalized to UTC.
pub fn parse_invoice_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Integer quantity; integral floats such as `"6.0"` are accepted.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
