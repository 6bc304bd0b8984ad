//! Domain errors and the per-row drop taxonomy

use std::fmt;
use thiserror::Error;

/// Fatal pipeline failures. Row-level problems never surface here, they are
/// counted as [`DropReason`]s instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The tabular source lacks a required column.
    #[error("missing required column: {0}")]
    MissingColumn(String),

    /// Every input row was dropped by the cleaner.
    #[error("no valid transactions left after cleaning ({dropped} rows dropped)")]
    NoCleanRecords { dropped: usize },

    /// Not enough labeled (feature, next-month quantity) pairs to train on.
    #[error("insufficient history: need at least {needed} labeled rows, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// The most recent month produced no rows to predict.
    #[error("no rows available for the most recent month")]
    EmptyPredictionSet,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a raw transaction row was discarded by the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// A required field is absent or blank.
    MissingField(&'static str),
    /// The invoice timestamp could not be parsed.
    UnparsableDate,
    /// Quantity or unit price is not a number.
    NonNumeric(&'static str),
    /// Returns and cancellations (quantity <= 0).
    NonPositiveQuantity,
    /// Quantity above the largest plausible line quantity.
    QuantityOutOfRange,
    /// Unit price below zero.
    NegativePrice,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingField(field) => write!(f, "missing {}", field),
            DropReason::UnparsableDate => write!(f, "unparsable invoice date"),
            DropReason::NonNumeric(field) => write!(f, "non-numeric {}", field),
            DropReason::NonPositiveQuantity => write!(f, "quantity <= 0"),
            DropReason::QuantityOutOfRange => write!(f, "quantity out of range"),
            DropReason::NegativePrice => write!(f, "negative unit price"),
        }
    }
}
