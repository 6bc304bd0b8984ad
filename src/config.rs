//! Pipeline configuration and policy defaults

use crate::error::PipelineError;

/// Upper bound on the rows of the detailed export.
pub const MAX_DETAIL_ROWS: usize = 30;

/// Hyperparameters of the random-forest ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Depth cap of every tree
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required at a leaf
    pub min_samples_leaf: usize,
    /// Seed of the bootstrap draws and of the importance shuffles
    pub seed: u64,
    /// Worker threads scoring permutation importances (0 = all cores)
    pub n_jobs: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
            n_jobs: 0,
        }
    }
}

/// End-to-end pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// How many best-selling products enter the monthly aggregation
    pub top_products: usize,
    /// Trailing window (in periods, current included) of the rolling mean
    pub rolling_window: usize,
    /// Fraction of labeled rows held out for evaluation
    pub test_ratio: f32,
    /// Seed of the train/test shuffle
    pub split_seed: u64,
    /// Rows kept in the detailed export, at most [`MAX_DETAIL_ROWS`]
    pub detail_rows: usize,
    /// Products kept in the headline ranking
    pub headline_rows: usize,
    pub forest: ForestConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_products: 100,
            rolling_window: 3,
            test_ratio: 0.2,
            split_seed: 42,
            detail_rows: 30,
            headline_rows: 10,
            forest: ForestConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.top_products == 0 {
            return Err(PipelineError::InvalidConfig(
                "top_products must be at least 1".to_string(),
            ));
        }
        if self.rolling_window == 0 {
            return Err(PipelineError::InvalidConfig(
                "rolling_window must be at least 1".to_string(),
            ));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_ratio must lie in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.forest.n_trees == 0 {
            return Err(PipelineError::InvalidConfig(
                "the ensemble needs at least one tree".to_string(),
            ));
        }
        if self.forest.max_depth == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.forest.max_depth > usize::from(u16::MAX) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_depth must not exceed {}",
                u16::MAX
            )));
        }
        if self.detail_rows > MAX_DETAIL_ROWS {
            return Err(PipelineError::InvalidConfig(format!(
                "detail_rows must not exceed {}, got {}",
                MAX_DETAIL_ROWS, self.detail_rows
            )));
        }
        if self.forest.min_samples_leaf == 0 || self.forest.min_samples_split < 2 {
            return Err(PipelineError::InvalidConfig(
                "min_samples_leaf >= 1 and min_samples_split >= 2 are required".to_string(),
            ));
        }
        Ok(())
    }
}
