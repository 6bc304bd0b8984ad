//! Random-forest forecaster for next-month quantity

use crate::config::{ForestConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::features::{feature_matrix, labeled_matrix, FeatureEncoders, TimeSeriesRow, FEATURE_NAMES};
use linfa::prelude::*;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;
use tracing::{debug, info};

/// Minimum labeled rows needed to train.
pub const MIN_TRAINING_ROWS: usize = 2;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bootstrap-aggregated regression trees with a depth cap.
///
/// Every tree considers all feature columns at each split; the bootstrap
/// draws come from `seed`, so a fit is reproducible.
pub struct DemandForest {
    model: Forest,
    n_features: usize,
}

impl fmt::Debug for DemandForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandForest")
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

impl DemandForest {
    pub fn fit(
        config: &ForestConfig,
        records: ArrayView2<f64>,
        targets: ArrayView1<f64>,
    ) -> crate::Result<Self> {
        let n_samples = records.nrows();
        if n_samples == 0 || n_samples != targets.len() {
            anyhow::bail!(
                "cannot fit on {} rows with {} targets",
                n_samples,
                targets.len()
            );
        }
        let max_depth = u16::try_from(config.max_depth).map_err(|_| {
            PipelineError::InvalidConfig(format!("max_depth {} is too large", config.max_depth))
        })?;

        let params = RandomForestRegressorParameters {
            n_trees: config.n_trees,
            max_depth: Some(max_depth),
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            m: Some(records.ncols()),
            seed: config.seed,
            ..Default::default()
        };
        let model = RandomForestRegressor::fit(&dense_matrix(records), &targets.to_vec(), params)?;
        debug!(trees = config.n_trees, max_depth, rows = n_samples, "forest fitted");

        Ok(Self {
            model,
            n_features: records.ncols(),
        })
    }

    /// Mean of the tree predictions for every row of `records`.
    pub fn predict(&self, records: ArrayView2<f64>) -> crate::Result<Array1<f64>> {
        if records.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }
        if records.ncols() != self.n_features {
            anyhow::bail!(
                "expected {} feature columns, got {}",
                self.n_features,
                records.ncols()
            );
        }
        Ok(Array1::from(self.model.predict(&dense_matrix(records))?))
    }
}

fn dense_matrix(records: ArrayView2<f64>) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = records.outer_iter().map(|row| row.to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows)
}

/// Permutation importance of every feature column, normalized to sum to 1.
///
/// A feature scores the mean-squared-error increase observed when its column
/// is shuffled. Feature `j` is shuffled with a generator seeded `seed + j`,
/// so the scores do not depend on the worker count.
pub fn permutation_importances(
    forest: &DemandForest,
    records: ArrayView2<f64>,
    targets: ArrayView1<f64>,
    seed: u64,
    n_jobs: usize,
) -> crate::Result<Vec<f64>> {
    let baseline = forest.predict(records)?.mean_squared_error(&targets)?;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
    let increases: Vec<f64> = pool.install(|| {
        (0..records.ncols())
            .into_par_iter()
            .map(|feature| -> crate::Result<f64> {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(feature as u64));
                let mut column = records.column(feature).to_vec();
                column.shuffle(&mut rng);

                let mut shuffled = records.to_owned();
                shuffled.column_mut(feature).assign(&Array1::from(column));
                let error = forest
                    .predict(shuffled.view())?
                    .mean_squared_error(&targets)?;
                Ok((error - baseline).max(0.0))
            })
            .collect::<crate::Result<Vec<f64>>>()
    })?;
    debug!(threads = pool.current_num_threads(), "permutation importances computed");

    let total: f64 = increases.iter().sum();
    if total > 0.0 {
        Ok(increases.into_iter().map(|v| v / total).collect())
    } else {
        Ok(increases)
    }
}

/// Diagnostics of a training run. Informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEvaluation {
    pub labeled_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Held-out mean squared error; `None` when the held-out split is empty
    pub mse: Option<f64>,
    pub importances: Vec<(&'static str, f64)>,
}

/// A fitted forest together with the encoders its inputs were built with.
#[derive(Debug)]
pub struct DemandForecaster {
    forest: DemandForest,
    encoders: FeatureEncoders,
}

impl DemandForecaster {
    /// Train on the labeled rows of `rows` using a seeded random split.
    pub fn train(
        rows: &[TimeSeriesRow],
        encoders: FeatureEncoders,
        config: &PipelineConfig,
    ) -> crate::Result<(Self, ForecastEvaluation)> {
        let (records, targets) = labeled_matrix(rows, &encoders)?;
        let labeled_rows = targets.len();
        if labeled_rows < MIN_TRAINING_ROWS {
            return Err(PipelineError::InsufficientHistory {
                needed: MIN_TRAINING_ROWS,
                got: labeled_rows,
            }
            .into());
        }

        let mut rng = StdRng::seed_from_u64(config.split_seed);
        let (train, test) = Dataset::new(records, targets)
            .shuffle(&mut rng)
            .split_with_ratio(1.0 - config.test_ratio);

        let forest =
            DemandForest::fit(&config.forest, train.records().view(), train.targets().view())?;

        let mse = if test.nsamples() > 0 {
            let predicted = forest.predict(test.records().view())?;
            Some(predicted.mean_squared_error(&test)?)
        } else {
            None
        };

        // Held-out rows when there are any
        let scored = if test.nsamples() > 0 { &test } else { &train };
        let importances = permutation_importances(
            &forest,
            scored.records().view(),
            scored.targets().view(),
            config.forest.seed,
            config.forest.n_jobs,
        )?;

        let evaluation = ForecastEvaluation {
            labeled_rows,
            train_rows: train.nsamples(),
            test_rows: test.nsamples(),
            mse,
            importances: FEATURE_NAMES.iter().copied().zip(importances).collect(),
        };
        info!(
            labeled = labeled_rows,
            train = evaluation.train_rows,
            test = evaluation.test_rows,
            mse = ?evaluation.mse,
            "forecaster trained"
        );

        Ok((Self { forest, encoders }, evaluation))
    }

    /// Predict next-month quantity for arbitrary rows, labeled or not.
    pub fn predict_rows<'a, I>(&self, rows: I) -> crate::Result<Array1<f64>>
    where
        I: IntoIterator<Item = &'a TimeSeriesRow>,
    {
        let records = feature_matrix(rows, &self.encoders)?;
        self.forest.predict(records.view())
    }
}
