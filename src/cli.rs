//! Command-line interface definitions and argument parsing

use crate::advice::StockSignals;
use crate::config::{ForestConfig, PipelineConfig};
use clap::Parser;

/// Forecast next-month demand of the best-selling products and derive
/// stocking advice
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transaction CSV
    #[arg(short, long, default_value = "data.csv", env = "STOCKFORGE_INPUT")]
    pub input: String,

    /// Output path for the detailed prediction table
    #[arg(
        short,
        long,
        default_value = "predicted_top_products.csv",
        env = "STOCKFORGE_OUTPUT"
    )]
    pub output: String,

    /// Optional output path for the monthly trend (with the forecast point)
    #[arg(long, env = "STOCKFORGE_TREND_OUTPUT")]
    pub trend_output: Option<String>,

    /// Advice mode: provide recency,frequency,price as comma-separated string
    /// Example: --advise "70,5,50.0"
    #[arg(short, long)]
    pub advise: Option<String>,

    /// Number of best-selling products to model
    #[arg(long, default_value = "100")]
    pub top_products: usize,

    /// Number of trees in the ensemble
    #[arg(long, default_value = "100")]
    pub trees: usize,

    /// Maximum depth of each tree
    #[arg(long, default_value = "15")]
    pub max_depth: usize,

    /// Random seed for the train/test split, bootstrapping and importance shuffles
    #[arg(long, default_value = "42", env = "STOCKFORGE_SEED")]
    pub seed: u64,

    /// Fraction of labeled rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    pub test_ratio: f32,

    /// Threads scoring feature importances (0 = all cores)
    #[arg(short, long, default_value = "0", env = "STOCKFORGE_JOBS")]
    pub jobs: usize,

    /// Rows in the detailed export (at most 30)
    #[arg(long, default_value = "30")]
    pub detail_rows: usize,

    /// Products in the headline ranking
    #[arg(long, default_value = "10")]
    pub headline_rows: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            top_products: self.top_products,
            test_ratio: self.test_ratio,
            split_seed: self.seed,
            detail_rows: self.detail_rows,
            headline_rows: self.headline_rows,
            forest: ForestConfig {
                n_trees: self.trees,
                max_depth: self.max_depth,
                seed: self.seed,
                n_jobs: self.jobs,
                ..ForestConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    /// Parse advice inputs from the advise string
    /// Expected format: "recency,frequency,price"
    pub fn parse_signals(&self) -> crate::Result<Option<StockSignals>> {
        if let Some(ref advise_str) = self.advise {
            let parts: Vec<&str> = advise_str.split(',').collect();
            if parts.len() != 3 {
                anyhow::bail!("Advise values must be in format 'recency,frequency,price'");
            }

            let recency_days: i64 = parts[0]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid recency value: {}", parts[0]))?;
            let frequency: usize = parts[1]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid frequency value: {}", parts[1]))?;
            let avg_price: f64 = parts[2]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid price value: {}", parts[2]))?;

            Ok(Some(StockSignals {
                recency_days,
                frequency,
                avg_price,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signals() {
        let mut args = Args::parse_from(["stockforge", "--advise", "70,5,50.0"]);

        let result = args.parse_signals().unwrap();
        assert_eq!(
            result,
            Some(StockSignals {
                recency_days: 70,
                frequency: 5,
                avg_price: 50.0
            })
        );

        args.advise = None;
        assert_eq!(args.parse_signals().unwrap(), None);

        args.advise = Some("invalid".to_string());
        assert!(args.parse_signals().is_err());

        args.advise = Some("10,-3,2.0".to_string());
        assert!(args.parse_signals().is_err());
    }

    #[test]
    fn test_pipeline_config_from_args() {
        let args = Args::parse_from([
            "stockforge",
            "--trees",
            "25",
            "--max-depth",
            "8",
            "--seed",
            "7",
            "--jobs",
            "2",
        ]);
        let config = args.pipeline_config();

        assert_eq!(config.forest.n_trees, 25);
        assert_eq!(config.forest.max_depth, 8);
        assert_eq!(config.forest.seed, 7);
        assert_eq!(config.split_seed, 7);
        assert_eq!(config.forest.n_jobs, 2);
        assert_eq!(config.top_products, 100);
        assert_eq!(config.rolling_window, 3);
        assert!(config.validate().is_ok());
    }
}
