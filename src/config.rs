use std::path::PathBuf;

use crate::error::{BacktestError, Result};
use crate::metrics::{LengthPolicy, MetricsOptions, DEFAULT_PERIODS_PER_YEAR};

/// Runtime configuration for every pipeline stage, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Raw candle CSV the generate stage loads prices from.
    pub price_csv: Option<PathBuf>,
    pub num_strategies: usize,
    pub num_signals: usize,
    pub random_seed: u64,
    pub train_split: f64,
    pub max_data_points: usize,
    pub top_n: usize,
    /// Train minus validation win rate above which a strategy is flagged as overfit.
    pub overfit_threshold: f64,
    /// Validation win rate a strategy must beat to count as "still good".
    pub still_good_win_rate: f64,
    pub periods_per_year: f64,
    /// Derive the Sharpe annualization from the dataset's sampling interval.
    pub annualize_from_data: bool,
    pub length_policy: LengthPolicy,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn length_policy_from(raw: Option<&str>) -> Result<LengthPolicy> {
    match raw {
        None | Some("") => Ok(LengthPolicy::default()),
        Some(v) => v.parse(),
    }
}

impl Config {
    /// Fails only on a `LENGTH_POLICY` that names no known policy.
    pub fn from_env() -> Result<Self> {
        let length_policy = length_policy_from(std::env::var("LENGTH_POLICY").ok().as_deref())?;
        Ok(Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()).into(),
            results_dir: std::env::var("RESULTS_DIR").unwrap_or_else(|_| "results".to_string()).into(),
            price_csv: std::env::var("PRICE_CSV").ok().map(PathBuf::from),
            num_strategies: env_parse("NUM_STRATEGIES", 500),
            num_signals: env_parse("NUM_SIGNALS", 500),
            random_seed: env_parse("RANDOM_SEED", 42),
            train_split: env_parse("TRAIN_SPLIT", 0.7),
            max_data_points: env_parse("MAX_DATA_POINTS", 800),
            top_n: env_parse("TOP_N", 10),
            overfit_threshold: env_parse("OVERFIT_THRESHOLD", 0.15),
            still_good_win_rate: env_parse("STILL_GOOD_WIN_RATE", 0.55),
            periods_per_year: env_parse("PERIODS_PER_YEAR", DEFAULT_PERIODS_PER_YEAR),
            annualize_from_data: std::env::var("ANNUALIZE_FROM_DATA").as_deref() == Ok("1"),
            length_policy,
        })
    }

    /// Defaults without touching env vars, rooted at `base`.
    pub fn rooted_at(base: &std::path::Path) -> Self {
        Self {
            data_dir: base.join("data"),
            results_dir: base.join("results"),
            price_csv: None,
            num_strategies: 500,
            num_signals: 500,
            random_seed: 42,
            train_split: 0.7,
            max_data_points: 800,
            top_n: 10,
            overfit_threshold: 0.15,
            still_good_win_rate: 0.55,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            annualize_from_data: false,
            length_policy: LengthPolicy::Truncate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            return Err(BacktestError::InvalidConfig(format!(
                "TRAIN_SPLIT must be in (0, 1), got {}",
                self.train_split
            )));
        }
        if self.num_strategies == 0 || self.num_signals == 0 {
            return Err(BacktestError::InvalidConfig(
                "NUM_STRATEGIES and NUM_SIGNALS must be positive".to_string(),
            ));
        }
        if self.max_data_points < 2 {
            return Err(BacktestError::InvalidConfig(
                "MAX_DATA_POINTS must be at least 2".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(BacktestError::InvalidConfig("TOP_N must be positive".to_string()));
        }
        if !self.overfit_threshold.is_finite() {
            return Err(BacktestError::InvalidConfig(
                "OVERFIT_THRESHOLD must be finite".to_string(),
            ));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(BacktestError::InvalidConfig(format!(
                "PERIODS_PER_YEAR must be positive, got {}",
                self.periods_per_year
            )));
        }
        Ok(())
    }

    pub fn metrics_options(&self) -> MetricsOptions {
        MetricsOptions {
            periods_per_year: self.periods_per_year,
            length_policy: self.length_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_defaults_are_valid() {
        let cfg = Config::rooted_at(std::path::Path::new("/tmp/x"));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.results_dir, PathBuf::from("/tmp/x/results"));
        assert_eq!(cfg.metrics_options().periods_per_year, 252.0);
    }

    #[test]
    fn length_policy_must_be_known() {
        assert_eq!(length_policy_from(None).unwrap(), LengthPolicy::Truncate);
        assert_eq!(length_policy_from(Some("")).unwrap(), LengthPolicy::Truncate);
        assert_eq!(length_policy_from(Some("strict")).unwrap(), LengthPolicy::Strict);
        let err = length_policy_from(Some("strictt")).unwrap_err();
        assert!(err.to_string().contains("unknown length policy 'strictt'"));
    }

    #[test]
    fn rejects_degenerate_split() {
        let mut cfg = Config::rooted_at(std::path::Path::new("."));
        cfg.train_split = 1.0;
        assert!(matches!(cfg.validate(), Err(BacktestError::InvalidConfig(_))));
        cfg.train_split = 0.7;
        cfg.periods_per_year = 0.0;
        assert!(cfg.validate().is_err());
    }
}
