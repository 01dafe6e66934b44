//! Re-score the training winners on held-out validation prices.
//!
//! Each selected strategy keeps its signal sequence unchanged; the sequence
//! is read from its start and cut to the validation length. The comparison
//! exposes how much of the training score survives.

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::logging::{info, obj, v_int, v_num, v_str, Domain};
use crate::metrics::{compute_metrics_with, LengthPolicy, MetricsOptions, MetricsResult};
use crate::ranking::RankedTable;
use crate::signals::{SignalSequence, StrategySet};

/// Knobs for turning a train/validation pair into a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub top_n: usize,
    /// Flag overfitting when train minus validation win rate exceeds this.
    pub overfit_threshold: f64,
    /// Validation win rate above which a strategy still counts as good.
    pub still_good_win_rate: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            top_n: 10,
            overfit_threshold: 0.15,
            still_good_win_rate: 0.55,
        }
    }
}

/// Training vs validation metrics for one strategy. Drops are train minus
/// validation, so positive means the strategy got worse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub rank: usize,
    pub strategy_id: String,
    pub train: MetricsResult,
    pub validation: MetricsResult,
    pub performance_drop: f64,
    pub return_drop: f64,
    pub sharpe_drop: f64,
    pub overfitting_detected: bool,
}

impl Comparison {
    pub fn new(
        rank: usize,
        strategy_id: &str,
        train: MetricsResult,
        validation: MetricsResult,
        overfit_threshold: f64,
    ) -> Self {
        let performance_drop = train.win_rate - validation.win_rate;
        Self {
            rank,
            strategy_id: strategy_id.to_string(),
            train,
            validation,
            performance_drop,
            return_drop: train.total_return - validation.total_return,
            sharpe_drop: train.sharpe_ratio - validation.sharpe_ratio,
            overfitting_detected: performance_drop > overfit_threshold,
        }
    }
}

/// A strategy's signals with whatever scores it has collected. The signals
/// are borrowed, so scoring can never rewrite them.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRecord<'a> {
    pub id: &'a str,
    pub signals: &'a SignalSequence,
    pub training: Option<MetricsResult>,
    pub validation: Option<MetricsResult>,
}

impl<'a> StrategyRecord<'a> {
    pub fn new(id: &'a str, signals: &'a SignalSequence) -> Self {
        Self {
            id,
            signals,
            training: None,
            validation: None,
        }
    }

    pub fn with_training(mut self, metrics: MetricsResult) -> Self {
        self.training = Some(metrics);
        self
    }

    /// Score on validation prices once; a second call keeps the first result.
    pub fn score_validation(&mut self, prices: &[f64], opts: &MetricsOptions) -> Result<MetricsResult> {
        if let Some(m) = self.validation {
            return Ok(m);
        }
        let m = score_validation(self.signals, prices, opts)?;
        self.validation = Some(m);
        Ok(m)
    }

    /// Fails with [`BacktestError::Unscored`] until both scores exist.
    pub fn comparison(&self, rank: usize, overfit_threshold: f64) -> Result<Comparison> {
        let unscored = |context| BacktestError::Unscored {
            strategy_id: self.id.to_string(),
            context,
        };
        Ok(Comparison::new(
            rank,
            self.id,
            self.training.ok_or_else(|| unscored("training"))?,
            self.validation.ok_or_else(|| unscored("validation"))?,
            overfit_threshold,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub top_n: usize,
    pub average_train_win_rate: f64,
    pub average_val_win_rate: f64,
    pub average_drop: f64,
    /// Largest train-to-validation drop.
    pub worst_drop: f64,
    /// Smallest drop (negative if a strategy improved).
    pub least_drop: f64,
    pub best_train_win_rate: f64,
    pub best_val_win_rate: f64,
    pub strategies_still_good: usize,
    pub overfit_count: usize,
    pub overfit_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub comparisons: Vec<Comparison>,
}

impl ValidationReport {
    fn from_comparisons(comparisons: Vec<Comparison>, policy: &ValidationPolicy) -> Self {
        let n = comparisons.len().max(1) as f64;
        let mean = |f: fn(&Comparison) -> f64| comparisons.iter().map(f).sum::<f64>() / n;
        let fold_max = |f: fn(&Comparison) -> f64| {
            comparisons.iter().map(f).fold(f64::NEG_INFINITY, f64::max)
        };
        let summary = ValidationSummary {
            top_n: comparisons.len(),
            average_train_win_rate: mean(|c| c.train.win_rate),
            average_val_win_rate: mean(|c| c.validation.win_rate),
            average_drop: mean(|c| c.performance_drop),
            worst_drop: fold_max(|c| c.performance_drop),
            least_drop: comparisons
                .iter()
                .map(|c| c.performance_drop)
                .fold(f64::INFINITY, f64::min),
            best_train_win_rate: fold_max(|c| c.train.win_rate),
            best_val_win_rate: fold_max(|c| c.validation.win_rate),
            strategies_still_good: comparisons
                .iter()
                .filter(|c| c.validation.win_rate > policy.still_good_win_rate)
                .count(),
            overfit_count: comparisons.iter().filter(|c| c.overfitting_detected).count(),
            overfit_threshold: policy.overfit_threshold,
        };
        Self {
            summary,
            comparisons,
        }
    }
}

/// Score `signals`, cut to the validation length, against validation prices.
pub fn score_validation(
    signals: &SignalSequence,
    prices: &[f64],
    opts: &MetricsOptions,
) -> Result<MetricsResult> {
    let s = signals.as_slice();
    if opts.length_policy == LengthPolicy::Strict && s.len() < prices.len() {
        return Err(BacktestError::InputLengthMismatch {
            signals: s.len(),
            prices: prices.len(),
        });
    }
    compute_metrics_with(&s[..s.len().min(prices.len())], prices, opts)
}

/// Validate the top `policy.top_n` strategies of `table`.
pub fn validate_selected(
    set: &StrategySet,
    table: &RankedTable,
    validation_prices: &[f64],
    policy: &ValidationPolicy,
    opts: &MetricsOptions,
) -> Result<ValidationReport> {
    if table.is_empty() || set.is_empty() {
        return Err(BacktestError::EmptyStrategies);
    }
    if policy.top_n == 0 {
        return Err(BacktestError::InvalidConfig("top_n must be positive".to_string()));
    }
    if validation_prices.is_empty() {
        return Err(BacktestError::EmptyPrices { context: "validation" });
    }

    let mut comparisons = Vec::new();
    for entry in table.top_n(policy.top_n) {
        let signals = set
            .get(&entry.strategy_id)
            .ok_or_else(|| BacktestError::UnknownStrategy(entry.strategy_id.clone()))?;
        let mut record = StrategyRecord::new(&entry.strategy_id, signals).with_training(entry.metrics);
        record.score_validation(validation_prices, opts)?;
        let cmp = record.comparison(entry.rank, policy.overfit_threshold)?;
        info(
            Domain::Validation,
            "compared",
            obj(&[
                ("strategy_id", v_str(&cmp.strategy_id)),
                ("rank", v_int(cmp.rank)),
                ("train_win_rate", v_num(cmp.train.win_rate)),
                ("val_win_rate", v_num(cmp.validation.win_rate)),
                ("performance_drop", v_num(cmp.performance_drop)),
                ("overfitting_detected", serde_json::Value::Bool(cmp.overfitting_detected)),
            ]),
        );
        comparisons.push(cmp);
    }

    let report = ValidationReport::from_comparisons(comparisons, policy);
    info(
        Domain::Validation,
        "summary",
        obj(&[
            ("top_n", v_int(report.summary.top_n)),
            ("average_drop", v_num(report.summary.average_drop)),
            ("still_good", v_int(report.summary.strategies_still_good)),
            ("overfit_count", v_int(report.summary.overfit_count)),
        ]),
    );
    Ok(report)
}

/// Validate only the single best training strategy.
pub fn validate_best(
    set: &StrategySet,
    table: &RankedTable,
    validation_prices: &[f64],
    overfit_threshold: f64,
    opts: &MetricsOptions,
) -> Result<Comparison> {
    let policy = ValidationPolicy {
        top_n: 1,
        overfit_threshold,
        ..Default::default()
    };
    let report = validate_selected(set, table, validation_prices, &policy, opts)?;
    report
        .comparisons
        .into_iter()
        .next()
        .ok_or(BacktestError::EmptyStrategies)
}
