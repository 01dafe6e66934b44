//! Score a whole strategy set on one price slice and rank it.
//!
//! Ranking is a total order: win rate descending, then strategy id
//! ascending, so the "best" strategy is deterministic under ties.

use std::cmp::Ordering;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::logging::{info, obj, v_int, v_num, v_str, warn, Domain};
use crate::metrics::{compute_metrics_with, LengthPolicy, MetricsOptions, MetricsResult};
use crate::signals::{SignalSequence, StrategySet};

/// Below this many strategies scoring stays on the calling thread.
const PARALLEL_MIN_STRATEGIES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub strategy_id: String,
    #[serde(flatten)]
    pub metrics: MetricsResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinRateDistribution {
    pub best: f64,
    pub worst: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankedTable {
    entries: Vec<RankedEntry>,
}

fn by_rank(a: &(String, MetricsResult), b: &(String, MetricsResult)) -> Ordering {
    b.1.win_rate
        .total_cmp(&a.1.win_rate)
        .then_with(|| a.0.cmp(&b.0))
}

impl RankedTable {
    /// Order scored strategies and assign 1-based ranks.
    pub fn from_scores(mut scores: Vec<(String, MetricsResult)>) -> Self {
        scores.sort_by(by_rank);
        let entries = scores
            .into_iter()
            .enumerate()
            .map(|(i, (strategy_id, metrics))| RankedEntry {
                rank: i + 1,
                strategy_id,
                metrics,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> Result<&RankedEntry> {
        self.entries.first().ok_or(BacktestError::EmptyStrategies)
    }

    pub fn top_n(&self, n: usize) -> &[RankedEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn bottom_n(&self, n: usize) -> &[RankedEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.strategy_id == id)
            .map(|e| e.rank)
    }

    pub fn distribution(&self) -> Option<WinRateDistribution> {
        if self.entries.is_empty() {
            return None;
        }
        let mut rates: Vec<f64> = self.entries.iter().map(|e| e.metrics.win_rate).collect();
        rates.sort_by(|a, b| a.total_cmp(b));
        let n = rates.len();
        let median = if n % 2 == 1 {
            rates[n / 2]
        } else {
            (rates[n / 2 - 1] + rates[n / 2]) / 2.0
        };
        Some(WinRateDistribution {
            best: rates[n - 1],
            worst: rates[0],
            mean: rates.iter().sum::<f64>() / n as f64,
            median,
        })
    }
}

/// Score every strategy against `prices` and rank the results.
pub fn rank_strategies(
    set: &StrategySet,
    prices: &[f64],
    opts: &MetricsOptions,
) -> Result<RankedTable> {
    if set.is_empty() {
        return Err(BacktestError::EmptyStrategies);
    }
    if prices.is_empty() {
        return Err(BacktestError::EmptyPrices { context: "training" });
    }
    report_length_mismatches(set, prices.len(), opts, "training");

    let scores = score_all(set, prices, opts)?;
    let table = RankedTable::from_scores(scores);
    if let (Ok(best), Some(dist)) = (table.best(), table.distribution()) {
        info(
            Domain::Selection,
            "ranked",
            obj(&[
                ("strategies", v_int(table.len())),
                ("prices", v_int(prices.len())),
                ("best_id", v_str(&best.strategy_id)),
                ("best_win_rate", v_num(dist.best)),
                ("mean_win_rate", v_num(dist.mean)),
                ("median_win_rate", v_num(dist.median)),
            ]),
        );
    }
    Ok(table)
}

/// Score every strategy; results come back in strategy id order.
pub fn score_all(
    set: &StrategySet,
    prices: &[f64],
    opts: &MetricsOptions,
) -> Result<Vec<(String, MetricsResult)>> {
    let jobs: Vec<(&String, &SignalSequence)> = set.iter().collect();
    let workers = num_cpus::get().max(1);
    if jobs.len() < PARALLEL_MIN_STRATEGIES || workers == 1 {
        return score_chunk(&jobs, prices, opts);
    }

    let chunk_size = jobs.len().div_ceil(workers);
    let results: Vec<Result<Vec<(String, MetricsResult)>>> = thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || score_chunk(chunk, prices, opts)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(BacktestError::Worker("panicked".to_string()))
                })
            })
            .collect()
    });

    let mut scores = Vec::with_capacity(jobs.len());
    for chunk in results {
        scores.extend(chunk?);
    }
    Ok(scores)
}

fn score_chunk(
    jobs: &[(&String, &SignalSequence)],
    prices: &[f64],
    opts: &MetricsOptions,
) -> Result<Vec<(String, MetricsResult)>> {
    jobs.iter()
        .map(|(id, signals)| {
            compute_metrics_with(signals.as_slice(), prices, opts).map(|m| ((*id).clone(), m))
        })
        .collect()
}

/// Log how many strategies will be truncated to fit the price slice.
pub(crate) fn report_length_mismatches(
    set: &StrategySet,
    price_len: usize,
    opts: &MetricsOptions,
    context: &str,
) {
    if opts.length_policy != LengthPolicy::Truncate {
        return;
    }
    let mismatched: Vec<&String> = set
        .iter()
        .filter(|(_, s)| s.len() != price_len)
        .map(|(id, _)| id)
        .collect();
    if let Some(first) = mismatched.first() {
        warn(
            Domain::Metrics,
            "length_mismatch",
            obj(&[
                ("context", v_str(context)),
                ("strategies", v_int(mismatched.len())),
                ("prices", v_int(price_len)),
                ("example_id", v_str(first)),
                ("policy", v_str("truncate")),
            ]),
        );
    }
}
