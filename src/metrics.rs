//! Backtest metrics for a single signal sequence over a price sequence.
//!
//! Every buy at index `i` is a one-period trade entering at `prices[i]` and
//! exiting at `prices[i + 1]`. Trades never overlap and are scored
//! independently; the last signal is never actionable.

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::signals::Signal;

/// Daily trading-day convention used when no sampling interval is known.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsResult {
    pub win_rate: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub num_trades: usize,
}

/// What to do when signal and price lengths differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthPolicy {
    /// Silently score only the common prefix. Can hide data bugs.
    #[default]
    Truncate,
    /// Refuse mismatched lengths.
    Strict,
}

impl std::str::FromStr for LengthPolicy {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(LengthPolicy::Truncate),
            "strict" => Ok(LengthPolicy::Strict),
            other => Err(BacktestError::InvalidConfig(format!(
                "unknown length policy '{}' (expected truncate or strict)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsOptions {
    /// Sharpe annualization: the ratio is scaled by `sqrt(periods_per_year)`.
    pub periods_per_year: f64,
    pub length_policy: LengthPolicy,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            length_policy: LengthPolicy::Truncate,
        }
    }
}

/// Periods per year for data sampled every `interval_secs`, assuming
/// `trading_days` active days a year (365 for crypto, 252 for equities).
pub fn periods_per_year_for_interval(interval_secs: u64, trading_days: f64) -> f64 {
    if interval_secs == 0 {
        return DEFAULT_PERIODS_PER_YEAR;
    }
    trading_days * SECS_PER_DAY / interval_secs as f64
}

/// Per-trade returns in signal order, over the common prefix of both inputs.
pub fn trade_returns(signals: &[Signal], prices: &[f64]) -> Vec<f64> {
    let n = signals.len().min(prices.len());
    (0..n.saturating_sub(1))
        .filter(|&i| signals[i].is_buy())
        .map(|i| (prices[i + 1] - prices[i]) / prices[i])
        .collect()
}

/// Score `signals` against `prices` with the daily annualization convention.
///
/// Lengths are truncated to the shorter input without complaint; use
/// [`compute_metrics_with`] with [`LengthPolicy::Strict`] to reject that.
pub fn compute_metrics(signals: &[Signal], prices: &[f64]) -> MetricsResult {
    metrics_from_returns(&trade_returns(signals, prices), DEFAULT_PERIODS_PER_YEAR)
}

/// Score with explicit options, validating prices and the length policy.
pub fn compute_metrics_with(
    signals: &[Signal],
    prices: &[f64],
    opts: &MetricsOptions,
) -> Result<MetricsResult> {
    if !(opts.periods_per_year.is_finite() && opts.periods_per_year > 0.0) {
        return Err(BacktestError::InvalidConfig(format!(
            "periods_per_year must be positive, got {}",
            opts.periods_per_year
        )));
    }
    if opts.length_policy == LengthPolicy::Strict && signals.len() != prices.len() {
        return Err(BacktestError::InputLengthMismatch {
            signals: signals.len(),
            prices: prices.len(),
        });
    }
    let n = signals.len().min(prices.len());
    validate_prices(&prices[..n])?;
    Ok(metrics_from_returns(
        &trade_returns(signals, prices),
        opts.periods_per_year,
    ))
}

pub fn validate_prices(prices: &[f64]) -> Result<()> {
    match prices
        .iter()
        .enumerate()
        .find(|(_, p)| !(p.is_finite() && **p > 0.0))
    {
        Some((index, &value)) => Err(BacktestError::InvalidPrice { index, value }),
        None => Ok(()),
    }
}

/// Aggregate a list of one-period trade returns.
pub fn metrics_from_returns(returns: &[f64], periods_per_year: f64) -> MetricsResult {
    if returns.is_empty() {
        return MetricsResult::default();
    }
    let n = returns.len() as f64;
    let wins = returns.iter().filter(|r| **r > 0.0).count();
    MetricsResult {
        win_rate: wins as f64 / n,
        total_return: returns.iter().sum(),
        sharpe_ratio: sharpe_ratio(returns, periods_per_year),
        max_drawdown: max_drawdown(returns),
        num_trades: returns.len(),
    }
}

/// Annualized mean / population standard deviation; 0.0 when undefined.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std > 0.0 {
        mean / std * periods_per_year.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline of the compounded equity curve, as a
/// positive fraction.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        let dd = (equity - peak) / peak;
        if dd < worst {
            worst = dd;
        }
    }
    worst.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal::{Buy, Hold, Sell};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn no_buys_is_all_zero() {
        let m = compute_metrics(&[Hold, Sell, Hold, Hold], &[100.0, 90.0, 120.0, 80.0]);
        assert_eq!(m, MetricsResult::default());
        assert_eq!(m.num_trades, 0);
    }

    #[test]
    fn last_signal_never_trades() {
        let m = compute_metrics(&[Hold, Hold, Buy], &[100.0, 101.0, 102.0]);
        assert_eq!(m.num_trades, 0);
    }

    #[test]
    fn total_return_is_arithmetic_sum() {
        let prices = [100.0, 101.0, 100.0, 102.0];
        let m = compute_metrics(&[Buy; 4], &prices);
        let expected = 0.01 + (100.0 - 101.0) / 101.0 + 0.02;
        assert_eq!(m.num_trades, 3);
        assert!(close(m.total_return, expected));
        assert!(close(m.win_rate, 2.0 / 3.0));
    }

    #[test]
    fn drawdown_matches_price_path() {
        let prices = [100.0, 110.0, 105.0, 95.0, 100.0, 120.0];
        let m = compute_metrics(&[Buy; 6], &prices);
        assert!(close(m.max_drawdown, (110.0 - 95.0) / 110.0));
    }

    #[test]
    fn drawdown_from_first_trade_loss() {
        // Equity starts at 1.0 before any trade but the curve only holds post-trade values.
        assert!(close(max_drawdown(&[-0.5]), 0.0));
        assert!(close(max_drawdown(&[-0.5, -0.5]), 0.5));
    }

    #[test]
    fn sharpe_needs_two_returns_and_variance() {
        assert_eq!(sharpe_ratio(&[0.05], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 252.0), 0.0);
        let s = sharpe_ratio(&[0.01, 0.03], 252.0);
        // mean 0.02, population std 0.01
        assert!((s - 2.0 * 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn annualization_is_a_parameter() {
        let signals = [Buy; 4];
        let prices = [100.0, 101.0, 100.0, 102.0];
        let daily = compute_metrics_with(&signals, &prices, &MetricsOptions::default()).unwrap();
        let opts = MetricsOptions {
            periods_per_year: 1.0,
            ..Default::default()
        };
        let raw = compute_metrics_with(&signals, &prices, &opts).unwrap();
        assert!((daily.sharpe_ratio - raw.sharpe_ratio * 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn interval_annualization() {
        assert!(close(periods_per_year_for_interval(86_400, 252.0), 252.0));
        assert!(close(periods_per_year_for_interval(300, 365.0), 105_120.0));
        assert_eq!(periods_per_year_for_interval(0, 365.0), DEFAULT_PERIODS_PER_YEAR);
    }

    #[test]
    fn strict_policy_rejects_mismatch() {
        let opts = MetricsOptions {
            length_policy: LengthPolicy::Strict,
            ..Default::default()
        };
        let err = compute_metrics_with(&[Buy, Buy, Buy], &[1.0, 2.0], &opts).unwrap_err();
        assert!(matches!(
            err,
            BacktestError::InputLengthMismatch { signals: 3, prices: 2 }
        ));
    }

    #[test]
    fn length_policy_names() {
        assert_eq!("strict".parse::<LengthPolicy>().unwrap(), LengthPolicy::Strict);
        assert_eq!(" Truncate ".parse::<LengthPolicy>().unwrap(), LengthPolicy::Truncate);
        assert!(matches!(
            "stirct".parse::<LengthPolicy>(),
            Err(BacktestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_non_positive_prices_in_scored_prefix() {
        let opts = MetricsOptions::default();
        let err = compute_metrics_with(&[Buy, Buy], &[1.0, 0.0], &opts).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidPrice { index: 1, .. }));
        // Prices past the truncated prefix are ignored.
        assert!(compute_metrics_with(&[Buy, Buy], &[1.0, 2.0, -1.0], &opts).is_ok());
    }
}
