//! Behavioural properties of the metrics engine and the comparator.
//!
//!   1. No buys            -- zero-valued result
//!   2. Monotone prices    -- win rate 1.0 / 0.0
//!   3. Arithmetic sum     -- total return is not compounded
//!   4. Drawdown           -- peak-to-trough of the compounded curve
//!   5. Determinism        -- identical inputs, identical bits
//!   6. Truncation         -- longer signals behave like pre-cut signals
//!   7. Ranking            -- best has the max win rate, ties by id
//!   8. Reversal scenario  -- all-buy collapses, never-buy is invariant

use overfitlab::generate::generate_random_strategies;
use overfitlab::metrics::{compute_metrics, compute_metrics_with, trade_returns, MetricsOptions};
use overfitlab::ranking::rank_strategies;
use overfitlab::signals::{Signal, SignalSequence, StrategySet};
use overfitlab::validation::{validate_selected, ValidationPolicy};

fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 * 1.01f64.powi(i as i32)).collect()
}

fn falling(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 * 0.99f64.powi(i as i32)).collect()
}

/// Deterministic wiggly path so ties are rare.
fn wiggle(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + (i as f64 * 0.13).cos() * 3.0)
        .collect()
}

#[test]
fn no_buys_gives_zero_metrics() {
    for signals in [
        vec![Signal::Hold; 20],
        vec![Signal::Sell; 20],
        (0..20)
            .map(|i| if i % 2 == 0 { Signal::Hold } else { Signal::Sell })
            .collect(),
    ] {
        let m = compute_metrics(&signals, &wiggle(20));
        assert_eq!(m.num_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
    }
}

#[test]
fn monotone_prices_fix_win_rate() {
    let up = compute_metrics(&vec![Signal::Buy; 30], &rising(30));
    assert_eq!(up.win_rate, 1.0);
    assert_eq!(up.num_trades, 29);
    assert_eq!(up.max_drawdown, 0.0);

    let down = compute_metrics(&vec![Signal::Buy; 30], &falling(30));
    assert_eq!(down.win_rate, 0.0);
    assert!(down.total_return < 0.0);
    assert!(down.max_drawdown > 0.0);
}

#[test]
fn total_return_hand_computed() {
    let prices = [100.0, 101.0, 100.0, 102.0];
    let m = compute_metrics(&[Signal::Buy; 4], &prices);
    let r = [0.01, -1.0 / 101.0, 0.02];
    assert!((m.total_return - r.iter().sum::<f64>()).abs() < 1e-12);
    // Compounding would give a different number.
    let compounded = r.iter().fold(1.0, |acc, x| acc * (1.0 + x)) - 1.0;
    assert!((m.total_return - compounded).abs() > 1e-6);
}

#[test]
fn drawdown_hand_computed() {
    let prices = [100.0, 110.0, 105.0, 95.0, 100.0, 120.0];
    let m = compute_metrics(&[Signal::Buy; 6], &prices);
    assert!((m.max_drawdown - 15.0 / 110.0).abs() < 1e-12);
    assert!((m.max_drawdown - 0.13636).abs() < 1e-5);
}

#[test]
fn identical_inputs_identical_bits() {
    let set = generate_random_strategies(5, 60, 9);
    let prices = wiggle(60);
    for (_, signals) in set.iter() {
        let a = compute_metrics(signals.as_slice(), &prices);
        let b = compute_metrics(signals.as_slice(), &prices);
        assert_eq!(a.win_rate.to_bits(), b.win_rate.to_bits());
        assert_eq!(a.total_return.to_bits(), b.total_return.to_bits());
        assert_eq!(a.sharpe_ratio.to_bits(), b.sharpe_ratio.to_bits());
        assert_eq!(a.max_drawdown.to_bits(), b.max_drawdown.to_bits());
        assert_eq!(a.num_trades, b.num_trades);
    }
}

#[test]
fn longer_signals_truncate_to_prices() {
    let signals = generate_random_strategies(1, 80, 3)
        .get("strategy_000")
        .cloned()
        .unwrap();
    let prices = wiggle(50);
    let full = compute_metrics(signals.as_slice(), &prices);
    let cut = compute_metrics(&signals.as_slice()[..50], &prices);
    assert_eq!(full, cut);
    assert_eq!(
        trade_returns(signals.as_slice(), &prices),
        trade_returns(&signals.as_slice()[..50], &prices)
    );
    // The permissive path agrees with the plain entry point.
    let with = compute_metrics_with(signals.as_slice(), &prices, &MetricsOptions::default()).unwrap();
    assert_eq!(with, full);
}

#[test]
fn best_has_max_win_rate() {
    let set = generate_random_strategies(150, 100, 42);
    let prices = wiggle(100);
    let table = rank_strategies(&set, &prices, &MetricsOptions::default()).unwrap();
    let best = table.best().unwrap();
    for e in table.entries() {
        assert!(best.metrics.win_rate >= e.metrics.win_rate);
    }
    for pair in table.entries().windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.metrics.win_rate > b.metrics.win_rate
                || (a.metrics.win_rate == b.metrics.win_rate && a.strategy_id < b.strategy_id)
        );
    }
    // Ranking is the same every time.
    let again = rank_strategies(&set, &prices, &MetricsOptions::default()).unwrap();
    assert_eq!(again, table);
}

#[test]
fn reversal_exposes_the_winner() {
    let mut set = StrategySet::new();
    set.insert("A", SignalSequence::all(Signal::Buy, 40));
    set.insert("B", SignalSequence::all(Signal::Hold, 40));
    let opts = MetricsOptions::default();

    let table = rank_strategies(&set, &rising(28), &opts).unwrap();
    assert_eq!(table.rank_of("A"), Some(1));
    assert_eq!(table.rank_of("B"), Some(2));

    let report =
        validate_selected(&set, &table, &falling(12), &ValidationPolicy::default(), &opts).unwrap();
    let a = &report.comparisons[0];
    let b = &report.comparisons[1];
    assert_eq!(a.strategy_id, "A");
    assert_eq!(a.train.win_rate, 1.0);
    assert_eq!(a.validation.win_rate, 0.0);
    assert!(a.overfitting_detected);
    assert_eq!(b.train, b.validation);
    assert_eq!(b.validation.win_rate, 0.0);
    assert!(!b.overfitting_detected);
}
