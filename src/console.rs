//! Human-readable stage summaries for the CLI.

use crate::pipeline::GenerateOutcome;
use crate::ranking::{RankedEntry, RankedTable};
use crate::report::BestStrategyRecord;
use crate::validation::ValidationReport;

pub fn banner(title: &str, width: usize) {
    println!("{}", "=".repeat(width));
    println!("{}", title);
    println!("{}", "=".repeat(width));
}

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

pub fn print_generate(out: &GenerateOutcome) {
    banner("STEP 1: Generate strategies and load prices", 60);
    println!(
        "Strategies: {} x {} coin-flip signals",
        out.strategies, out.signals_per_strategy
    );
    println!(
        "Prices:     {} points ({} train / {} validation)",
        out.points, out.train_points, out.validation_points
    );
    if let (Some(lo), Some(hi)) = (out.price_min, out.price_max) {
        println!("Range:      ${:.2} - ${:.2}", lo, hi);
    }
    if let (Some(a), Some(b)) = (out.ts_min, out.ts_max) {
        println!("Period:     {} to {}", a, b);
    }
    println!("Source sha256: {}", out.hash_sha256);
    println!();
}

fn print_rows(rows: &[RankedEntry]) {
    for e in rows {
        println!(
            "{:<15} | Win Rate: {:>6} | Return: {:>7} | Sharpe: {:>6.2}",
            e.strategy_id,
            pct(e.metrics.win_rate),
            pct(e.metrics.total_return),
            e.metrics.sharpe_ratio
        );
    }
}

pub fn print_training(table: &RankedTable) {
    banner("STEP 2: Backtest on training data", 60);
    if let Some(d) = table.distribution() {
        println!("Win rate distribution over {} strategies:", table.len());
        println!("   Best:   {}", pct(d.best));
        println!("   Worst:  {}", pct(d.worst));
        println!("   Mean:   {}", pct(d.mean));
        println!("   Median: {}", pct(d.median));
    }
    println!("\nTOP 5:");
    println!("{}", "-".repeat(60));
    print_rows(table.top_n(5));
    println!("\nBOTTOM 5:");
    println!("{}", "-".repeat(60));
    print_rows(table.bottom_n(5));
    println!();
}

pub fn print_selection(best: &BestStrategyRecord) {
    banner("STEP 3: Best training strategy", 60);
    let m = &best.training_metrics;
    println!("Strategy:     {}", best.strategy_id);
    println!("Win rate:     {}", pct(m.win_rate));
    println!("Total return: {}", pct(m.total_return));
    println!("Sharpe:       {:.2}", m.sharpe_ratio);
    println!("Max drawdown: {}", pct(m.max_drawdown));
    println!("Trades:       {}", m.num_trades);
    println!(
        "Ranked #1 of {} (mean win rate {}, median {})",
        best.ranked_out_of,
        pct(best.distribution.mean),
        pct(best.distribution.median)
    );
    if best.distribution.mean > 0.0 {
        println!(
            "{:.0}% above the average strategy, picked from pure coin flips.",
            (m.win_rate / best.distribution.mean - 1.0) * 100.0
        );
    }
    println!();
}

pub fn print_validation(report: &ValidationReport) {
    let s = &report.summary;
    banner(
        &format!("STEP 4: Top {} strategies, training vs validation", s.top_n),
        80,
    );
    println!(
        "{:<6}{:<15}{:>10}{:>10}{:>10}{:>11}{:>11}  {}",
        "Rank", "Strategy", "Train WR", "Val WR", "Drop", "Train Ret", "Val Ret", "Overfit"
    );
    println!("{}", "-".repeat(80));
    for c in &report.comparisons {
        println!(
            "{:<6}{:<15}{:>10}{:>10}{:>10}{:>11}{:>11}  {}",
            c.rank,
            c.strategy_id,
            pct(c.train.win_rate),
            pct(c.validation.win_rate),
            pct(c.performance_drop),
            pct(c.train.total_return),
            pct(c.validation.total_return),
            if c.overfitting_detected { "YES" } else { "no" }
        );
    }
    println!();
    println!("Average training win rate:   {}", pct(s.average_train_win_rate));
    println!("Average validation win rate: {}", pct(s.average_val_win_rate));
    println!("Average drop:                {}", pct(s.average_drop));
    println!("Worst drop:                  {}", pct(s.worst_drop));
    println!("Least drop:                  {}", pct(s.least_drop));
    println!(
        "Flagged as overfit (drop > {}): {}/{}",
        pct(s.overfit_threshold),
        s.overfit_count,
        s.top_n
    );
    println!("Still good on validation:    {}/{}", s.strategies_still_good, s.top_n);
    println!();
}
