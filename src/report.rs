//! Files exchanged between pipeline stages.
//!
//! data/strategies.json            strategy id -> signals
//! data/price_data.csv             timestamp,price,returns,split
//! data/manifest.json              dataset provenance
//! results/training_performance.csv  ranked training table
//! results/best_strategy.json        rank-1 strategy with its signals
//! results/validation_results.csv    per-strategy train vs validation
//! results/validation_summary.json   summary plus every comparison

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};
use crate::metrics::MetricsResult;
use crate::ranking::{RankedEntry, RankedTable, WinRateDistribution};
use crate::signals::SignalSequence;
use crate::validation::ValidationReport;

pub const TRAINING_COLUMNS: [&str; 7] = [
    "rank",
    "strategy_id",
    "win_rate",
    "total_return",
    "sharpe_ratio",
    "max_drawdown",
    "num_trades",
];

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub strategies: PathBuf,
    pub prices: PathBuf,
    pub manifest: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            strategies: data_dir.join("strategies.json"),
            prices: data_dir.join("price_data.csv"),
            manifest: data_dir.join("manifest.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultPaths {
    pub training: PathBuf,
    pub best: PathBuf,
    pub validation_csv: PathBuf,
    pub validation_summary: PathBuf,
}

impl ResultPaths {
    pub fn new(results_dir: &Path) -> Self {
        Self {
            training: results_dir.join("training_performance.csv"),
            best: results_dir.join("best_strategy.json"),
            validation_csv: results_dir.join("validation_results.csv"),
            validation_summary: results_dir.join("validation_summary.json"),
        }
    }
}

/// The selected training winner, with enough context to judge the pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestStrategyRecord {
    pub strategy_id: String,
    pub signals: SignalSequence,
    pub training_metrics: MetricsResult,
    pub ranked_out_of: usize,
    pub distribution: WinRateDistribution,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Quote a field when it would not survive a plain comma split and trim.
fn csv_field(s: &str) -> Cow<'_, str> {
    if s.is_empty() || s.trim() != s || s.contains(|c: char| c == ',' || c == '"') {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// Ids are written one row per line, so a line break cannot be stored.
fn id_field(id: &str) -> Result<Cow<'_, str>> {
    if id.contains(|c: char| c == '\n' || c == '\r') {
        return Err(BacktestError::Parse(format!(
            "strategy id {:?} contains a line break",
            id
        )));
    }
    Ok(csv_field(id))
}

/// Split one CSV line, honouring double-quoted fields with `""` escapes.
fn split_csv_line(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            if c != '"' {
                field.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                field.push('"');
            } else {
                quoted = false;
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' if field.is_empty() => quoted = true,
                _ => field.push(c),
            }
        }
    }
    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

pub fn write_training_table(path: &Path, table: &RankedTable) -> Result<()> {
    ensure_parent(path)?;
    let mut out = TRAINING_COLUMNS.join(",");
    out.push('\n');
    for e in table.entries() {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            e.rank,
            id_field(&e.strategy_id)?,
            e.metrics.win_rate,
            e.metrics.total_return,
            e.metrics.sharpe_ratio,
            e.metrics.max_drawdown,
            e.metrics.num_trades
        ));
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Read a training table back; the stored order is re-derived, not trusted.
pub fn read_training_table(path: &Path) -> Result<RankedTable> {
    let file = File::open(path)?;
    let mut scores = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("rank,") {
            continue;
        }
        let entry = parse_training_line(trimmed).map_err(|e| {
            BacktestError::Parse(format!("{} line {}: {}", path.display(), line_no + 1, e))
        })?;
        scores.push((entry.strategy_id, entry.metrics));
    }
    Ok(RankedTable::from_scores(scores))
}

fn parse_training_line(line: &str) -> std::result::Result<RankedEntry, String> {
    let parts = split_csv_line(line)?;
    if parts.len() != TRAINING_COLUMNS.len() {
        return Err(format!(
            "expected {} columns, got {}",
            TRAINING_COLUMNS.len(),
            parts.len()
        ));
    }
    let num = |i: usize| -> std::result::Result<f64, String> {
        parts[i]
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad {} '{}': {}", TRAINING_COLUMNS[i], parts[i], e))
    };
    Ok(RankedEntry {
        rank: parts[0].trim().parse().map_err(|e| format!("bad rank: {}", e))?,
        strategy_id: parts[1].to_string(),
        metrics: MetricsResult {
            win_rate: num(2)?,
            total_return: num(3)?,
            sharpe_ratio: num(4)?,
            max_drawdown: num(5)?,
            num_trades: parts[6].trim().parse().map_err(|e| format!("bad num_trades: {}", e))?,
        },
    })
}

pub fn write_validation_csv(path: &Path, report: &ValidationReport) -> Result<()> {
    ensure_parent(path)?;
    let mut out = String::from(
        "rank,strategy_id,train_win_rate,val_win_rate,win_rate_drop,\
         train_return,val_return,return_drop,train_sharpe,val_sharpe,sharpe_drop,\
         overfitting_detected\n",
    );
    for c in &report.comparisons {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}\n",
            c.rank,
            id_field(&c.strategy_id)?,
            c.train.win_rate,
            c.validation.win_rate,
            c.performance_drop,
            c.train.total_return,
            c.validation.total_return,
            c.return_drop,
            c.train.sharpe_ratio,
            c.validation.sharpe_ratio,
            c.sharpe_drop,
            c.overfitting_detected
        ));
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn training_table_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("training.csv");
        let table = RankedTable::from_scores(vec![
            ("b".to_string(), MetricsResult { win_rate: 0.25, num_trades: 4, ..Default::default() }),
            ("a".to_string(), MetricsResult { win_rate: 0.75, total_return: 0.031, sharpe_ratio: 2.5, max_drawdown: 0.01, num_trades: 4 }),
        ]);
        write_training_table(&path, &table).unwrap();
        let back = read_training_table(&path).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.best().unwrap().strategy_id, "a");
    }

    #[test]
    fn awkward_ids_survive_the_training_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("training.csv");
        let ids = ["momentum,fast", " padded", "say \"hi\"", "", "plain"];
        let table = RankedTable::from_scores(
            ids.iter()
                .enumerate()
                .map(|(i, id)| {
                    let m = MetricsResult { win_rate: i as f64 / 10.0, num_trades: 3, ..Default::default() };
                    (id.to_string(), m)
                })
                .collect(),
        );
        write_training_table(&path, &table).unwrap();
        let back = read_training_table(&path).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.rank_of(" padded"), Some(4));
        assert_eq!(back.best().unwrap().strategy_id, "plain");

        let bad = RankedTable::from_scores(vec![("two\nlines".to_string(), MetricsResult::default())]);
        assert!(matches!(write_training_table(&path, &bad), Err(BacktestError::Parse(_))));
    }

    #[test]
    fn quoted_fields_split() {
        assert_eq!(split_csv_line(r#"1,"a,""b""",2"#).unwrap(), ["1", "a,\"b\"", "2"]);
        assert_eq!(split_csv_line("1,,2").unwrap(), ["1", "", "2"]);
        assert!(split_csv_line(r#"1,"open"#).is_err());
    }

    #[test]
    fn malformed_training_line_names_the_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("training.csv");
        std::fs::write(&path, "rank,strategy_id,win_rate,total_return,sharpe_ratio,max_drawdown,num_trades\n1,a,0.5,x,0,0,1\n").unwrap();
        let err = read_training_table(&path).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{}", err);
        assert!(err.contains("total_return"), "{}", err);
    }
}
