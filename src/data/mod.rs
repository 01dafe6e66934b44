//! Price data: candle CSV loading, the chronological train/validation split,
//! the `timestamp,price,returns,split` dataset file and its manifest.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{BacktestError, Result};

pub const DATASET_COLUMNS: [&str; 4] = ["timestamp", "price", "returns", "split"];

const TS_COLUMNS: [&str; 5] = ["dt", "timestamp", "ts", "time", "date"];
const PRICE_COLUMNS: [&str; 2] = ["close", "price"];
const TS_FORMATS: [&str; 3] = ["%d.%m.%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATASET_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "validation" => Ok(Split::Validation),
            other => Err(BacktestError::Parse(format!("unknown split label '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// Simple return from the previous point; 0.0 for the first.
    pub ret: f64,
    pub split: Split,
}

/// Chronologically ordered prices, each labelled train or validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build from (timestamp, price) pairs, labelling the leading
    /// `floor(len * train_fraction)` points as training.
    pub fn from_prices(rows: &[(NaiveDateTime, f64)], train_fraction: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(BacktestError::InvalidConfig(format!(
                "train fraction must be in [0, 1], got {}",
                train_fraction
            )));
        }
        let split_idx = split_index(rows.len(), train_fraction);
        let mut points = Vec::with_capacity(rows.len());
        for (i, &(timestamp, price)) in rows.iter().enumerate() {
            if !(price.is_finite() && price > 0.0) {
                return Err(BacktestError::InvalidPrice { index: i, value: price });
            }
            let ret = if i == 0 {
                0.0
            } else {
                let prev = rows[i - 1].1;
                (price - prev) / prev
            };
            points.push(PricePoint {
                timestamp,
                price,
                ret,
                split: if i < split_idx { Split::Train } else { Split::Validation },
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn train(&self) -> impl Iterator<Item = &PricePoint> {
        self.in_split(Split::Train)
    }

    pub fn validation(&self) -> impl Iterator<Item = &PricePoint> {
        self.in_split(Split::Validation)
    }

    fn in_split(&self, split: Split) -> impl Iterator<Item = &PricePoint> {
        self.points.iter().filter(move |p| p.split == split)
    }

    pub fn train_prices(&self) -> Vec<f64> {
        self.train().map(|p| p.price).collect()
    }

    pub fn validation_prices(&self) -> Vec<f64> {
        self.validation().map(|p| p.price).collect()
    }

    pub fn count(&self, split: Split) -> usize {
        self.in_split(split).count()
    }

    pub fn price_range(&self) -> Option<(f64, f64)> {
        self.points.iter().map(|p| p.price).fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
    }

    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.points.first()?.timestamp, self.points.last()?.timestamp))
    }

    /// Median spacing between consecutive timestamps, in seconds.
    pub fn median_interval_secs(&self) -> Option<u64> {
        let mut gaps: Vec<i64> = self
            .points
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
            .filter(|g| *g > 0)
            .collect();
        if gaps.is_empty() {
            return None;
        }
        gaps.sort_unstable();
        Some(gaps[gaps.len() / 2] as u64)
    }

    /// Write the dataset file (`timestamp,price,returns,split`).
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = String::new();
        out.push_str(&DATASET_COLUMNS.join(","));
        out.push('\n');
        for p in &self.points {
            out.push_str(&format!(
                "{},{},{},{}\n",
                p.timestamp.format(DATASET_TS_FORMAT),
                p.price,
                p.ret,
                p.split.as_str()
            ));
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Read a dataset file written by [`PriceSeries::save_csv`].
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut points = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("timestamp,") {
                continue;
            }
            let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            if parts.len() != DATASET_COLUMNS.len() {
                return Err(BacktestError::Parse(format!(
                    "line {}: expected {} columns, got {}",
                    line_no + 1,
                    DATASET_COLUMNS.len(),
                    parts.len()
                )));
            }
            let price: f64 = parse_f64(parts[1], line_no)?;
            if !(price.is_finite() && price > 0.0) {
                return Err(BacktestError::InvalidPrice { index: points.len(), value: price });
            }
            points.push(PricePoint {
                timestamp: parse_timestamp(parts[0])?,
                price,
                ret: parse_f64(parts[2], line_no)?,
                split: Split::parse(parts[3])?,
            });
        }
        Ok(Self { points })
    }
}

fn parse_f64(s: &str, line_no: usize) -> Result<f64> {
    s.parse()
        .map_err(|e| BacktestError::Parse(format!("line {}: bad number '{}': {}", line_no + 1, s, e)))
}

/// Index of the first validation point for a chronological split.
pub fn split_index(len: usize, train_fraction: f64) -> usize {
    ((len as f64 * train_fraction).floor() as usize).min(len)
}

/// Parse the timestamp formats found in candle exports.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in TS_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.naive_utc());
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp(secs, 0) {
            return Ok(ts.naive_utc());
        }
    }
    Err(BacktestError::Parse(format!("unrecognised timestamp '{}'", s)))
}

/// Result of reading a raw candle export.
#[derive(Debug, Clone)]
pub struct CandleLoad {
    pub rows: Vec<(NaiveDateTime, f64)>,
    pub bad_rows: usize,
    pub warnings: Vec<String>,
}

/// Load (timestamp, close) pairs from a candle CSV with a header row,
/// keeping at most `max_points` rows.
pub fn load_candles_csv(path: &Path, max_points: usize) -> Result<CandleLoad> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                let trimmed = line.trim().trim_start_matches('\u{feff}');
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                break trimmed
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .collect::<Vec<_>>();
            }
            None => return Err(BacktestError::Parse("missing header".to_string())),
        }
    };
    let ts_col = find_column(&header, &TS_COLUMNS)
        .ok_or_else(|| BacktestError::Parse(format!("no timestamp column in {:?}", header)))?;
    let price_col = find_column(&header, &PRICE_COLUMNS)
        .ok_or_else(|| BacktestError::Parse(format!("no close/price column in {:?}", header)))?;

    let mut rows = Vec::new();
    let mut bad_rows = 0usize;
    let mut warnings = Vec::new();
    for line in lines {
        if rows.len() >= max_points {
            break;
        }
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = trimmed.split(',').collect();
        let parsed = match (parts.get(ts_col), parts.get(price_col)) {
            (Some(ts), Some(price)) => parse_timestamp(ts)
                .ok()
                .zip(price.trim().parse::<f64>().ok())
                .filter(|(_, p)| p.is_finite() && *p > 0.0),
            _ => None,
        };
        match parsed {
            Some((ts, price)) => {
                if let Some((prev, _)) = rows.last() {
                    if ts <= *prev {
                        warnings.push(format!("non_monotonic_ts: prev={} current={}", prev, ts));
                    }
                }
                rows.push((ts, price));
            }
            None => {
                bad_rows += 1;
                warnings.push(format!("bad_row: {}", trimmed));
            }
        }
    }
    Ok(CandleLoad {
        rows,
        bad_rows,
        warnings,
    })
}

fn find_column(header: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| header.iter().position(|h| h == name))
}

/// Provenance of a generated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub source: String,
    pub hash_sha256: String,
    pub row_count: usize,
    pub bad_rows: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub train_split: f64,
    pub ts_min: Option<NaiveDateTime>,
    pub ts_max: Option<NaiveDateTime>,
    pub interval_secs: Option<u64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub warnings: Vec<String>,
}

impl DatasetManifest {
    pub fn build(source: &Path, load: &CandleLoad, series: &PriceSeries, train_split: f64) -> Result<Self> {
        let time_range = series.time_range();
        let price_range = series.price_range();
        Ok(Self {
            source: source.display().to_string(),
            hash_sha256: file_sha256(source)?,
            row_count: series.len(),
            bad_rows: load.bad_rows,
            train_rows: series.count(Split::Train),
            validation_rows: series.count(Split::Validation),
            train_split,
            ts_min: time_range.map(|r| r.0),
            ts_max: time_range.map(|r| r.1),
            interval_secs: series.median_interval_secs(),
            price_min: price_range.map(|r| r.0),
            price_max: price_range.map(|r| r.1),
            warnings: load.warnings.clone(),
        })
    }
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 1)
            .unwrap()
            .and_hms_opt(0, minute, 0)
            .unwrap()
    }

    #[test]
    fn split_is_floor_of_fraction() {
        assert_eq!(split_index(100, 0.7), 70);
        assert_eq!(split_index(10, 0.75), 7);
        assert_eq!(split_index(10, 1.0), 10);
        assert_eq!(split_index(0, 0.7), 0);
    }

    #[test]
    fn labels_and_returns() {
        let rows: Vec<_> = (0..10).map(|i| (ts(i * 5), 100.0 + i as f64)).collect();
        let series = PriceSeries::from_prices(&rows, 0.7).unwrap();
        assert_eq!(series.train_prices().len(), 7);
        assert_eq!(series.validation_prices(), vec![107.0, 108.0, 109.0]);
        assert_eq!(series.validation().next().map(|p| p.timestamp), Some(ts(35)));
        assert!(series.train().all(|p| p.split == Split::Train));
        assert_eq!(series.points()[0].ret, 0.0);
        assert!((series.points()[1].ret - 0.01).abs() < 1e-12);
        assert_eq!(series.median_interval_secs(), Some(300));
        assert_eq!(series.price_range(), Some((100.0, 109.0)));
    }

    #[test]
    fn rejects_non_positive_price() {
        let rows = vec![(ts(0), 100.0), (ts(5), 0.0)];
        assert!(matches!(
            PriceSeries::from_prices(&rows, 0.5),
            Err(BacktestError::InvalidPrice { index: 1, .. })
        ));
    }

    #[test]
    fn timestamp_formats() {
        let expected = ts(5);
        assert_eq!(parse_timestamp("01.10.2024 00:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-10-01 00:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-10-01T00:05:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("1727741100").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn candle_loader_finds_columns_and_counts_bad_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("candles.csv");
        std::fs::write(
            &path,
            "dt,Open,High,Low,Close,Volume\n\
             01.10.2024 00:00:00,1,1,1,100.5,3\n\
             01.10.2024 00:05:00,1,1,1,oops,3\n\
             01.10.2024 00:10:00,1,1,1,101.0,3\n\
             01.10.2024 00:15:00,1,1,1,102.0,3\n",
        )
        .unwrap();
        let load = load_candles_csv(&path, 2).unwrap();
        assert_eq!(load.rows, vec![(ts(0), 100.5), (ts(10), 101.0)]);
        assert_eq!(load.bad_rows, 1);

        std::fs::write(&path, "when,open\n1,2\n").unwrap();
        assert!(matches!(load_candles_csv(&path, 10), Err(BacktestError::Parse(_))));
    }

    #[test]
    fn dataset_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join("prices.csv");
        let rows: Vec<_> = (0..6).map(|i| (ts(i * 5), 100.0 + (i as f64).sin())).collect();
        let series = PriceSeries::from_prices(&rows, 0.5).unwrap();
        series.save_csv(&path).unwrap();
        let back = PriceSeries::load_csv(&path).unwrap();
        assert_eq!(back, series);
        assert_eq!(back.count(Split::Validation), 3);

        let manifest = DatasetManifest::build(
            &path,
            &CandleLoad { rows, bad_rows: 0, warnings: Vec::new() },
            &series,
            0.5,
        )
        .unwrap();
        assert_eq!(manifest.hash_sha256, file_sha256(&path).unwrap());
        assert_eq!(manifest.interval_secs, Some(300));
    }
}
