//! The pipeline stages. Each runs to completion and talks to the next one
//! only through the files in `report`.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::Config;
use crate::data::{load_candles_csv, DatasetManifest, PriceSeries, Split};
use crate::generate::generate_random_strategies;
use crate::error::BacktestError;
use crate::logging::{info, obj, v_int, v_num, v_str, warn, Domain, Timer};
use crate::metrics::{periods_per_year_for_interval, MetricsOptions};
use crate::ranking::{rank_strategies, RankedTable};
use crate::report::{
    read_training_table, write_json, write_training_table, write_validation_csv,
    BestStrategyRecord, DataPaths, ResultPaths,
};
use crate::signals::StrategySet;
use crate::validation::{validate_selected, ValidationPolicy, ValidationReport};

/// Candles are assumed to trade every day of the year when annualizing from data.
const CALENDAR_DAYS: f64 = 365.0;

/// One trade needs an entry and an exit price.
const MIN_SPLIT_POINTS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub strategies: usize,
    pub signals_per_strategy: usize,
    pub points: usize,
    pub train_points: usize,
    pub validation_points: usize,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub ts_min: Option<NaiveDateTime>,
    pub ts_max: Option<NaiveDateTime>,
    pub hash_sha256: String,
}

/// Generate coin-flip strategies and split the configured price history.
pub fn generate(cfg: &Config) -> Result<GenerateOutcome> {
    cfg.validate()?;
    let timer = Timer::start(Domain::System, "generate");
    let source = cfg
        .price_csv
        .as_deref()
        .ok_or_else(|| {
            BacktestError::InvalidConfig("PRICE_CSV is not set; point it at a candle CSV".to_string())
        })?;
    let paths = DataPaths::new(&cfg.data_dir);

    let strategies =
        generate_random_strategies(cfg.num_strategies, cfg.num_signals, cfg.random_seed);
    info(
        Domain::Strategy,
        "generated",
        obj(&[
            ("strategies", v_int(strategies.len())),
            ("signals", v_int(cfg.num_signals)),
            ("seed", serde_json::json!(cfg.random_seed)),
        ]),
    );

    let load = load_candles_csv(source, cfg.max_data_points)
        .with_context(|| format!("loading candles from {}", source.display()))?;
    if load.bad_rows > 0 {
        warn(
            Domain::Data,
            "bad_rows",
            obj(&[
                ("count", v_int(load.bad_rows)),
                ("source", v_str(&source.display().to_string())),
            ]),
        );
    }
    let series = PriceSeries::from_prices(&load.rows, cfg.train_split)?;
    for (split, context) in [(Split::Train, "training"), (Split::Validation, "validation")] {
        let count = series.count(split);
        if count < MIN_SPLIT_POINTS {
            return Err(BacktestError::InsufficientPrices {
                context,
                count,
                needed: MIN_SPLIT_POINTS,
            }
            .into());
        }
    }
    let manifest = DatasetManifest::build(source, &load, &series, cfg.train_split)?;

    strategies
        .save(&paths.strategies)
        .with_context(|| format!("writing {}", paths.strategies.display()))?;
    series
        .save_csv(&paths.prices)
        .with_context(|| format!("writing {}", paths.prices.display()))?;
    write_json(&paths.manifest, &manifest)?;

    info(
        Domain::Data,
        "dataset_written",
        obj(&[
            ("points", v_int(manifest.row_count)),
            ("train", v_int(manifest.train_rows)),
            ("validation", v_int(manifest.validation_rows)),
            ("sha256", v_str(&manifest.hash_sha256)),
        ]),
    );

    timer.succeed();
    Ok(GenerateOutcome {
        strategies: strategies.len(),
        signals_per_strategy: cfg.num_signals,
        points: manifest.row_count,
        train_points: manifest.train_rows,
        validation_points: manifest.validation_rows,
        price_min: manifest.price_min,
        price_max: manifest.price_max,
        ts_min: manifest.ts_min,
        ts_max: manifest.ts_max,
        hash_sha256: manifest.hash_sha256,
    })
}

fn load_inputs(cfg: &Config) -> Result<(StrategySet, PriceSeries)> {
    let paths = DataPaths::new(&cfg.data_dir);
    let strategies = StrategySet::load(&paths.strategies)
        .with_context(|| format!("loading {}", paths.strategies.display()))?;
    let series = PriceSeries::load_csv(&paths.prices)
        .with_context(|| format!("loading {}", paths.prices.display()))?;
    Ok((strategies, series))
}

/// Metrics options for `series`, honouring `ANNUALIZE_FROM_DATA`.
pub fn metrics_options_for(cfg: &Config, series: &PriceSeries) -> MetricsOptions {
    let mut opts = cfg.metrics_options();
    if cfg.annualize_from_data {
        if let Some(interval) = series.median_interval_secs() {
            opts.periods_per_year = periods_per_year_for_interval(interval, CALENDAR_DAYS);
            info(
                Domain::Metrics,
                "annualization",
                obj(&[
                    ("interval_secs", serde_json::json!(interval)),
                    ("periods_per_year", v_num(opts.periods_per_year)),
                ]),
            );
        }
    }
    opts
}

/// Score every strategy on the training split and write the ranked table.
pub fn backtest(cfg: &Config) -> Result<RankedTable> {
    cfg.validate()?;
    let timer = Timer::start(Domain::System, "backtest");
    let (strategies, series) = load_inputs(cfg)?;
    let opts = metrics_options_for(cfg, &series);
    let table = rank_strategies(&strategies, &series.train_prices(), &opts)?;
    let paths = ResultPaths::new(&cfg.results_dir);
    write_training_table(&paths.training, &table)
        .with_context(|| format!("writing {}", paths.training.display()))?;
    timer.succeed();
    Ok(table)
}

/// Pick the rank-1 training strategy and record it with its signals.
pub fn select(cfg: &Config) -> Result<BestStrategyRecord> {
    let timer = Timer::start(Domain::System, "select");
    let paths = ResultPaths::new(&cfg.results_dir);
    let table = read_training_table(&paths.training)
        .with_context(|| format!("reading {}", paths.training.display()))?;
    let strategies = StrategySet::load(&DataPaths::new(&cfg.data_dir).strategies)?;
    let best = table.best()?;
    let signals = strategies
        .get(&best.strategy_id)
        .cloned()
        .ok_or_else(|| BacktestError::UnknownStrategy(best.strategy_id.clone()))?;
    let distribution = table
        .distribution()
        .ok_or(BacktestError::EmptyStrategies)?;
    let record = BestStrategyRecord {
        strategy_id: best.strategy_id.clone(),
        signals,
        training_metrics: best.metrics,
        ranked_out_of: table.len(),
        distribution,
    };
    write_json(&paths.best, &record)?;
    info(
        Domain::Selection,
        "selected",
        obj(&[
            ("strategy_id", v_str(&record.strategy_id)),
            ("win_rate", v_num(record.training_metrics.win_rate)),
            ("out_of", v_int(record.ranked_out_of)),
        ]),
    );
    timer.succeed();
    Ok(record)
}

/// Re-score the top-N training strategies on the validation split.
pub fn validate(cfg: &Config) -> Result<ValidationReport> {
    cfg.validate()?;
    let timer = Timer::start(Domain::System, "validate");
    let paths = ResultPaths::new(&cfg.results_dir);
    let table = read_training_table(&paths.training)
        .with_context(|| format!("reading {}", paths.training.display()))?;
    let (strategies, series) = load_inputs(cfg)?;
    let opts = metrics_options_for(cfg, &series);
    let policy = ValidationPolicy {
        top_n: cfg.top_n,
        overfit_threshold: cfg.overfit_threshold,
        still_good_win_rate: cfg.still_good_win_rate,
    };
    let report = validate_selected(
        &strategies,
        &table,
        &series.validation_prices(),
        &policy,
        &opts,
    )?;
    write_validation_csv(&paths.validation_csv, &report)?;
    write_json(&paths.validation_summary, &report)?;
    timer.succeed();
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub generated: GenerateOutcome,
    pub training: RankedTable,
    pub best: BestStrategyRecord,
    pub validation: ValidationReport,
}

pub fn run_all(cfg: &Config) -> Result<PipelineOutcome> {
    Ok(PipelineOutcome {
        generated: generate(cfg)?,
        training: backtest(cfg)?,
        best: select(cfg)?,
        validation: validate(cfg)?,
    })
}
