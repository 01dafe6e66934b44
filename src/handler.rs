//! JSON-in, JSON-out adapter over the pipeline stages for batch runners.
//!
//! An event names a stage and may override directories and a few knobs;
//! the response carries an HTTP-style status code and a stage-specific body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::BacktestError;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::pipeline;
use crate::validation::ValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Backtest,
    Select,
    Validate,
    All,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Backtest => "backtest",
            Stage::Select => "select",
            Stage::Validate => "validate",
            Stage::All => "all",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchEvent {
    pub stage: Stage,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default)]
    pub price_csv: Option<PathBuf>,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub overfit_threshold: Option<f64>,
}

impl BatchEvent {
    /// `base` with this event's overrides applied.
    pub fn apply(&self, base: &Config) -> Config {
        let mut cfg = base.clone();
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            cfg.results_dir = dir.clone();
        }
        if let Some(path) = &self.price_csv {
            cfg.price_csv = Some(path.clone());
        }
        if let Some(n) = self.top_n {
            cfg.top_n = n;
        }
        if let Some(t) = self.overfit_threshold {
            cfg.overfit_threshold = t;
        }
        cfg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status_code: u16,
    pub stage: Stage,
    pub body: Value,
}

pub fn handle(event: &BatchEvent, base: &Config) -> BatchResponse {
    let cfg = event.apply(base);
    match run_stage(event.stage, &cfg) {
        Ok(body) => BatchResponse {
            status_code: 200,
            stage: event.stage,
            body,
        },
        Err(err) => {
            let status_code = match err.downcast_ref::<BacktestError>() {
                Some(e) if e.is_input_error() => 400,
                _ => 500,
            };
            log(
                Level::Error,
                Domain::System,
                "stage_failed",
                obj(&[
                    ("stage", v_str(event.stage.as_str())),
                    ("error", v_str(&format!("{:#}", err))),
                ]),
            );
            BatchResponse {
                status_code,
                stage: event.stage,
                body: json!({ "error": format!("{:#}", err) }),
            }
        }
    }
}

fn validation_body(report: &ValidationReport) -> Value {
    let best = report.comparisons.first();
    json!({
        "summary": report.summary,
        "strategy_id": best.map(|c| c.strategy_id.clone()),
        "training_win_rate": best.map(|c| c.train.win_rate),
        "validation_win_rate": best.map(|c| c.validation.win_rate),
        "performance_drop": best.map(|c| c.performance_drop),
        "overfitting_detected": best.map(|c| c.overfitting_detected),
    })
}

fn run_stage(stage: Stage, cfg: &Config) -> anyhow::Result<Value> {
    let body = match stage {
        Stage::Generate => serde_json::to_value(pipeline::generate(cfg)?)?,
        Stage::Backtest => {
            let table = pipeline::backtest(cfg)?;
            json!({
                "strategies": table.len(),
                "distribution": table.distribution(),
                "top": table.top_n(5),
            })
        }
        Stage::Select => serde_json::to_value(pipeline::select(cfg)?)?,
        Stage::Validate => validation_body(&pipeline::validate(cfg)?),
        Stage::All => {
            let outcome = pipeline::run_all(cfg)?;
            json!({
                "generated": outcome.generated,
                "best_id": outcome.best.strategy_id,
                "validation": validation_body(&outcome.validation),
            })
        }
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_overrides_config() {
        let base = Config::rooted_at(std::path::Path::new("/base"));
        let event: BatchEvent = serde_json::from_str(
            r#"{"stage": "validate", "results_dir": "/elsewhere", "top_n": 3}"#,
        )
        .unwrap();
        let cfg = event.apply(&base);
        assert_eq!(event.stage, Stage::Validate);
        assert_eq!(cfg.results_dir, PathBuf::from("/elsewhere"));
        assert_eq!(cfg.data_dir, PathBuf::from("/base/data"));
        assert_eq!(cfg.top_n, 3);
        assert_eq!(cfg.overfit_threshold, 0.15);
    }

    fn stage_event(stage: Stage) -> BatchEvent {
        BatchEvent {
            stage,
            data_dir: None,
            results_dir: None,
            price_csv: None,
            top_n: None,
            overfit_threshold: None,
        }
    }

    #[test]
    fn unusable_price_input_is_bad_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = Config::rooted_at(dir.path());

        let resp = handle(&stage_event(Stage::Generate), &base);
        assert_eq!(resp.status_code, 400, "{}", resp.body);
        assert!(resp.body["error"].as_str().unwrap().contains("PRICE_CSV"));

        let csv = dir.path().join("short.csv");
        std::fs::write(
            &csv,
            "dt,close\n\
             01.10.2024 00:00:00,100\n\
             01.10.2024 00:05:00,101\n\
             01.10.2024 00:10:00,102\n",
        )
        .unwrap();
        let mut event = stage_event(Stage::Generate);
        event.price_csv = Some(csv);
        let resp = handle(&event, &base);
        assert_eq!(resp.status_code, 400, "{}", resp.body);
        assert!(resp.body["error"]
            .as_str()
            .unwrap()
            .contains("validation split has 1 prices, need at least 2"));
    }

    #[test]
    fn missing_inputs_fail_with_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = Config::rooted_at(dir.path());
        let resp = handle(&stage_event(Stage::Select), &base);
        assert_eq!(resp.status_code, 500);
        assert!(resp.body["error"].as_str().unwrap().contains("training_performance.csv"));
    }
}
