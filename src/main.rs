//! Overfitting demonstration pipeline.
//!
//! Usage: overfitlab [generate|backtest|select|validate|all] [price_csv]
//!
//! Stages communicate through DATA_DIR and RESULTS_DIR; see `Config::from_env`
//! for the remaining knobs.

use anyhow::{anyhow, Result};

use overfitlab::config::Config;
use overfitlab::console;
use overfitlab::pipeline;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let stage = args.get(1).map(|s| s.as_str()).unwrap_or("all");
    let mut cfg = Config::from_env()?;
    if let Some(path) = args.get(2) {
        cfg.price_csv = Some(path.into());
    }

    match stage {
        "generate" => console::print_generate(&pipeline::generate(&cfg)?),
        "backtest" => console::print_training(&pipeline::backtest(&cfg)?),
        "select" => console::print_selection(&pipeline::select(&cfg)?),
        "validate" => console::print_validation(&pipeline::validate(&cfg)?),
        "all" => {
            let out = pipeline::run_all(&cfg)?;
            console::print_generate(&out.generated);
            console::print_training(&out.training);
            console::print_selection(&out.best);
            console::print_validation(&out.validation);
        }
        other => {
            return Err(anyhow!(
                "unknown stage '{}' (expected generate, backtest, select, validate or all)",
                other
            ))
        }
    }
    println!("Results in {}", cfg.results_dir.display());
    Ok(())
}
