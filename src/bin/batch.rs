//! Batch runner: reads a stage event as JSON and prints the response.
//!
//! Usage: batch [event.json]   (reads stdin when no path is given)
//!
//! {"stage": "validate", "results_dir": "results", "top_n": 10}

use std::io::Read;

use anyhow::{Context, Result};

use overfitlab::config::Config;
use overfitlab::handler::{handle, BatchEvent};

fn main() -> Result<()> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let event: BatchEvent = serde_json::from_str(&raw).context("parsing event")?;
    let response = handle(&event, &Config::from_env()?);
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}
