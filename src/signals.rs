//! Signal sequences and the strategy set handed to the comparator.
//!
//! On disk a strategy set is a JSON object mapping strategy id to an array
//! of integers (`0` no action, `1` buy, `-1` sell). Only buys open trades.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Signal {
    Sell,
    Hold,
    Buy,
}

impl Signal {
    pub fn is_buy(self) -> bool {
        self == Signal::Buy
    }
}

impl TryFrom<i64> for Signal {
    type Error = BacktestError;

    fn try_from(v: i64) -> Result<Self> {
        match v {
            -1 => Ok(Signal::Sell),
            0 => Ok(Signal::Hold),
            1 => Ok(Signal::Buy),
            other => Err(BacktestError::InvalidSignal(other)),
        }
    }
}

impl From<Signal> for i64 {
    fn from(s: Signal) -> i64 {
        match s {
            Signal::Sell => -1,
            Signal::Hold => 0,
            Signal::Buy => 1,
        }
    }
}

/// Ordered actions produced by some external generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSequence(Vec<Signal>);

impl SignalSequence {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self(signals)
    }

    /// Build from raw integers, rejecting anything outside {-1, 0, 1}.
    pub fn from_ints(values: &[i64]) -> Result<Self> {
        values
            .iter()
            .map(|&v| Signal::try_from(v))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn all(signal: Signal, len: usize) -> Self {
        Self(vec![signal; len])
    }

    pub fn as_slice(&self) -> &[Signal] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn buy_count(&self) -> usize {
        self.0.iter().filter(|s| s.is_buy()).count()
    }
}

impl From<Vec<Signal>> for SignalSequence {
    fn from(v: Vec<Signal>) -> Self {
        Self(v)
    }
}

/// Strategy id -> signals. Iteration is by id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategySet(BTreeMap<String, SignalSequence>);

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, signals: SignalSequence) {
        self.0.insert(id.into(), signals);
    }

    pub fn get(&self, id: &str) -> Option<&SignalSequence> {
        self.0.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SignalSequence)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl FromIterator<(String, SignalSequence)> for StrategySet {
    fn from_iter<I: IntoIterator<Item = (String, SignalSequence)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
