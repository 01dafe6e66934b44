//! Error types for scoring, ranking and validation.

use thiserror::Error;

/// Failures surfaced to callers of the metrics engine and the comparator.
///
/// Degenerate but well-defined inputs (no trades, zero variance) are not
/// errors; they produce zero-valued metrics.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Signal and price sequences differ in length under the strict policy.
    #[error("signal length {signals} does not match price length {prices}")]
    InputLengthMismatch { signals: usize, prices: usize },

    /// No strategies were supplied to the comparator.
    #[error("no strategies to score")]
    EmptyStrategies,

    /// The price slice handed to the comparator is empty.
    #[error("no {context} prices to score against")]
    EmptyPrices { context: &'static str },

    /// A price is non-finite or not strictly positive.
    #[error("invalid price {value} at index {index}")]
    InvalidPrice { index: usize, value: f64 },

    /// A signal value outside {-1, 0, 1}.
    #[error("invalid signal value {0} (expected -1, 0 or 1)")]
    InvalidSignal(i64),

    /// A split leaves too few prices on one side to form a trade.
    #[error("{context} split has {count} prices, need at least {needed}")]
    InsufficientPrices {
        context: &'static str,
        count: usize,
        needed: usize,
    },

    /// A record asked for a comparison before it was scored.
    #[error("strategy '{strategy_id}' has no {context} score")]
    Unscored {
        strategy_id: String,
        context: &'static str,
    },

    /// A ranked strategy id with no signal sequence behind it.
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    /// A scoring worker thread died.
    #[error("scoring worker failed: {0}")]
    Worker(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BacktestError {
    /// True for failures caused by the caller's input rather than the environment.
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            BacktestError::Io(_) | BacktestError::Worker(_) | BacktestError::Unscored { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = BacktestError::InputLengthMismatch { signals: 5, prices: 3 };
        assert_eq!(err.to_string(), "signal length 5 does not match price length 3");
        let err = BacktestError::EmptyPrices { context: "validation" };
        assert_eq!(err.to_string(), "no validation prices to score against");
    }

    #[test]
    fn io_errors_are_not_input_errors() {
        let err = BacktestError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!err.is_input_error());
        assert!(BacktestError::EmptyStrategies.is_input_error());
        assert!(BacktestError::InsufficientPrices { context: "training", count: 1, needed: 2 }
            .is_input_error());
    }
}
