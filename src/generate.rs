//! Coin-flip strategies: buy or stand aside with equal probability.
//!
//! With enough of them, some look excellent on any fixed price history.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::signals::{Signal, SignalSequence, StrategySet};

/// One random strategy of `len` signals, reproducible from `seed`.
pub fn generate_random_strategy(len: usize, seed: u64) -> SignalSequence {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| if rng.gen_bool(0.5) { Signal::Buy } else { Signal::Hold })
        .collect::<Vec<_>>()
        .into()
}

/// `strategy_000`, `strategy_001`, ... each seeded with `base_seed + i`.
pub fn generate_random_strategies(count: usize, len: usize, base_seed: u64) -> StrategySet {
    (0..count)
        .map(|i| {
            (
                strategy_id(i),
                generate_random_strategy(len, base_seed.wrapping_add(i as u64)),
            )
        })
        .collect()
}

pub fn strategy_id(i: usize) -> String {
    format!("strategy_{:03}", i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_signals() {
        assert_eq!(generate_random_strategy(200, 7), generate_random_strategy(200, 7));
        assert_ne!(generate_random_strategy(200, 7), generate_random_strategy(200, 8));
    }

    #[test]
    fn only_buy_or_hold_roughly_balanced() {
        let seq = generate_random_strategy(2000, 42);
        assert!(seq.as_slice().iter().all(|s| *s != Signal::Sell));
        let buys = seq.buy_count();
        assert!(buys > 800 && buys < 1200, "buys = {}", buys);
    }

    #[test]
    fn set_ids_and_sizes() {
        let set = generate_random_strategies(12, 50, 42);
        assert_eq!(set.len(), 12);
        assert!(set.get("strategy_000").is_some());
        assert!(set.get("strategy_011").is_some());
        assert!(set.iter().all(|(_, s)| s.len() == 50));
        assert_eq!(set.get("strategy_003"), Some(&generate_random_strategy(50, 45)));
    }
}
