//! Randomized pacing used to avoid fixed-interval, bot-detectable timing.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;

pub const DEFAULT_BASE_SECONDS: f64 = 0.4;
pub const DEFAULT_VARIANCE_SECONDS: f64 = 0.4;
const FLOOR_SECONDS: f64 = 0.05;

/// `max(0.05, base + uniform(0, variance))` seconds, drawn from `rng`.
pub fn human_delay_with<R: Rng>(rng: &mut R, base: f64, variance: f64) -> f64 {
    let jitter = rng.random_range(0.0..=variance);
    (base + jitter).max(FLOOR_SECONDS)
}

/// A small randomized delay mimicking human interaction speed.
pub fn human_delay(base: f64, variance: f64) -> f64 {
    human_delay_with(&mut rand::rng(), base, variance)
}

/// Sleep for a [`human_delay`] worth of seconds.
pub async fn pace(base: f64, variance: f64) {
    let seconds = human_delay(base, variance);
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
}

/// Async pacing helper for cooperative callers; uniform in `[min, max)`.
pub async fn sleep_human(min_seconds: f64, max_seconds: f64) {
    let seconds = rand::rng().random_range(min_seconds..max_seconds);
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
}

/// Cumulative-weight sampling over `options`; the last option absorbs any
/// rounding shortfall.
pub fn choice_weighted_with<'a, T, R: Rng>(
    rng: &mut R,
    options: &'a [T],
    weights: &[f64],
) -> &'a T {
    let last = options.last().expect("there should be at least one option");
    let total: f64 = weights.iter().take(options.len()).sum();
    if total <= 0.0 {
        return last;
    }
    let pick = rng.random_range(0.0..total);
    let mut acc = 0.0;
    for (option, weight) in options.iter().zip(weights) {
        acc += weight;
        if pick <= acc {
            return option;
        }
    }
    last
}

pub fn choice_weighted<'a, T>(options: &'a [T], weights: &[f64]) -> &'a T {
    choice_weighted_with(&mut rand::rng(), options, weights)
}

/// Infinite iterator yielding every item once per pass, reshuffling the pool
/// before each pass when `shuffle` is set. Restartable only by building a new
/// one. An empty pool yields nothing.
pub struct BiasedCycle<T, R> {
    pool: Vec<T>,
    next: usize,
    shuffle: bool,
    rng: R,
}

pub fn cycle_with_bias<T>(
    items: Vec<T>,
    shuffle: bool,
) -> BiasedCycle<T, rand::rngs::ThreadRng> {
    cycle_with_bias_rng(items, shuffle, rand::rng())
}

pub fn cycle_with_bias_rng<T, R: Rng>(
    items: Vec<T>,
    shuffle: bool,
    rng: R,
) -> BiasedCycle<T, R> {
    BiasedCycle {
        pool: items,
        next: 0,
        shuffle,
        rng,
    }
}

impl<T: Clone, R: Rng> Iterator for BiasedCycle<T, R> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pool.is_empty() {
            return None;
        }
        if self.next == 0 && self.shuffle {
            self.pool.shuffle(&mut self.rng);
        }
        let item = self.pool[self.next].clone();
        self.next = (self.next + 1) % self.pool.len();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::HashSet;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    proptest! {
        #[test]
        fn human_delay_stays_within_bounds(
            base in 0.0f64..5.0,
            variance in 0.0f64..5.0,
            seed in any::<u64>(),
        ) {
            let delay = human_delay_with(&mut rng(seed), base, variance);
            prop_assert!(delay >= 0.05);
            prop_assert!(delay >= f64::max(0.05, base) - f64::EPSILON);
            prop_assert!(delay <= f64::max(0.05, base + variance) + f64::EPSILON);
        }
    }

    #[test]
    fn human_delay_floors_tiny_inputs() {
        assert_eq!(human_delay_with(&mut rng(1), 0.0, 0.0), 0.05);
    }

    #[test]
    fn choice_weighted_is_roughly_fair_on_equal_weights() {
        let options = ["a", "b"];
        let weights = [1.0, 1.0];
        let mut rng = rng(42);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for _ in 0..10_000 {
            let picked = choice_weighted_with(&mut rng, &options, &weights);
            *counts.entry(picked).or_default() += 1;
        }
        let a = counts["a"] as f64;
        let b = counts["b"] as f64;
        assert!((a / b - 1.0).abs() < 0.2, "skewed counts: a={} b={}", a, b);
    }

    #[test]
    fn choice_weighted_never_picks_a_zero_weight_head() {
        let options = ["never", "always"];
        let weights = [0.0, 1.0];
        let mut rng = rng(7);
        for _ in 0..1_000 {
            assert_eq!(*choice_weighted_with(&mut rng, &options, &weights), "always");
        }
    }

    #[test]
    fn choice_weighted_falls_back_to_last_on_zero_total() {
        let options = ["a", "b", "c"];
        assert_eq!(*choice_weighted_with(&mut rng(3), &options, &[0.0; 3]), "c");
    }

    #[test]
    fn cycle_with_bias_yields_every_item_each_pass() {
        let items = vec!["x", "y", "z"];
        let mut cycle = cycle_with_bias_rng(items.clone(), true, rng(9));
        for _ in 0..4 {
            let pass: HashSet<&str> = (0..items.len())
                .map(|_| cycle.next().expect("cycle is infinite"))
                .collect();
            assert_eq!(pass.len(), items.len());
        }
    }

    #[test]
    fn cycle_with_bias_preserves_order_without_shuffle() {
        let mut cycle = cycle_with_bias_rng(vec![1, 2, 3], false, rng(11));
        let first_two_passes: Vec<i32> = (0..6).map(|_| cycle.next().unwrap()).collect();
        assert_eq!(first_two_passes, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn cycle_with_bias_on_empty_pool_yields_nothing() {
        let mut cycle = cycle_with_bias_rng(Vec::<u8>::new(), true, rng(13));
        assert_eq!(cycle.next(), None);
    }
}
