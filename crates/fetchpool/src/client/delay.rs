use crate::error::{Error, Result};
use core::time::Duration;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// A trait for sources of inter-arrival delays.
///
/// This abstraction allows you to plug in a random source for production or a
/// fixed one in tests.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use fetchpool::DelaySource;
///
/// struct Every50ms;
/// impl DelaySource for Every50ms {
///     fn next_delay(&mut self) -> Duration {
///         Duration::from_millis(50)
///     }
/// }
///
/// assert_eq!(Every50ms.next_delay(), Duration::from_millis(50));
/// ```
pub trait DelaySource {
    /// Returns the delay before the next job is produced.
    fn next_delay(&mut self) -> Duration;
}

/// Delays drawn uniformly from `[min, max]` at millisecond resolution.
#[derive(Clone, Debug)]
pub struct UniformDelay {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
}

impl UniformDelay {
    /// Creates a source seeded from OS entropy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        Self::with_rng(min, max, StdRng::from_os_rng())
    }

    /// Creates a deterministic source. The same seed yields the same
    /// sequence of delays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `min > max`.
    pub fn seeded(min: Duration, max: Duration, seed: u64) -> Result<Self> {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Result<Self> {
        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if min_ms > max_ms {
            return Err(Error::InvalidConfig {
                reason: format!("minimum interval {min_ms}ms exceeds maximum {max_ms}ms"),
            });
        }
        Ok(Self {
            rng,
            min_ms,
            max_ms,
        })
    }
}

impl DelaySource for UniformDelay {
    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(self.min_ms..=self.max_ms))
    }
}

/// The same delay every time.
#[derive(Clone, Copy, Debug)]
pub struct FixedDelay(pub Duration);

impl DelaySource for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(300);
        let mut source = UniformDelay::seeded(min, max, 42).unwrap();
        for _ in 0..10_000 {
            let delay = source.next_delay();
            assert!(delay >= min && delay <= max, "{delay:?} out of range");
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(300);
        let mut a = UniformDelay::seeded(min, max, 7).unwrap();
        let mut b = UniformDelay::seeded(min, max, 7).unwrap();
        let xs: Vec<_> = (0..64).map(|_| a.next_delay()).collect();
        let ys: Vec<_> = (0..64).map(|_| b.next_delay()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn degenerate_range_is_constant() {
        let d = Duration::from_millis(25);
        let mut source = UniformDelay::seeded(d, d, 1).unwrap();
        assert_eq!(source.next_delay(), d);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = UniformDelay::new(Duration::from_millis(300), Duration::from_millis(10));
        assert!(matches!(err, Err(Error::InvalidConfig { .. })));
    }
}
