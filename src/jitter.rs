//! Jitter applied to backoff delays.
//!
//! - `None`: exact delays. The default, so configured delays are observable as-is.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor while adding randomness.
//!
//! `rand`'s thread-local RNG is used by default; deterministic RNGs can be injected through
//! [`Jitter::apply_with_rng`]. Millisecond conversions saturate to `u64::MAX`.

use rand::{rng, Rng};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    #[default]
    None,
    Full,
    Equal,
}

/// Returned when a jitter name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown jitter mode `{0}` (expected none, full or equal)")]
pub struct ParseJitterError(String);

impl Jitter {
    /// Apply jitter to a delay duration.
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(delay, &mut rng)
    }

    /// Apply jitter with a caller-supplied RNG.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = as_millis_saturated(delay);
        match self {
            Jitter::None => delay,
            Jitter::Full if millis == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal if millis == 0 => Duration::ZERO,
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Jitter::None => "none",
            Jitter::Full => "full",
            Jitter::Equal => "equal",
        }
    }
}

fn as_millis_saturated(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

impl FromStr for Jitter {
    type Err = ParseJitterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Jitter::None),
            "full" => Ok(Jitter::Full),
            "equal" => Ok(Jitter::Equal),
            _ => Err(ParseJitterError(s.to_string())),
        }
    }
}

impl fmt::Display for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_jitter_returns_exact_delay() {
        let delay = Duration::from_millis(1234);
        assert_eq!(Jitter::None.apply(delay), delay);
    }

    #[test]
    fn full_jitter_is_between_zero_and_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(1000);
        for _ in 0..200 {
            assert!(Jitter::Full.apply_with_rng(delay, &mut rng) <= delay);
        }
    }

    #[test]
    fn equal_jitter_keeps_half_floor() {
        let mut rng = StdRng::seed_from_u64(11);
        let delay = Duration::from_millis(1000);
        for _ in 0..200 {
            let jittered = Jitter::Equal.apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(Jitter::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("FULL".parse::<Jitter>().unwrap(), Jitter::Full);
        assert_eq!(" equal ".parse::<Jitter>().unwrap(), Jitter::Equal);
        assert_eq!("none".parse::<Jitter>().unwrap(), Jitter::None);
        assert!("decorrelated".parse::<Jitter>().is_err());
    }
}
