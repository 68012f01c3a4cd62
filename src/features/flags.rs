//! Tick flag distribution.
//!
//! Each quote update carries a flag saying which side moved: `2` bid only,
//! `4` ask only, `6` both. The mix within a window separates one-sided
//! pressure from symmetric re-quoting.

use crate::types::{Tick, FLAG_ASK, FLAG_BID, FLAG_BOTH};

/// Flag counts and shares for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlagDistribution {
    pub bid: usize,
    pub ask: usize,
    pub both: usize,
}

impl FlagDistribution {
    /// Count flags `2`, `4` and `6`. Other flag values are ignored.
    pub fn from_flags<I: IntoIterator<Item = i32>>(flags: I) -> Self {
        let mut dist = Self::default();
        for f in flags {
            match f {
                FLAG_BID => dist.bid += 1,
                FLAG_ASK => dist.ask += 1,
                FLAG_BOTH => dist.both += 1,
                _ => {}
            }
        }
        dist
    }

    pub fn from_ticks(ticks: &[Tick]) -> Self {
        Self::from_flags(ticks.iter().map(|t| t.flags))
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.bid + self.ask + self.both
    }

    /// `[bid share, ask share, total count]`.
    ///
    /// Shares are fractions of the combined count; both are `0.0` when no
    /// recognized flag was seen.
    pub fn one_hot(&self) -> [f64; 3] {
        let total = self.total();
        if total == 0 {
            return [0.0, 0.0, 0.0];
        }
        let t = total as f64;
        [self.bid as f64 / t, self.ask as f64 / t, t]
    }
}

/// One-hot flag feature over raw flag values.
pub fn one_hot(flags: &[i32]) -> [f64; 3] {
    FlagDistribution::from_flags(flags.iter().copied()).one_hot()
}
