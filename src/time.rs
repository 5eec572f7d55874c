//! Data types for scheduling and for real time.

use core::fmt;
use std::time::{Duration, Instant};

/// An at-most-once-per-period gate for work which is scheduled frequently but should
/// run rarely, such as the spatial broadcaster's index refresh.
///
/// The period elapses from the *start* of the last permitted run; a `RateLimit` does
/// not try to compensate for missed or late runs.
#[derive(Clone, Debug)]
pub struct RateLimit {
    period: Duration,
    last: Option<Instant>,
}

impl RateLimit {
    /// Constructs a [`RateLimit`] which will permit its first run immediately.
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Returns whether a run is permitted at time `now`, and if so, records it.
    ///
    /// The first call is always permitted.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Summary of the work done by a set of scheduled runs.
///
/// It may be created by [`StepStats::default()`] (empty), or [`StepStats::one()`]
/// (single run), and multiple runs may be aggregated using the `+=` operator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct StepStats {
    /// The number of runs aggregated into this [`StepStats`].
    pub count: usize,
    /// The sum of the durations of all runs.
    pub sum: Duration,
    /// The maximum duration of all runs, or [`Duration::ZERO`] if there were no runs.
    pub max: Duration,
}

impl StepStats {
    /// Constructs a [`StepStats`] for a single run.
    #[inline]
    pub const fn one(duration: Duration) -> Self {
        Self {
            count: 1,
            sum: duration,
            max: duration,
        }
    }
}

impl core::ops::AddAssign for StepStats {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = StepStats {
            count: self.count + rhs.count,
            sum: self.sum + rhs.sum,
            max: self.max.max(rhs.max),
        };
    }
}

impl fmt::Display for StepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { count, sum, max } = self;
        write!(f, "{count} runs, total {sum:?}, max {max:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_first_run_is_free() {
        let mut limit = RateLimit::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limit.ready(t0));
        assert!(!limit.ready(t0));
    }

    #[test]
    fn rate_limit_period_elapses() {
        let mut limit = RateLimit::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limit.ready(t0));
        assert!(!limit.ready(t0 + Duration::from_secs(9)));
        assert!(limit.ready(t0 + Duration::from_secs(10)));
        // The next period is measured from the run that was permitted.
        assert!(!limit.ready(t0 + Duration::from_secs(19)));
        assert!(limit.ready(t0 + Duration::from_secs(20)));
    }

    #[test]
    fn step_stats_aggregation() {
        let mut stats = StepStats::default();
        stats += StepStats::one(Duration::from_millis(2));
        stats += StepStats::one(Duration::from_millis(5));
        assert_eq!(
            stats,
            StepStats {
                count: 2,
                sum: Duration::from_millis(7),
                max: Duration::from_millis(5),
            }
        );
    }
}
