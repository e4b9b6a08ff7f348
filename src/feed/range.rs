//! Rolling high/low range over a time window

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Rolling realized range estimator
#[derive(Debug, Clone)]
pub struct RangeTracker {
    /// Window duration
    window: Duration,
    /// Price history with timestamps
    prices: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl RangeTracker {
    /// Create a tracker with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            prices: VecDeque::new(),
        }
    }

    /// Add a price observation and drop those outside the window
    pub fn update(&mut self, timestamp: DateTime<Utc>, price: Decimal) {
        self.prices.push_back((timestamp, price));

        let cutoff = timestamp - self.window;
        while let Some((ts, _)) = self.prices.front() {
            if *ts < cutoff {
                self.prices.pop_front();
            } else {
                break;
            }
        }
    }

    /// (low, high) over the window
    pub fn bounds(&self) -> Option<(Decimal, Decimal)> {
        let mut iter = self.prices.iter().map(|(_, p)| *p);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }

    /// (high - low) / latest price, once at least two observations exist
    pub fn range_pct(&self) -> Option<Decimal> {
        if self.prices.len() < 2 {
            return None;
        }
        let (low, high) = self.bounds()?;
        let (_, last) = self.prices.back()?;
        if last.is_zero() {
            return None;
        }
        Some((high - low) / last)
    }

    /// Number of observations in the window
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_range_needs_two_points() {
        let mut tracker = RangeTracker::new(Duration::minutes(5));
        assert!(tracker.range_pct().is_none());

        tracker.update(Utc::now(), dec!(100));
        assert!(tracker.range_pct().is_none());
        assert_eq!(tracker.bounds(), Some((dec!(100), dec!(100))));
    }

    #[test]
    fn test_range_pct() {
        let mut tracker = RangeTracker::new(Duration::minutes(5));
        let now = Utc::now();
        tracker.update(now, dec!(100));
        tracker.update(now + Duration::seconds(1), dec!(104));
        tracker.update(now + Duration::seconds(2), dec!(98));
        tracker.update(now + Duration::seconds(3), dec!(100));

        assert_eq!(tracker.bounds(), Some((dec!(98), dec!(104))));
        assert_eq!(tracker.range_pct(), Some(dec!(0.06)));
    }

    #[test]
    fn test_window_pruning() {
        let mut tracker = RangeTracker::new(Duration::seconds(10));
        let start = Utc::now();
        tracker.update(start, dec!(50));
        tracker.update(start + Duration::seconds(5), dec!(100));
        tracker.update(start + Duration::seconds(20), dec!(101));

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.bounds(), Some((dec!(101), dec!(101))));
    }
}
