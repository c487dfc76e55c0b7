//! Modulo counter continuity tracking.
//!
//! VRL frames carry a 12-bit counter and VRT packets a 4-bit one. Both are
//! checked the same way: the first value seen seeds the tracker, and after
//! that each value must be one more than the last, wrapping at the modulus.

/// Result of observing one counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First value since creation or reset. Nothing to compare against.
    First,
    /// The value followed the previous one.
    InOrder,
    /// One or more values were skipped.
    Gap {
        /// Value that should have arrived.
        expected: u16,
        /// Value that did arrive.
        observed: u16,
        /// How many values are missing in between, modulo the counter range.
        missing: u16,
    },
}

/// Tracks a wrapping counter and reports gaps.
#[derive(Debug, Clone)]
pub struct CounterTracker {
    modulus: u16,
    last: Option<u16>,
}

impl CounterTracker {
    /// Create a tracker for a counter that wraps at `modulus`.
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is zero.
    pub fn new(modulus: u16) -> Self {
        assert!(modulus > 0, "counter modulus must be non-zero");
        CounterTracker {
            modulus,
            last: None,
        }
    }

    /// Record `value` and compare it with the previous one.
    pub fn observe(&mut self, value: u16) -> Continuity {
        let value = value % self.modulus;
        let result = match self.last {
            None => Continuity::First,
            Some(last) => {
                let expected = (last + 1) % self.modulus;
                if value == expected {
                    Continuity::InOrder
                } else {
                    Continuity::Gap {
                        expected,
                        observed: value,
                        missing: (value + self.modulus - expected) % self.modulus,
                    }
                }
            }
        };
        self.last = Some(value);
        result
    }

    /// The last value observed, if any.
    pub fn last(&self) -> Option<u16> {
        self.last
    }

    /// Forget the last value so the next observation seeds again.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaps(modulus: u16, values: &[u16]) -> Vec<Continuity> {
        let mut tracker = CounterTracker::new(modulus);
        values
            .iter()
            .map(|v| tracker.observe(*v))
            .filter(|c| matches!(c, Continuity::Gap { .. }))
            .collect()
    }

    #[test]
    fn first_value_seeds() {
        let mut t = CounterTracker::new(16);
        assert_eq!(t.observe(9), Continuity::First);
        assert_eq!(t.observe(10), Continuity::InOrder);
        assert_eq!(t.last(), Some(10));
    }

    #[test]
    fn single_gap_reported_once() {
        let found = gaps(16, &[0, 1, 2, 4, 5]);
        assert_eq!(
            found,
            vec![Continuity::Gap {
                expected: 3,
                observed: 4,
                missing: 1
            }]
        );
    }

    #[test]
    fn wrap_is_not_a_gap() {
        assert!(gaps(16, &[13, 14, 15, 0, 1, 2]).is_empty());
        assert!(gaps(4096, &[4094, 4095, 0, 1]).is_empty());
    }

    #[test]
    fn gap_across_wrap() {
        let found = gaps(16, &[14, 2]);
        assert_eq!(
            found,
            vec![Continuity::Gap {
                expected: 15,
                observed: 2,
                missing: 3
            }]
        );
    }

    #[test]
    fn reset_reseeds() {
        let mut t = CounterTracker::new(16);
        t.observe(3);
        t.reset();
        assert_eq!(t.last(), None);
        assert_eq!(t.observe(11), Continuity::First);
    }

    #[test]
    fn values_are_reduced_by_modulus() {
        let mut t = CounterTracker::new(16);
        t.observe(15);
        assert_eq!(t.observe(16), Continuity::InOrder);
    }
}
