//! Monotonic repair of forecast sequences
//!
//! Population figures are treated as structurally non-decreasing. Scanning in
//! ascending period order, any value below its (already repaired) predecessor
//! is replaced by the predecessor lifted by the uplift factor.

/// Uplift applied to the previous value when a decrease is found
pub const DEFAULT_UPLIFT: f64 = 1.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonotonicRepair {
    uplift: f64,
}

impl MonotonicRepair {
    pub fn new(uplift: f64) -> Self {
        Self { uplift }
    }

    pub fn uplift(&self) -> f64 {
        self.uplift
    }

    /// Repair `values` in place; returns how many values were replaced
    ///
    /// `values` must already be in ascending period order.
    pub fn apply(&self, values: &mut [f64]) -> usize {
        let mut repairs = 0;
        for i in 1..values.len() {
            let previous = values[i - 1];
            if values[i] < previous {
                values[i] = self.lift(previous);
                repairs += 1;
            }
        }
        repairs
    }

    /// Non-consuming variant of [`apply`](Self::apply)
    pub fn repaired(&self, values: &[f64]) -> Vec<f64> {
        let mut out = values.to_vec();
        self.apply(&mut out);
        out
    }

    fn lift(&self, previous: f64) -> f64 {
        if previous >= 0.0 {
            previous * self.uplift
        } else {
            // Scaling a negative value down would still be a decrease
            previous + previous.abs() * (self.uplift - 1.0)
        }
    }
}

impl Default for MonotonicRepair {
    fn default() -> Self {
        Self::new(DEFAULT_UPLIFT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_compares_against_repaired_predecessor() {
        let repaired = MonotonicRepair::default().repaired(&[100.0, 90.0, 95.0]);
        assert_eq!(repaired[0], 100.0);
        assert!((repaired[1] - 101.0).abs() < 1e-9);
        assert!((repaired[2] - 102.01).abs() < 1e-9);
    }

    #[test]
    fn test_increasing_sequence_untouched() {
        let mut values = vec![1.0, 2.0, 2.0, 3.5];
        assert_eq!(MonotonicRepair::default().apply(&mut values), 0);
        assert_eq!(values, vec![1.0, 2.0, 2.0, 3.5]);
    }

    #[test]
    fn test_strictly_decreasing_becomes_non_decreasing() {
        let mut values: Vec<f64> = (0..10).map(|i| 1000.0 - 50.0 * i as f64).collect();
        let repairs = MonotonicRepair::default().apply(&mut values);

        assert_eq!(repairs, 9);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_negative_values_still_non_decreasing() {
        let mut values = vec![-100.0, -200.0, -50.0];
        MonotonicRepair::default().apply(&mut values);
        assert!((values[1] - -99.0).abs() < 1e-9);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_custom_uplift() {
        let repaired = MonotonicRepair::new(1.0).repaired(&[10.0, 5.0]);
        assert_eq!(repaired, vec![10.0, 10.0]);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(MonotonicRepair::default().repaired(&[]).is_empty());
        assert_eq!(MonotonicRepair::default().repaired(&[7.0]), vec![7.0]);
    }
}
