//! Numeric helpers.

use std::cmp::Ordering;

/// An [`f32`] wrapper implementing a total order via [`f32::total_cmp`].
///
/// Useful as a sort or `max_by_key` key when the values are known not to be NaN (or when NaN
/// ordering at the extremes is acceptable).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalF32(pub f32);

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order() {
        let mut values = vec![TotalF32(1.5), TotalF32(-2.0), TotalF32(0.0)];
        values.sort();
        assert_eq!(values, [TotalF32(-2.0), TotalF32(0.0), TotalF32(1.5)]);
    }

    #[test]
    fn nan_sorts_last() {
        let mut values = vec![TotalF32(f32::NAN), TotalF32(7.0)];
        values.sort();
        assert_eq!(values[0].0, 7.0);
    }
}
