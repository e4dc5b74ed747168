//! Numeric helpers.

use std::cmp::Ordering;

/// Wraps an `f32` to give it a total order, so it can be used as a sort/max key.
///
/// `f32` only implements `PartialOrd` because of `NaN`. Values produced by this crate's
/// inference and detection code are never `NaN` in practice, so this wrapper treats `NaN` as
/// greater than every other value rather than panicking.
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
        self.0.partial_cmp(&other.0).unwrap_or_else(|| {
            // Treat NaN as the largest possible value so it sorts to the end instead of
            // panicking or silently corrupting the sort order.
            if self.0.is_nan() && other.0.is_nan() {
                Ordering::Equal
            } else if self.0.is_nan() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        })
    }
}

/// Numerically stable logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_f32_orders_like_f32() {
        let mut v = vec![TotalF32(0.9), TotalF32(0.1), TotalF32(0.9), TotalF32(0.2)];
        v.sort();
        assert_eq!(v.iter().map(|f| f.0).collect::<Vec<_>>(), [0.1, 0.2, 0.9, 0.9]);
    }

    #[test]
    fn sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(50.0) > 0.999);
        assert!(sigmoid(-50.0) < 0.001);
    }
}
