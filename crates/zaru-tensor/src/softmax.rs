/// Numerically stable softmax with temperature `fac`: `exp(x_i/fac - max) / sum(exp(x_j/fac - max))`.
///
/// Subtracting the (scaled) max before exponentiating keeps this invariant under adding a
/// constant to every input, and avoids overflow for large inputs.
pub fn softmax(xs: &[f32], fac: f32) -> Vec<f32> {
    if xs.is_empty() {
        return Vec::new();
    }

    let scaled: Vec<f32> = xs.iter().map(|x| x / fac).collect();
    let max = scaled.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scaled.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn reference_scenario() {
        let result = softmax(&[1.0, 2.0, 3.0], 1.0);
        assert_relative_eq!(result[0], 0.0900, epsilon = 1e-3);
        assert_relative_eq!(result[1], 0.2447, epsilon = 1e-3);
        assert_relative_eq!(result[2], 0.6652, epsilon = 1e-3);
    }

    #[test]
    fn shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0], 1.0);
        let b = softmax(&[1001.0, 1002.0, 1003.0], 1.0);
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(x, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn sums_to_one() {
        let result = softmax(&[0.3, -5.0, 2.2, 7.0], 1.0);
        let sum: f32 = result.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(softmax(&[], 1.0).is_empty());
    }
}
