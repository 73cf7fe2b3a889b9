//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! alpha = 2 / (length + 1). Seed: EMA[0] = x[0].
//!
//! The first-value seed keeps every output causal from bar zero — there is
//! no warm-up window peeking ahead, and recomputing any prefix reproduces
//! the stored values exactly.

/// Compute the EMA of a raw f64 series.
///
/// Returns a vector the same length as the input. NaN inputs taint every
/// subsequent value (once NaN, always NaN), matching how a recursive filter
/// actually behaves on corrupt data.
pub fn ema_of_series(values: &[f64], length: usize) -> Vec<f64> {
    assert!(length >= 1, "EMA length must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if n == 0 {
        return result;
    }

    let alpha = 2.0 / (length as f64 + 1.0);

    let mut prev = values[0];
    result[0] = prev;
    for i in 1..n {
        if values[i].is_nan() || prev.is_nan() {
            // NaN propagates: subsequent values are tainted
            for val in result.iter_mut().skip(i) {
                *val = f64::NAN;
            }
            return result;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn ema_length_1_equals_input() {
        let result = ema_of_series(&[100.0, 200.0, 300.0], 1);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 2/(3+1) = 0.5, seed = 10
        // EMA[1] = 0.5*11 + 0.5*10 = 10.5
        // EMA[2] = 0.5*12 + 0.5*10.5 = 11.25
        // EMA[3] = 0.5*13 + 0.5*11.25 = 12.125
        let result = ema_of_series(&[10.0, 11.0, 12.0, 13.0], 3);
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 10.5, DEFAULT_EPSILON);
        assert_approx(result[2], 11.25, DEFAULT_EPSILON);
        assert_approx(result[3], 12.125, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_is_causal_prefix_stable() {
        // Recomputing on any prefix reproduces the stored values exactly.
        let values = [10.0, 12.0, 9.0, 14.0, 13.0, 11.0, 15.0];
        let full = ema_of_series(&values, 4);
        for cut in 1..=values.len() {
            let prefix = ema_of_series(&values[..cut], 4);
            for i in 0..cut {
                assert_eq!(full[i], prefix[i], "divergence at i={i} cut={cut}");
            }
        }
    }

    #[test]
    fn ema_nan_propagates() {
        let result = ema_of_series(&[10.0, f64::NAN, 12.0, 13.0], 3);
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
    }

    #[test]
    fn ema_empty_input() {
        assert!(ema_of_series(&[], 5).is_empty());
    }

    #[test]
    #[should_panic(expected = "EMA length must be >= 1")]
    fn ema_zero_length_panics() {
        ema_of_series(&[1.0], 0);
    }
}
