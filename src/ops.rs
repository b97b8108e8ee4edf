// src/ops.rs
//! Named operators passed into [`reduce`](crate::reduce::reduce) and the map
//! primitives.

use num_traits::Float;

/// Larger of `a` and `b`; NaN if either side is NaN.
pub fn max<T: Float>(a: T, b: T) -> T {
    if a.is_nan() || b.is_nan() {
        T::nan()
    } else if b > a {
        b
    } else {
        a
    }
}

pub fn plus<T: Float>(a: T, b: T) -> T {
    a + b
}

/// `x -> exp(x - max_val)`.
pub fn shifted_exp<T: Float>(max_val: T) -> impl Fn(T) -> T {
    move |x| (x - max_val).exp()
}

/// `x -> x / sum_val`.
pub fn divide_by<T: Float>(sum_val: T) -> impl Fn(T) -> T {
    move |x| x / sum_val
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_picks_larger_and_keeps_nan() {
        assert_eq!(max(1.0f32, 2.0), 2.0);
        assert_eq!(max(2.0f32, 1.0), 2.0);
        assert!(max(f32::NAN, 1.0).is_nan());
        assert!(max(1.0f32, f32::NAN).is_nan());
        assert_eq!(max(f64::NEG_INFINITY, -3.0), -3.0);
    }

    #[test]
    fn shifted_exp_is_one_at_max() {
        let f = shifted_exp(5.0f64);
        assert_eq!(f(5.0), 1.0);
        assert!((f(4.0) - (-1.0f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn divide_by_scales() {
        assert_eq!(divide_by(4.0f32)(2.0), 0.5);
    }
}
