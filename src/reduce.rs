// src/reduce.rs
use crate::strided::Strided;

/// Left fold of `op` over a strided view, seeded with element 0.
///
/// The fold order is fixed (`((x0 op x1) op x2) ...`), so floating-point sums
/// are reproducible for a given input.
pub fn reduce<T, F>(op: F, src: &Strided<'_, T>) -> T
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    // SAFETY: views are never empty, and k < len below.
    let mut acc = unsafe { src.read_unchecked(0) };
    for k in 1..src.len() {
        acc = op(acc, unsafe { src.read_unchecked(k) });
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn folds_left_to_right_over_strided_elements() {
        let buf = [3.0f32, 100.0, -1.0, 100.0, 7.0, 100.0];
        let view = Strided::new(&buf, 0, 2, 3).unwrap();
        assert_eq!(reduce(ops::max, &view), 7.0);
        assert_eq!(reduce(ops::plus, &view), 9.0);
        let order = reduce(|a: f32, b: f32| a * 10.0 + b, &view);
        assert_eq!(order, (3.0 * 10.0 - 1.0) * 10.0 + 7.0);
    }

    #[test]
    fn single_element_returns_seed() {
        let buf = [42.0f64];
        let view = Strided::new(&buf, 0, 5, 1).unwrap();
        assert_eq!(reduce(ops::plus, &view), 42.0);
    }
}
