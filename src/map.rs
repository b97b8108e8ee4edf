// src/map.rs
use crate::strided::{Strided, StridedMut};

/// `dst[k] = f(src[k])` for every `k`.
///
/// Each element is read before the matching write, so `src` and `dst` may
/// address the same memory.
///
/// # Panics
///
/// Panics if the views differ in length.
pub fn map_into<T, F>(f: F, src: &Strided<'_, T>, dst: &mut StridedMut<'_, T>)
where
    T: Copy,
    F: Fn(T) -> T,
{
    assert_eq!(src.len(), dst.len(), "map_into: source and destination lengths differ");
    for k in 0..src.len() {
        // SAFETY: k < len of both views.
        unsafe {
            let v = src.read_unchecked(k);
            dst.write_unchecked(k, f(v));
        }
    }
}

/// `buf[k] = f(buf[k])` for every `k`.
pub fn map_in_place<T, F>(f: F, buf: &mut StridedMut<'_, T>)
where
    T: Copy,
    F: Fn(T) -> T,
{
    for k in 0..buf.len() {
        // SAFETY: k < len.
        unsafe {
            let v = buf.read_unchecked(k);
            buf.write_unchecked(k, f(v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn map_into_writes_matching_strided_slots() {
        let src = [1.0f32, 2.0, 3.0, 4.0];
        let mut dst = [0.0f32; 4];
        let s = Strided::new(&src, 1, 2, 2).unwrap();
        let mut d = StridedMut::new(&mut dst, 0, 2, 2).unwrap();
        map_into(|x| x * 10.0, &s, &mut d);
        assert_eq!(dst, [20.0, 0.0, 40.0, 0.0]);
    }

    #[test]
    fn map_in_place_overwrites() {
        let mut buf = [2.0f64, 4.0, 8.0];
        let mut view = StridedMut::new(&mut buf, 0, 1, 3).unwrap();
        map_in_place(ops::divide_by(2.0), &mut view);
        assert_eq!(buf, [1.0, 2.0, 4.0]);
    }

    #[test]
    #[should_panic(expected = "lengths differ")]
    fn mismatched_lengths_panic() {
        let src = [1.0f32; 3];
        let mut dst = [0.0f32; 2];
        let s = Strided::new(&src, 0, 1, 3).unwrap();
        let mut d = StridedMut::new(&mut dst, 0, 1, 2).unwrap();
        map_into(|x| x, &s, &mut d);
    }
}
