// src/strided.rs
//! Strided views along one axis of a flat buffer.
//!
//! A view covers `count` elements starting at `base`, spaced `stride` apart:
//! element `k` lives at `base + k * stride`. Read and write views share the
//! addressing formula.
//!
//! The safe constructors bounds-check once against the backing slice. The
//! kernel instead carves views out of [`SharedBuf`] / [`SharedBufMut`], which
//! hand the same buffer to every work unit; the layout guarantees those views
//! never overlap across work units.

use std::marker::PhantomData;

use crate::error::{KernelError, Result};

fn check_bounds(len: usize, base: usize, stride: usize, count: usize) -> Result<()> {
    if count == 0 {
        return Err(KernelError::invalid("strided view must cover at least one element"));
    }
    let last = (count - 1)
        .checked_mul(stride)
        .and_then(|off| off.checked_add(base))
        .ok_or_else(|| KernelError::invalid("strided view end overflows usize"))?;
    if last >= len {
        return Err(KernelError::BufferTooSmall {
            name: "strided view",
            expected: last.saturating_add(1),
            actual: len,
        });
    }
    Ok(())
}

/// Read-only strided view.
#[derive(Clone, Copy)]
pub struct Strided<'a, T> {
    ptr: *const T,
    stride: usize,
    count: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<'a, T: Copy> Strided<'a, T> {
    pub fn new(slice: &'a [T], base: usize, stride: usize, count: usize) -> Result<Self> {
        check_bounds(slice.len(), base, stride, count)?;
        // SAFETY: bounds checked above.
        Ok(unsafe { Self::from_raw_parts(slice.as_ptr().add(base), stride, count) })
    }

    /// # Safety
    ///
    /// `ptr.add(k * stride)` must be valid for reads for every `k < count`
    /// during `'a`, and `count` must be non-zero.
    pub(crate) unsafe fn from_raw_parts(ptr: *const T, stride: usize, count: usize) -> Self {
        debug_assert!(count > 0);
        Self { ptr, stride, count, _marker: PhantomData }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Always `false`: views cover at least one element.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn get(&self, k: usize) -> Option<T> {
        // SAFETY: k < count.
        (k < self.count).then(|| unsafe { self.read_unchecked(k) })
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        // SAFETY: k ranges over 0..count.
        (0..self.count).map(move |k| unsafe { self.read_unchecked(k) })
    }

    /// # Safety
    ///
    /// `k < self.len()`.
    pub(crate) unsafe fn read_unchecked(&self, k: usize) -> T {
        self.ptr.add(k * self.stride).read()
    }
}

/// Writable strided view.
pub struct StridedMut<'a, T> {
    ptr: *mut T,
    stride: usize,
    count: usize,
    _marker: PhantomData<&'a mut [T]>,
}

impl<'a, T: Copy> StridedMut<'a, T> {
    pub fn new(slice: &'a mut [T], base: usize, stride: usize, count: usize) -> Result<Self> {
        check_bounds(slice.len(), base, stride, count)?;
        // SAFETY: bounds checked above.
        Ok(unsafe { Self::from_raw_parts(slice.as_mut_ptr().add(base), stride, count) })
    }

    /// # Safety
    ///
    /// `ptr.add(k * stride)` must be valid for reads and writes for every
    /// `k < count` during `'a`, no other live view may write those elements,
    /// and `count` must be non-zero.
    pub(crate) unsafe fn from_raw_parts(ptr: *mut T, stride: usize, count: usize) -> Self {
        debug_assert!(count > 0);
        Self { ptr, stride, count, _marker: PhantomData }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Always `false`: views cover at least one element.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, k: usize) -> Option<T> {
        // SAFETY: k < count.
        (k < self.count).then(|| unsafe { self.read_unchecked(k) })
    }

    /// Overwrites element `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k >= self.len()`.
    pub fn set(&mut self, k: usize, value: T) {
        assert!(k < self.count, "index {k} out of range for strided view of length {}", self.count);
        // SAFETY: k < count.
        unsafe { self.write_unchecked(k, value) }
    }

    /// Read-only view of the same elements.
    pub fn as_strided(&self) -> Strided<'_, T> {
        // SAFETY: same elements, shared borrow of self for the view's lifetime.
        unsafe { Strided::from_raw_parts(self.ptr, self.stride, self.count) }
    }

    pub(crate) unsafe fn read_unchecked(&self, k: usize) -> T {
        self.ptr.add(k * self.stride).read()
    }

    pub(crate) unsafe fn write_unchecked(&mut self, k: usize, value: T) {
        self.ptr.add(k * self.stride).write(value)
    }
}

/// Read-only buffer shared by every work unit of a launch.
#[derive(Clone, Copy)]
pub(crate) struct SharedBuf<'a, T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

// SAFETY: only hands out read views of `T: Sync` data.
unsafe impl<T: Sync> Send for SharedBuf<'_, T> {}
unsafe impl<T: Sync> Sync for SharedBuf<'_, T> {}

impl<'a, T: Copy> SharedBuf<'a, T> {
    pub(crate) fn new(slice: &'a [T]) -> Self {
        Self { ptr: slice.as_ptr(), len: slice.len(), _marker: PhantomData }
    }

    /// # Safety
    ///
    /// `base + (count - 1) * stride < len`, `count > 0`, and no write to
    /// these elements may race with reads through the returned view.
    pub(crate) unsafe fn axis(&self, base: usize, stride: usize, count: usize) -> Strided<'a, T> {
        debug_assert!(base + (count - 1) * stride < self.len);
        Strided::from_raw_parts(self.ptr.add(base), stride, count)
    }
}

/// Mutable buffer partitioned across the work units of a launch.
#[derive(Clone, Copy)]
pub(crate) struct SharedBufMut<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

// SAFETY: each work unit touches a disjoint strided slice; see `axis_mut`.
unsafe impl<T: Send> Send for SharedBufMut<'_, T> {}
unsafe impl<T: Send> Sync for SharedBufMut<'_, T> {}

impl<'a, T: Copy> SharedBufMut<'a, T> {
    pub(crate) fn new(slice: &'a mut [T]) -> Self {
        Self { ptr: slice.as_mut_ptr(), len: slice.len(), _marker: PhantomData }
    }

    /// Read access to the same buffer, for in-place launches.
    pub(crate) fn as_shared(&self) -> SharedBuf<'a, T> {
        SharedBuf { ptr: self.ptr, len: self.len, _marker: PhantomData }
    }

    /// # Safety
    ///
    /// `base + (count - 1) * stride < len`, `count > 0`, and the addressed
    /// elements must not be accessed through any other view while the
    /// returned one is live, except by reads that precede each write in
    /// program order on the same thread.
    pub(crate) unsafe fn axis_mut(
        &self,
        base: usize,
        stride: usize,
        count: usize,
    ) -> StridedMut<'a, T> {
        debug_assert!(base + (count - 1) * stride < self.len);
        StridedMut::from_raw_parts(self.ptr.add(base), stride, count)
    }
}
