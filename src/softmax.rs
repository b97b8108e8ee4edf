// src/softmax.rs
//! Softmax forward over the middle axis of `[outer_size, num_classes, inner_size]`.
//!
//! Each work unit walks its own strided slice through four steps:
//!
//! 1. `max_val = reduce(max, data_i)`
//! 2. `probs_i = exp(data_i - max_val)`
//! 3. `sum_val = reduce(plus, probs_i)`
//! 4. `probs_i /= sum_val`
//!
//! No clamping: an overflowing or NaN input propagates through IEEE
//! arithmetic into the output.

use num_traits::Float;
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::kernel_loop::{CpuLoop, KernelLoop};
use crate::layout::AxisLayout;
use crate::map::{map_in_place, map_into};
use crate::ops;
use crate::reduce::reduce;
use crate::strided::{SharedBuf, SharedBufMut};

/// Softmax of `data` along the layout's middle axis, written to `probs`.
pub fn softmax_forward_kernel<T, L>(
    launcher: &L,
    data: &[T],
    layout: AxisLayout,
    probs: &mut [T],
) -> Result<()>
where
    T: Float + Send + Sync,
    L: KernelLoop,
{
    check_len("data", data.len(), layout)?;
    check_len("probs", probs.len(), layout)?;
    let probs = SharedBufMut::new(probs);
    launch(launcher, SharedBuf::new(data), probs, layout);
    Ok(())
}

/// Softmax of `buf` along the layout's middle axis, overwriting `buf`.
pub fn softmax_forward_inplace<T, L>(launcher: &L, buf: &mut [T], layout: AxisLayout) -> Result<()>
where
    T: Float + Send + Sync,
    L: KernelLoop,
{
    check_len("buf", buf.len(), layout)?;
    let probs = SharedBufMut::new(buf);
    launch(launcher, probs.as_shared(), probs, layout);
    Ok(())
}

/// Softmax forward over raw shape arguments on the default CPU loop.
pub fn softmax_loss_forward<T>(
    data: &[T],
    num_classes: usize,
    outer_size: usize,
    inner_size: usize,
    probs: &mut [T],
) -> Result<()>
where
    T: Float + Send + Sync,
{
    let layout = AxisLayout::new(outer_size, num_classes, inner_size)?;
    softmax_forward_kernel(&CpuLoop::default(), data, layout, probs)
}

pub(crate) fn check_len(name: &'static str, actual: usize, layout: AxisLayout) -> Result<()> {
    let expected = layout.len();
    if actual < expected {
        return Err(KernelError::BufferTooSmall { name, expected, actual });
    }
    Ok(())
}

fn launch<T, L>(launcher: &L, data: SharedBuf<'_, T>, probs: SharedBufMut<'_, T>, layout: AxisLayout)
where
    T: Float + Send + Sync,
    L: KernelLoop,
{
    let nthreads = layout.num_work_units();
    debug!(
        outer = layout.outer_size(),
        classes = layout.num_classes(),
        inner = layout.inner_size(),
        nthreads,
        schedule = launcher.name(),
        "softmax forward"
    );
    let (num_classes, inner_size) = (layout.num_classes(), layout.inner_size());
    launcher.launch(nthreads, move |index| {
        let j = layout.axis_offset(index);
        // SAFETY: `AxisLayout` guarantees `num_classes >= 1` and a
        // non-overflowing `len()`. Both buffers hold at least `layout.len()`
        // elements, so
        // `j + (num_classes - 1) * inner_size` is in bounds for every index
        // below `nthreads`. Distinct indices address disjoint slices, and when
        // `data` aliases `probs` each element is read before it is written.
        let data_i = unsafe { data.axis(j, inner_size, num_classes) };
        let mut probs_i = unsafe { probs.axis_mut(j, inner_size, num_classes) };

        let max_val = reduce(ops::max, &data_i);
        map_into(ops::shifted_exp(max_val), &data_i, &mut probs_i);
        let sum_val = reduce(ops::plus, &probs_i.as_strided());
        map_in_place(ops::divide_by(sum_val), &mut probs_i);
    });
}
