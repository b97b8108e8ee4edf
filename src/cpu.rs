// src/cpu.rs
use num_traits::Float;

use crate::backend::SoftmaxForward;
use crate::error::Result;
use crate::kernel_loop::{CpuLoop, KernelLoop};
use crate::layout::AxisLayout;
use crate::softmax::{softmax_forward_inplace, softmax_forward_kernel};

/// Host backend; `L` decides how work units are spread over threads.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend<L = CpuLoop> {
    launcher: L,
}

impl<L: KernelLoop> CpuBackend<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}

impl<T, L> SoftmaxForward<T> for CpuBackend<L>
where
    T: Float + Send + Sync,
    L: KernelLoop,
{
    fn softmax_forward(&mut self, data: &[T], layout: AxisLayout, probs: &mut [T]) -> Result<()> {
        softmax_forward_kernel(&self.launcher, data, layout, probs)
    }

    fn softmax_forward_inplace(&mut self, x: &mut [T], layout: AxisLayout) -> Result<()> {
        softmax_forward_inplace(&self.launcher, x, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_loop::{GridLoop, SerialLoop, ThreadLoop};

    fn run<L: KernelLoop>(launcher: L, data: &[f32], layout: AxisLayout) -> Vec<f32> {
        let mut bk = CpuBackend::new(launcher);
        let mut probs = vec![0.0; data.len()];
        bk.softmax_forward(data, layout, &mut probs).unwrap();
        probs
    }

    #[test]
    fn schedules_agree_bit_for_bit() {
        let layout = AxisLayout::new(5, 7, 9).unwrap();
        let data: Vec<f32> = (0..layout.len()).map(|i| ((i * 37) % 23) as f32 - 11.0).collect();
        let serial = run(SerialLoop, &data, layout);
        assert_eq!(run(ThreadLoop::new(), &data, layout), serial);
        assert_eq!(run(GridLoop::new(3), &data, layout), serial);
    }

    #[test]
    fn softmax_rows_uses_last_axis() {
        let mut bk = CpuBackend::new(SerialLoop);
        let mut x = vec![0.0f32, 0.0, 10.0, 10.0];
        bk.softmax_rows(2, 2, &mut x[..]).unwrap();
        assert_eq!(x, vec![0.5, 0.5, 0.5, 0.5]);
    }
}
