// src/backend.rs
use tracing::info;

use crate::config::{Device, KernelConfig};
use crate::cpu::CpuBackend;
use crate::error::{KernelError, Result};
use crate::kernel_loop::CpuLoop;
use crate::layout::AxisLayout;
#[cfg(feature = "vulkan")]
use crate::vk::VkBackend;

/// Softmax forward along the middle axis of an [`AxisLayout`].
pub trait SoftmaxForward<T> {
    fn softmax_forward(&mut self, data: &[T], layout: AxisLayout, probs: &mut [T]) -> Result<()>;

    fn softmax_forward_inplace(&mut self, x: &mut [T], layout: AxisLayout) -> Result<()>;

    /// Row-wise softmax of a `[rows, cols]` matrix, in place.
    fn softmax_rows(&mut self, rows: usize, cols: usize, x: &mut [T]) -> Result<()> {
        self.softmax_forward_inplace(x, AxisLayout::new(rows, cols, 1)?)
    }
}

/// Backend chosen at startup from [`KernelConfig`].
pub enum Backend {
    Cpu(CpuBackend<CpuLoop>),
    #[cfg(feature = "vulkan")]
    Vk(VkBackend),
}

impl Backend {
    pub fn from_config(cfg: &KernelConfig) -> Result<Self> {
        match cfg.device {
            Device::Cpu => {
                let lp = CpuLoop::from_schedule(cfg.schedule, cfg.num_threads, cfg.block_dim)?;
                info!(schedule = %cfg.schedule, "using cpu backend");
                Ok(Backend::Cpu(CpuBackend::new(lp)))
            }
            #[cfg(feature = "vulkan")]
            Device::Vulkan => Ok(Backend::Vk(VkBackend::new()?)),
            #[cfg(not(feature = "vulkan"))]
            Device::Vulkan => Err(KernelError::Unsupported {
                backend: "vulkan",
                what: "this build (enable the `vulkan` feature)".into(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cpu(_) => "cpu",
            #[cfg(feature = "vulkan")]
            Backend::Vk(_) => "vulkan",
        }
    }
}

impl SoftmaxForward<f32> for Backend {
    fn softmax_forward(&mut self, data: &[f32], layout: AxisLayout, probs: &mut [f32]) -> Result<()> {
        match self {
            Backend::Cpu(bk) => bk.softmax_forward(data, layout, probs),
            #[cfg(feature = "vulkan")]
            Backend::Vk(bk) => bk.softmax_forward(data, layout, probs),
        }
    }

    fn softmax_forward_inplace(&mut self, x: &mut [f32], layout: AxisLayout) -> Result<()> {
        match self {
            Backend::Cpu(bk) => bk.softmax_forward_inplace(x, layout),
            #[cfg(feature = "vulkan")]
            Backend::Vk(bk) => bk.softmax_forward_inplace(x, layout),
        }
    }
}

impl SoftmaxForward<f64> for Backend {
    fn softmax_forward(&mut self, data: &[f64], layout: AxisLayout, probs: &mut [f64]) -> Result<()> {
        match self {
            Backend::Cpu(bk) => bk.softmax_forward(data, layout, probs),
            #[cfg(feature = "vulkan")]
            Backend::Vk(_) => Err(f64_unsupported()),
        }
    }

    fn softmax_forward_inplace(&mut self, x: &mut [f64], layout: AxisLayout) -> Result<()> {
        match self {
            Backend::Cpu(bk) => bk.softmax_forward_inplace(x, layout),
            #[cfg(feature = "vulkan")]
            Backend::Vk(_) => Err(f64_unsupported()),
        }
    }
}

#[cfg(feature = "vulkan")]
fn f64_unsupported() -> KernelError {
    KernelError::Unsupported { backend: "vulkan", what: "f64 softmax".into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Schedule;

    #[test]
    fn cpu_config_builds_cpu_backend() {
        let cfg = KernelConfig { schedule: Schedule::Grid, block_dim: 8, ..Default::default() };
        let mut bk = Backend::from_config(&cfg).unwrap();
        assert_eq!(bk.name(), "cpu");

        let mut x = vec![1.0f64, 2.0, 3.0, 3.0, 3.0, 3.0];
        bk.softmax_rows(2, 3, &mut x[..]).unwrap();
        for p in &x[3..] {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
        assert!((x[..3].iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[cfg(not(feature = "vulkan"))]
    #[test]
    fn vulkan_without_feature_is_unsupported() {
        let cfg = KernelConfig { device: Device::Vulkan, ..Default::default() };
        assert!(matches!(
            Backend::from_config(&cfg),
            Err(KernelError::Unsupported { backend: "vulkan", .. })
        ));
    }
}
