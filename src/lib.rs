//! Softmax forward kernel over a strided tensor axis, written once against a
//! small parallel-loop / reduce / map abstraction and run on CPU loops or a
//! Vulkan compute grid.
//!
//! ```
//! use mobula_op::softmax_loss_forward;
//!
//! let data = [1.0f32, 2.0, 3.0];
//! let mut probs = [0.0f32; 3];
//! softmax_loss_forward(&data, 3, 1, 1, &mut probs)?;
//! assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
//! # Ok::<(), mobula_op::KernelError>(())
//! ```

pub mod backend;
pub mod config;
pub mod cpu;
pub mod error;
pub mod kernel_loop;
pub mod layout;
pub mod map;
pub mod operator;
pub mod ops;
pub mod reduce;
pub mod shaders;
pub mod softmax;
pub mod strided;
#[cfg(feature = "vulkan")]
pub mod vk;

pub use backend::{Backend, SoftmaxForward};
pub use config::{Device, KernelConfig, Schedule};
pub use cpu::CpuBackend;
pub use error::{KernelError, Result};
pub use kernel_loop::{CpuLoop, GridLoop, KernelLoop, SerialLoop, ThreadLoop};
pub use layout::AxisLayout;
pub use operator::{Req, SoftmaxLoss};
pub use softmax::{softmax_forward_inplace, softmax_forward_kernel, softmax_loss_forward};
#[cfg(feature = "vulkan")]
pub use vk::VkBackend;
