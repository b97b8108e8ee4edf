// src/operator.rs
//! Operator-level wrapper: shape inference plus the host framework's output
//! request modes.

use num_traits::Float;

use crate::backend::SoftmaxForward;
use crate::error::{KernelError, Result};
use crate::layout::{normalize_axis, AxisLayout};

/// How an operator output is combined with what the buffer already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Req {
    /// Leave the output untouched.
    Null,
    #[default]
    WriteTo,
    /// Output shares storage with the input; see [`SoftmaxLoss::forward_inplace`].
    WriteInplace,
    /// Accumulate into the output.
    AddTo,
}

/// Softmax along `axis`, producing per-class probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftmaxLoss {
    pub axis: isize,
}

impl Default for SoftmaxLoss {
    fn default() -> Self {
        Self { axis: -1 }
    }
}

impl SoftmaxLoss {
    pub fn new(axis: isize) -> Self {
        Self { axis }
    }

    /// Output shape for an input of `in_shape`: identical, once the axis is
    /// known to be valid.
    pub fn infer_shape(&self, in_shape: &[usize]) -> Result<Vec<usize>> {
        normalize_axis(in_shape.len(), self.axis)?;
        Ok(in_shape.to_vec())
    }

    pub fn layout(&self, shape: &[usize]) -> Result<AxisLayout> {
        AxisLayout::from_shape(shape, self.axis)
    }

    /// Runs the forward pass of `x` (shaped `shape`) into `y` under `req`.
    pub fn forward<T, B>(&self, backend: &mut B, x: &[T], shape: &[usize], y: &mut [T], req: Req) -> Result<()>
    where
        T: Float,
        B: SoftmaxForward<T>,
    {
        let layout = self.layout(shape)?;
        if x.len() != layout.len() || y.len() != layout.len() {
            return Err(KernelError::invalid(format!(
                "shape {shape:?} needs {} elements, got x={} y={}",
                layout.len(),
                x.len(),
                y.len()
            )));
        }
        match req {
            Req::Null => Ok(()),
            Req::WriteTo | Req::WriteInplace => backend.softmax_forward(x, layout, y),
            Req::AddTo => {
                let mut probs = vec![T::zero(); layout.len()];
                backend.softmax_forward(x, layout, &mut probs)?;
                for (out, p) in y.iter_mut().zip(probs) {
                    *out = *out + p;
                }
                Ok(())
            }
        }
    }

    /// Forward pass overwriting `x`.
    pub fn forward_inplace<T, B>(&self, backend: &mut B, x: &mut [T], shape: &[usize]) -> Result<()>
    where
        T: Float,
        B: SoftmaxForward<T>,
    {
        let layout = self.layout(shape)?;
        if x.len() != layout.len() {
            return Err(KernelError::invalid(format!(
                "shape {shape:?} needs {} elements, got {}",
                layout.len(),
                x.len()
            )));
        }
        backend.softmax_forward_inplace(x, layout)
    }
}
