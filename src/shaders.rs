// src/shaders.rs
//! WGSL source for the GPU softmax kernel and its SPIR-V compilation.
//!
//! One invocation runs one `(outer, inner)` work unit through the same four
//! steps as the CPU body. The grid is two-dimensional so launches beyond the
//! per-dimension workgroup limit still cover every index; invocations past
//! `nthreads` return immediately.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::{KernelError, Result};

/// Invocations per workgroup; must match `@workgroup_size` below.
pub const SOFTMAX_WORKGROUP_SIZE: u32 = 64;

/// Entry point name in [`SOFTMAX_WGSL`].
pub const SOFTMAX_ENTRY_POINT: &str = "softmax_forward";

/// Push constant block layout: `nthreads, num_classes, inner_size, grid_width`.
pub const SOFTMAX_WGSL: &str = r"
struct Params {
    nthreads: u32,
    num_classes: u32,
    inner_size: u32,
    grid_width: u32,
}

@group(0) @binding(0) var<storage, read> data: array<f32>;
@group(0) @binding(1) var<storage, read_write> probs: array<f32>;
var<push_constant> params: Params;

@compute @workgroup_size(64, 1, 1)
fn softmax_forward(@builtin(global_invocation_id) gid: vec3<u32>) {
    let index = gid.y * params.grid_width + gid.x;
    if index >= params.nthreads {
        return;
    }
    let stride = params.inner_size;
    let outer = index / stride;
    let inner = index % stride;
    let j = outer * params.num_classes * stride + inner;

    // `max` may drop a NaN operand; the NaN element still poisons `sum_val`.
    var max_val: f32 = data[j];
    for (var k: u32 = 1u; k < params.num_classes; k = k + 1u) {
        max_val = max(max_val, data[j + k * stride]);
    }
    for (var k: u32 = 0u; k < params.num_classes; k = k + 1u) {
        let pos = j + k * stride;
        probs[pos] = exp(data[pos] - max_val);
    }
    var sum_val: f32 = probs[j];
    for (var k: u32 = 1u; k < params.num_classes; k = k + 1u) {
        sum_val = sum_val + probs[j + k * stride];
    }
    for (var k: u32 = 0u; k < params.num_classes; k = k + 1u) {
        let pos = j + k * stride;
        probs[pos] = probs[pos] / sum_val;
    }
}
";

/// Parses, validates, and lowers a WGSL compute shader to SPIR-V words.
pub fn compile_spirv(source: &str) -> Result<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| KernelError::Shader(e.emit_to_string(source)))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::PUSH_CONSTANT)
        .validate(&module)
        .map_err(|e| KernelError::Shader(format!("{e}")))?;
    let options = naga::back::spv::Options::default();
    naga::back::spv::write_vec(&module, &info, &options, None)
        .map_err(|e| KernelError::Shader(e.to_string()))
}
