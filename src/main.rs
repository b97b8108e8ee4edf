use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use mobula_op::reduce::reduce;
use mobula_op::strided::Strided;
use mobula_op::{
    ops, AxisLayout, Backend, CpuBackend, Device, KernelConfig, Schedule, SerialLoop,
    SoftmaxForward,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Runs softmax forward over random logits on every available backend and
/// compares each against the serial CPU result.
#[derive(Debug, Parser)]
#[command(name = "mobula-op", version)]
struct Args {
    /// Product of the dimensions before the softmax axis.
    #[arg(long, default_value_t = 64)]
    outer: usize,
    /// Size of the softmax axis.
    #[arg(long, default_value_t = 1000)]
    classes: usize,
    /// Product of the dimensions after the softmax axis.
    #[arg(long, default_value_t = 16)]
    inner: usize,
    /// Logits are drawn uniformly from `[-scale, scale)`.
    #[arg(long, default_value_t = 8.0)]
    scale: f32,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Dedicated worker count for the threaded schedule.
    #[arg(long)]
    threads: Option<usize>,
    /// Lanes per block for the grid schedule.
    #[arg(long)]
    block_dim: Option<usize>,
    /// Also run on the Vulkan backend.
    #[arg(long)]
    vulkan: bool,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    anyhow::ensure!(args.scale > 0.0, "--scale must be positive, got {}", args.scale);

    let mut cfg = KernelConfig::from_env()?;
    if let Some(n) = args.threads {
        cfg.num_threads = Some(n);
    }
    if let Some(b) = args.block_dim {
        cfg.block_dim = b;
    }

    let layout = AxisLayout::new(args.outer, args.classes, args.inner)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let data: Vec<f32> = (0..layout.len()).map(|_| rng.gen_range(-args.scale..args.scale)).collect();
    println!(
        "softmax over [{}, {}, {}] ({} work units)",
        layout.outer_size(),
        layout.num_classes(),
        layout.inner_size(),
        layout.num_work_units()
    );

    let mut reference = vec![0.0f32; layout.len()];
    let t0 = Instant::now();
    CpuBackend::new(SerialLoop).softmax_forward(&data, layout, &mut reference)?;
    report("serial", t0.elapsed(), &reference, &reference, layout)?;

    for schedule in [Schedule::Threads, Schedule::Grid] {
        let run_cfg = KernelConfig { device: Device::Cpu, schedule, ..cfg.clone() };
        let mut backend = Backend::from_config(&run_cfg)?;
        let mut probs = vec![0.0f32; layout.len()];
        let t = Instant::now();
        backend.softmax_forward(&data, layout, &mut probs)?;
        report(&schedule.to_string(), t.elapsed(), &probs, &reference, layout)?;
    }

    if args.vulkan || cfg.device == Device::Vulkan {
        let run_cfg = KernelConfig { device: Device::Vulkan, ..cfg };
        let mut backend = Backend::from_config(&run_cfg)?;
        let mut probs = vec![0.0f32; layout.len()];
        let t = Instant::now();
        backend.softmax_forward(&data, layout, &mut probs)?;
        report(backend.name(), t.elapsed(), &probs, &reference, layout)?;
    }
    Ok(())
}

fn report(
    name: &str,
    elapsed: Duration,
    probs: &[f32],
    reference: &[f32],
    layout: AxisLayout,
) -> Result<()> {
    let diff = probs.iter().zip(reference).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max);
    let mut worst_sum = 0.0f32;
    for index in 0..layout.num_work_units() {
        let axis = Strided::new(probs, layout.axis_offset(index), layout.inner_size(), layout.num_classes())?;
        worst_sum = worst_sum.max((reduce(ops::plus, &axis) - 1.0).abs());
    }
    println!(
        "{name:>8}: {:8.3} ms   max abs diff {diff:.3e}   max |sum - 1| {worst_sum:.3e}",
        elapsed.as_secs_f64() * 1e3
    );
    Ok(())
}
