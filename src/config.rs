// src/config.rs
use std::fmt;
use std::str::FromStr;

use crate::error::{KernelError, Result};
use crate::kernel_loop::GridLoop;

pub const ENV_DEVICE: &str = "MOBULA_DEVICE";
pub const ENV_SCHEDULE: &str = "MOBULA_SCHEDULE";
pub const ENV_NUM_THREADS: &str = "MOBULA_NUM_THREADS";
pub const ENV_BLOCK_DIM: &str = "MOBULA_BLOCK_DIM";

/// Where kernels execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Vulkan,
}

/// How the CPU backend walks the work-unit index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    Serial,
    #[default]
    Threads,
    Grid,
}

impl FromStr for Device {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "vulkan" | "vk" | "gpu" => Ok(Device::Vulkan),
            _ => Err(KernelError::Config { key: ENV_DEVICE, value: s.to_string() }),
        }
    }
}

impl FromStr for Schedule {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Schedule::Serial),
            "threads" | "parallel" => Ok(Schedule::Threads),
            "grid" => Ok(Schedule::Grid),
            _ => Err(KernelError::Config { key: ENV_SCHEDULE, value: s.to_string() }),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "cpu",
            Device::Vulkan => "vulkan",
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Schedule::Serial => "serial",
            Schedule::Threads => "threads",
            Schedule::Grid => "grid",
        })
    }
}

/// Backend selection and CPU scheduling knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    pub device: Device,
    pub schedule: Schedule,
    /// Dedicated pool size for [`Schedule::Threads`]; `None` uses rayon's
    /// global pool.
    pub num_threads: Option<usize>,
    /// Lanes per block for [`Schedule::Grid`].
    pub block_dim: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            device: Device::default(),
            schedule: Schedule::default(),
            num_threads: None,
            block_dim: GridLoop::DEFAULT_BLOCK_DIM,
        }
    }
}

impl KernelConfig {
    /// Defaults overridden by `MOBULA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `MOBULA_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_DEVICE) {
            cfg.device = v.trim().parse()?;
        }
        if let Some(v) = lookup(ENV_SCHEDULE) {
            cfg.schedule = v.trim().parse()?;
        }
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            cfg.num_threads = Some(parse_positive(ENV_NUM_THREADS, &v)?);
        }
        if let Some(v) = lookup(ENV_BLOCK_DIM) {
            cfg.block_dim = parse_positive(ENV_BLOCK_DIM, &v)?;
        }
        Ok(cfg)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(KernelError::Config { key, value: value.to_string() }),
    }
}
