// src/error.rs
use thiserror::Error;

/// Errors surfaced at the kernel boundary.
///
/// The kernel math itself never fails; every variant here is either a
/// violated precondition caught before launch or a backend that could not
/// run the launch at all.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("buffer `{name}` holds {actual} elements, expected at least {expected}")]
    BufferTooSmall { name: &'static str, expected: usize, actual: usize },

    #[error("{backend} backend does not support {what}")]
    Unsupported { backend: &'static str, what: String },

    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },

    #[error("shader compilation failed: {0}")]
    Shader(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("device error: {0:#}")]
    Device(#[from] anyhow::Error),
}

impl KernelError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArguments { reason: reason.into() }
    }
}

pub type Result<T, E = KernelError> = std::result::Result<T, E>;
