//! Compute kernels run by workers.
//!
//! A [`Kernel`] is the "actual work" a worker performs for each job: a pure,
//! deterministic function of the job's numeric input. Kernels are invoked on
//! tokio's blocking pool, so they may burn CPU freely.

use thiserror::Error;

/// Largest input whose Fibonacci number fits in a `u64`.
pub const FIBONACCI_MAX_INPUT: u64 = 93;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Result overflows for input {0}")]
    Overflow(u64),

    #[error("Kernel exceeded its execution timeout")]
    TimedOut,

    #[error("Kernel panicked: {0}")]
    Panicked(String),
}

/// The function invoked once per job.
///
/// Implementations must be safe to call concurrently from any worker and
/// must not keep shared mutable state that changes the result.
pub trait Kernel: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn compute(&self, input: u64) -> Result<u64, KernelError>;
}

/// Recursive Fibonacci. Intentionally exponential so jobs carry real CPU cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fibonacci;

impl Fibonacci {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for Fibonacci {
    fn name(&self) -> &str {
        "fibonacci"
    }

    fn compute(&self, input: u64) -> Result<u64, KernelError> {
        if input > FIBONACCI_MAX_INPUT {
            return Err(KernelError::Overflow(input));
        }
        fibonacci(input).ok_or(KernelError::Overflow(input))
    }
}

fn fibonacci(n: u64) -> Option<u64> {
    if n <= 1 {
        return Some(n);
    }
    fibonacci(n - 1)?.checked_add(fibonacci(n - 2)?)
}
