//! Kernel and batch-execution configuration
//!
//! `KernelConfig` is an explicit value: build it once at startup (usually
//! through [`KernelConfig::tuned`] or [`KernelConfig::from_env`]) and hand it
//! to the engine or batch executor.

use serde::{Deserialize, Serialize};

use crate::tune;

/// Block size used whenever a configured block size is zero
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Override for the auto-tuned block size (positive integer)
pub const BLOCK_SIZE_ENV: &str = "EMBEDX_BLOCK_SIZE";
/// Batch worker count (0 = all available execution units)
pub const WORKERS_ENV: &str = "EMBEDX_WORKERS";
pub const MIN_DIM_PARALLEL_ENV: &str = "EMBEDX_MIN_DIM_PARALLEL";
pub const MIN_BATCH_FACTOR_ENV: &str = "EMBEDX_MIN_BATCH_FACTOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Block length for the blocked kernel (0 = default of 64)
    pub block_size: u32,
    /// Parallel batch workers (0 = `available_parallelism`)
    pub worker_count: u32,
    /// Queries shorter than this always run serially
    pub min_dim_for_parallel: u32,
    /// Batches smaller than `workers * min_batch_factor` run serially
    pub min_batch_factor: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE as u32,
            worker_count: 0,
            min_dim_for_parallel: 128,
            min_batch_factor: 4,
        }
    }
}

impl KernelConfig {
    /// Defaults with the process-wide auto-tuned block size
    pub fn tuned() -> Self {
        Self {
            block_size: tune::tuned_block_size(),
            ..Self::default()
        }
    }

    /// [`KernelConfig::tuned`] with batch thresholds overridden from the
    /// environment. Values that are missing or do not parse keep their default.
    pub fn from_env() -> Self {
        let mut config = Self::tuned();
        if let Some(workers) = env_u32(WORKERS_ENV) {
            config.worker_count = workers;
        }
        if let Some(min_dim) = env_u32(MIN_DIM_PARALLEL_ENV) {
            config.min_dim_for_parallel = min_dim;
        }
        if let Some(factor) = env_u32(MIN_BATCH_FACTOR_ENV) {
            config.min_batch_factor = factor;
        }
        config
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_workers(mut self, worker_count: u32) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_parallel_thresholds(mut self, min_dim: u32, min_batch_factor: u32) -> Self {
        self.min_dim_for_parallel = min_dim;
        self.min_batch_factor = min_batch_factor;
        self
    }

    /// Block size safe to hand to a blocked kernel (never zero)
    pub fn effective_block_size(&self) -> usize {
        if self.block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            self.block_size as usize
        }
    }

    /// Worker count with 0 resolved to the number of available execution units
    pub fn effective_workers(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count as usize;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Parse a strictly positive integer, as accepted by the tuning override
pub fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

fn env_u32(name: &str) -> Option<u32> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(variable = name, value = %raw, "ignoring invalid setting: {err}");
            None
        }
    }
}
