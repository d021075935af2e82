//! One query against many rows
//!
//! `dot_batch` returns raw dot products (not similarities); scaling is up to
//! the caller. Small workloads run serially. Larger ones fan out over a fixed
//! worker pool:
//!
//! ```text
//!   row indices ──► [ shared queue ] ──► worker 0 ─┐
//!                                    ├─► worker 1 ─┼─► out[i] (disjoint slots)
//!                                    └─► worker N ─┘
//!                         pool scope = completion barrier
//! ```
//!
//! Both paths go through the same bound [`Kernel`], so they produce
//! bit-identical output for identical input.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use crossbeam_channel::bounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use crate::config::KernelConfig;
use crate::simd::{self, Kernel};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Row {row} has dimension {actual}, query has {expected}")]
    LengthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to build batch worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Execution path chosen for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRoute {
    Serial,
    Parallel { workers: usize },
}

/// Serial when `dim < min_dim_for_parallel` or `rows < workers * min_batch_factor`
pub fn choose_route(dim: usize, rows: usize, workers: usize, config: &KernelConfig) -> BatchRoute {
    let min_rows = workers.saturating_mul(config.min_batch_factor as usize);
    if dim < config.min_dim_for_parallel as usize || rows < min_rows {
        BatchRoute::Serial
    } else {
        BatchRoute::Parallel { workers }
    }
}

/// Batch dot-product executor owning a fixed-size worker pool
pub struct BatchExecutor {
    config: KernelConfig,
    kernel: Kernel,
    workers: usize,
    pool: ThreadPool,
}

impl BatchExecutor {
    pub fn new(config: KernelConfig) -> Result<Self, BatchError> {
        let workers = config.effective_workers();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("embedx-batch-{idx}"))
            .build()?;

        Ok(Self {
            kernel: Kernel::from_config(&config),
            config,
            workers,
            pool,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn route(&self, dim: usize, rows: usize) -> BatchRoute {
        choose_route(dim, rows, self.workers, &self.config)
    }

    /// `result[i] = query · rows[i]`, routed serial or parallel
    pub fn dot_batch<R>(&self, query: &[f32], rows: &[R]) -> Result<Vec<f32>, BatchError>
    where
        R: AsRef<[f32]> + Sync,
    {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_rows(query, rows)?;

        let route = self.route(query.len(), rows.len());
        tracing::trace!(dim = query.len(), rows = rows.len(), ?route, "dot batch");

        Ok(match route {
            BatchRoute::Serial => self.dot_batch_serial(query, rows),
            BatchRoute::Parallel { .. } => self.dot_batch_parallel(query, rows),
        })
    }

    /// Serial path; row lengths must already match the query
    pub fn dot_batch_serial<R: AsRef<[f32]>>(&self, query: &[f32], rows: &[R]) -> Vec<f32> {
        rows.iter()
            .map(|row| self.kernel.dot_unchecked(query, row.as_ref()))
            .collect()
    }

    /// Parallel path; row lengths must already match the query
    ///
    /// Every worker pulls indices from one queue until it is drained and
    /// stores into its own output slot, so no slot is written twice.
    pub fn dot_batch_parallel<R>(&self, query: &[f32], rows: &[R]) -> Vec<f32>
    where
        R: AsRef<[f32]> + Sync,
    {
        let n = rows.len();
        let (tx, rx) = bounded::<usize>(n.max(1));
        for i in 0..n {
            if tx.send(i).is_err() {
                break;
            }
        }
        drop(tx);

        let slots: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        let kernel = self.kernel;

        self.pool.scope(|scope| {
            for _ in 0..self.workers {
                let rx = rx.clone();
                let slots = &slots;
                scope.spawn(move |_| {
                    for i in rx.iter() {
                        let value = kernel.dot_unchecked(query, rows[i].as_ref());
                        slots[i].store(value.to_bits(), Ordering::Relaxed);
                    }
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| f32::from_bits(slot.into_inner()))
            .collect()
    }
}

fn check_rows<R: AsRef<[f32]>>(query: &[f32], rows: &[R]) -> Result<(), BatchError> {
    for (row, values) in rows.iter().enumerate() {
        let actual = values.as_ref().len();
        if actual != query.len() {
            return Err(BatchError::LengthMismatch {
                row,
                expected: query.len(),
                actual,
            });
        }
    }
    Ok(())
}

static PROCESS_EXECUTOR: OnceLock<Option<BatchExecutor>> = OnceLock::new();

fn process_executor() -> Option<&'static BatchExecutor> {
    PROCESS_EXECUTOR
        .get_or_init(|| match BatchExecutor::new(KernelConfig::from_env()) {
            Ok(executor) => Some(executor),
            Err(err) => {
                tracing::warn!("batch worker pool unavailable, running serially: {err}");
                None
            }
        })
        .as_ref()
}

/// `result[i] = query · rows[i]` using the process-wide executor
pub fn dot_batch<R>(query: &[f32], rows: &[R]) -> Result<Vec<f32>, BatchError>
where
    R: AsRef<[f32]> + Sync,
{
    match process_executor() {
        Some(executor) => executor.dot_batch(query, rows),
        None => {
            check_rows(query, rows)?;
            let kernel = simd::kernel();
            Ok(rows
                .iter()
                .map(|row| kernel.dot_unchecked(query, row.as_ref()))
                .collect())
        }
    }
}
