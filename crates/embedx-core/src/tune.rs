//! Block-size auto-tuning
//!
//! Picks the block size for [`dot_blocked`](crate::simd::dot_blocked) with a
//! one-shot micro-benchmark: a fixed 256-element pair of pseudo-random
//! vectors is run through the blocked kernel 2000 times per candidate and the
//! fastest candidate wins (first one on ties).
//!
//! A positive integer in `EMBEDX_BLOCK_SIZE` skips the benchmark entirely.
//! The result is computed once per process and cached; timing noise means
//! the winner may differ between machines or runs, but never within a run.

use std::hint::black_box;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{parse_positive, BLOCK_SIZE_ENV, DEFAULT_BLOCK_SIZE};
use crate::simd::dot_blocked;

/// Candidate block sizes, benchmarked in this order
pub const BLOCK_CANDIDATES: [u32; 5] = [16, 32, 64, 128, 256];

/// Length of the benchmark vectors
pub const BENCH_DIM: usize = 256;

/// Kernel invocations timed per candidate
pub const BENCH_ITERATIONS: usize = 2000;

const BENCH_SEED: u64 = 0x0EB3_D0C5_B10C_5EED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneSource {
    /// Taken verbatim from the override
    Override,
    /// Selected by the micro-benchmark
    Benchmark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateTiming {
    pub block_size: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneOutcome {
    pub block_size: u32,
    pub source: TuneSource,
    /// One entry per candidate, in benchmark order (empty for overrides)
    pub timings: Vec<CandidateTiming>,
}

/// Run the tuning procedure once
///
/// `override_value` wins when it parses as a positive integer; anything else
/// is ignored and the benchmark runs.
pub fn tune_block_size(override_value: Option<&str>) -> TuneOutcome {
    if let Some(raw) = override_value {
        match parse_positive(raw) {
            Some(block_size) => {
                tracing::debug!(block_size, "block size taken from override");
                return TuneOutcome {
                    block_size,
                    source: TuneSource::Override,
                    timings: Vec::new(),
                };
            }
            None => {
                tracing::warn!(value = raw, "ignoring invalid block size override");
            }
        }
    }

    let timings = benchmark_candidates(&BLOCK_CANDIDATES);
    let block_size = select_fastest(&timings).unwrap_or(DEFAULT_BLOCK_SIZE as u32);
    tracing::debug!(block_size, ?timings, "auto-tuned block size");

    TuneOutcome {
        block_size,
        source: TuneSource::Benchmark,
        timings,
    }
}

/// Time the blocked kernel for each candidate against one fixed vector pair
pub fn benchmark_candidates(candidates: &[u32]) -> Vec<CandidateTiming> {
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    let a: Vec<f32> = (0..BENCH_DIM).map(|_| rng.gen::<f32>()).collect();
    let b: Vec<f32> = (0..BENCH_DIM).map(|_| rng.gen::<f32>()).collect();

    candidates
        .iter()
        .map(|&block_size| {
            let start = Instant::now();
            for _ in 0..BENCH_ITERATIONS {
                black_box(dot_blocked(
                    black_box(&a),
                    black_box(&b),
                    block_size as usize,
                ));
            }
            CandidateTiming {
                block_size,
                elapsed: start.elapsed(),
            }
        })
        .collect()
}

/// Smallest elapsed time wins; the earlier candidate wins a tie
pub fn select_fastest(timings: &[CandidateTiming]) -> Option<u32> {
    let mut best: Option<&CandidateTiming> = None;
    for timing in timings {
        if best.map_or(true, |b| timing.elapsed < b.elapsed) {
            best = Some(timing);
        }
    }
    best.map(|t| t.block_size)
}

/// One-time tuning gate
///
/// The first call to [`outcome`](Self::outcome) runs the procedure; every
/// later call returns the cached result.
#[derive(Debug)]
pub struct BlockSizeTuner {
    override_value: Option<String>,
    outcome: OnceLock<TuneOutcome>,
}

impl BlockSizeTuner {
    /// Tuner reading its override from `EMBEDX_BLOCK_SIZE`
    pub fn from_env() -> Self {
        Self {
            override_value: std::env::var(BLOCK_SIZE_ENV).ok(),
            outcome: OnceLock::new(),
        }
    }

    pub fn with_override(value: impl Into<String>) -> Self {
        Self {
            override_value: Some(value.into()),
            outcome: OnceLock::new(),
        }
    }

    pub fn benchmark_only() -> Self {
        Self {
            override_value: None,
            outcome: OnceLock::new(),
        }
    }

    pub fn outcome(&self) -> &TuneOutcome {
        self.outcome
            .get_or_init(|| tune_block_size(self.override_value.as_deref()))
    }

    pub fn block_size(&self) -> u32 {
        self.outcome().block_size
    }

    pub fn is_tuned(&self) -> bool {
        self.outcome.get().is_some()
    }
}

static PROCESS_TUNER: OnceLock<BlockSizeTuner> = OnceLock::new();

/// The process-wide tuner (override read from the environment on first use)
pub fn process_tuner() -> &'static BlockSizeTuner {
    PROCESS_TUNER.get_or_init(BlockSizeTuner::from_env)
}

/// Process-wide tuned block size
pub fn tuned_block_size() -> u32 {
    process_tuner().block_size()
}
