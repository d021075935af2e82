//! Dot-product kernels and CPU-capability dispatch
//!
//! Two scalar kernels back every similarity computation:
//!
//! - `dot_generic`: a plain multiply-accumulate loop.
//! - `dot_blocked`: walks the vectors in contiguous blocks of `block_size`
//!   elements and unrolls each block 8-wide, finishing with a scalar tail.
//!
//! # Kernel Selection
//!
//! | Platform        | Kind           | Kernel used                          |
//! |-----------------|----------------|--------------------------------------|
//! | x86_64 + AVX2   | ArchOptimized  | blocked (slot for AVX2 intrinsics)   |
//! | aarch64 (NEON)  | ArchOptimized  | blocked (slot for NEON intrinsics)   |
//! | other           | SizeAdaptive   | blocked above 512 elements, else generic |
//!
//! The CPU probe runs once per process. The process-wide [`kernel`] is bound
//! after the auto-tuner has produced its block size, so the two one-time
//! gates never race.

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;

use crate::config::{KernelConfig, DEFAULT_BLOCK_SIZE};
use crate::tune;

/// Vectors longer than this use the blocked kernel on the size-adaptive path
pub const ADAPTIVE_THRESHOLD: usize = 512;

const UNROLL: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("Length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Cosine similarity is undefined for a zero-magnitude vector")]
    ZeroMagnitude,
}

// ============================================================================
// Scalar kernels
// ============================================================================

/// Plain scalar dot product
#[inline]
pub fn dot_generic(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Blocked dot product with an 8-way unroll inside each block
///
/// Produces the same value as [`dot_generic`] up to summation order.
/// A `block_size` of zero falls back to the default (64).
pub fn dot_blocked(a: &[f32], b: &[f32], block_size: usize) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");

    let block = if block_size == 0 {
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };

    let mut sum = 0.0f32;
    for (block_a, block_b) in a.chunks(block).zip(b.chunks(block)) {
        let mut lanes_a = block_a.chunks_exact(UNROLL);
        let mut lanes_b = block_b.chunks_exact(UNROLL);

        for (x, y) in (&mut lanes_a).zip(&mut lanes_b) {
            sum += x[0] * y[0]
                + x[1] * y[1]
                + x[2] * y[2]
                + x[3] * y[3]
                + x[4] * y[4]
                + x[5] * y[5]
                + x[6] * y[6]
                + x[7] * y[7];
        }

        // Tail shorter than the unroll width
        for (x, y) in lanes_a.remainder().iter().zip(lanes_b.remainder()) {
            sum += x * y;
        }
    }

    sum
}

// TODO: replace with AVX2/NEON intrinsics once the blocked kernel has a
// vectorized counterpart; the dispatch slot is already bound per CPU.
#[inline]
fn dot_arch_optimized(a: &[f32], b: &[f32], block_size: usize) -> f32 {
    dot_blocked(a, b, block_size)
}

#[inline]
fn dot_size_adaptive(a: &[f32], b: &[f32], block_size: usize) -> f32 {
    if a.len() > ADAPTIVE_THRESHOLD {
        dot_blocked(a, b, block_size)
    } else {
        dot_generic(a, b)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Signature shared by every bound kernel: `(a, b, block_size) -> a · b`
pub type DotFn = fn(&[f32], &[f32], usize) -> f32;

/// Kernel family chosen by the CPU probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    ArchOptimized,
    SizeAdaptive,
}

static DETECTED_KIND: OnceLock<KernelKind> = OnceLock::new();

impl KernelKind {
    /// Probe the running CPU (once per process)
    pub fn detect() -> Self {
        *DETECTED_KIND.get_or_init(probe_cpu)
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelKind::ArchOptimized => "arch-optimized",
            KernelKind::SizeAdaptive => "size-adaptive",
        }
    }

    fn dot_fn(self) -> DotFn {
        match self {
            KernelKind::ArchOptimized => dot_arch_optimized,
            KernelKind::SizeAdaptive => dot_size_adaptive,
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn probe_cpu() -> KernelKind {
    if is_x86_feature_detected!("avx2") {
        KernelKind::ArchOptimized
    } else {
        KernelKind::SizeAdaptive
    }
}

// NEON is always available on aarch64
#[cfg(target_arch = "aarch64")]
fn probe_cpu() -> KernelKind {
    KernelKind::ArchOptimized
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn probe_cpu() -> KernelKind {
    KernelKind::SizeAdaptive
}

/// A dot-product kernel bound to a block size
#[derive(Clone, Copy)]
pub struct Kernel {
    kind: KernelKind,
    block_size: usize,
    dot_fn: DotFn,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("kind", &self.kind)
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl Kernel {
    pub fn new(kind: KernelKind, block_size: usize) -> Self {
        let block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        Self {
            kind,
            block_size,
            dot_fn: kind.dot_fn(),
        }
    }

    /// Kernel for the detected CPU using the block size from `config`
    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(KernelKind::detect(), config.effective_block_size())
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Dot product without a length check
    ///
    /// Callers must have filtered out mismatched lengths already; the search
    /// and batch paths do so before calling in.
    #[inline(always)]
    pub fn dot_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.dot_fn)(a, b, self.block_size)
    }

    pub fn dot(&self, a: &[f32], b: &[f32]) -> Result<f32, KernelError> {
        check_lengths(a, b)?;
        Ok(self.dot_unchecked(a, b))
    }

    pub fn cosine(&self, a: &[f32], b: &[f32]) -> Result<f32, KernelError> {
        check_lengths(a, b)?;
        let norm_a = norm(a);
        let norm_b = norm(b);
        if norm_a == 0.0 || norm_b == 0.0 {
            return Err(KernelError::ZeroMagnitude);
        }
        Ok(self.dot_unchecked(a, b) / (norm_a * norm_b))
    }
}

static PROCESS_KERNEL: OnceLock<Kernel> = OnceLock::new();

/// Process-wide kernel, bound on first use with the auto-tuned block size
pub fn kernel() -> &'static Kernel {
    PROCESS_KERNEL.get_or_init(|| {
        let block_size = tune::tuned_block_size() as usize;
        let kernel = Kernel::new(KernelKind::detect(), block_size);
        tracing::debug!(
            kind = kernel.kind.name(),
            block_size = kernel.block_size,
            "bound dot-product kernel"
        );
        kernel
    })
}

#[inline]
fn check_lengths(a: &[f32], b: &[f32]) -> Result<(), KernelError> {
    if a.len() != b.len() {
        return Err(KernelError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

// ============================================================================
// Public helpers
// ============================================================================

/// Dot product through the process-wide kernel
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, KernelError> {
    kernel().dot(a, b)
}

/// L2 (Euclidean) norm: `sqrt(sum v_i^2)`
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot_generic(v, v).sqrt()
}

/// Cosine similarity through the process-wide kernel
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32, KernelError> {
    kernel().cosine(a, b)
}
