//! Embedx Core – dot-product kernels, auto-tuning, batch execution and top-k search
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Embedder (add / search)                   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   Top-K engine (heap/sort)   │   Batch executor (pool)      │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │     Kernel layer (generic · blocked · CPU dispatch)         │
//! │     Auto-tuner (one-shot block size benchmark)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │   VectorStore / RecordStore · MemoryStore · record format   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod format;
pub mod search;
pub mod simd;
pub mod store;
pub mod tune;

pub use batch::{dot_batch, BatchError, BatchExecutor};
pub use config::KernelConfig;
pub use engine::{Embedder, EngineError};
pub use format::{Metadata, Record};
pub use search::{SearchResult, TopK};
pub use simd::{cosine, dot, norm, Kernel, KernelError, KernelKind};
pub use store::{MemoryStore, RecordStore, StoreError, VectorStore};
pub use tune::tuned_block_size;
