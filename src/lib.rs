//! Embedx-DB: an embeddable cosine-similarity vector engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Embedder (add / brute-force search)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            VectorStore / RecordStore capability             │
//! │        MemoryStore (RwLock map) · RocksStore (RocksDB)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Kernels (generic · blocked · auto-tuned) · batch pool   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```rust,ignore
//! use embedx_db::{Embedder, RocksStore};
//!
//! let engine = Embedder::new(RocksStore::open("/data/vectors")?);
//! engine.add("doc-1", &[0.1, 0.7, 0.2])?;
//! let hits = engine.search(&[0.1, 0.6, 0.3], 5)?;
//! ```

pub mod persistent;

pub use embedx_core::{
    batch, config, engine, format, search, simd, store, tune, BatchError, BatchExecutor, Embedder,
    EngineError, Kernel, KernelConfig, KernelError, KernelKind, MemoryStore, Metadata, Record,
    RecordStore, SearchResult, StoreError, TopK, VectorStore,
};
pub use embedx_core::{cosine, dot, dot_batch, norm, tuned_block_size};
pub use persistent::RocksStore;
