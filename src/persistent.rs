//! RocksDB-backed record store
//!
//! One key per vector id (UTF-8 bytes), one current-format record per value.
//!
//! Reads are defensive: a value that is not a current-format record is
//! decoded as a legacy bare vector, given a norm, and rewritten in the
//! current format. The rewrite is best-effort; if it fails the read still
//! succeeds and the record is migrated on a later read.
//!
//! Rewrites are conditional. Every write goes through one gate, and a legacy
//! value is replaced only if the stored bytes are still the ones that were
//! decoded, so a migration never clobbers a save that landed in between.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use embedx_core::format::{decode_record, encode_record, Decoded, Metadata, Record};
use embedx_core::search::SearchResult;
use embedx_core::simd::{self, Kernel};
use embedx_core::store::{validate_entry, RecordRanker, RecordStore, StoreError, VectorStore};
use parking_lot::{Mutex, RwLock};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};

/// Durable store over a RocksDB directory
pub struct RocksStore {
    db: RwLock<Option<DB>>,
    /// Serializes puts and legacy rewrites
    write_gate: Mutex<()>,
    path: PathBuf,
    kernel: Kernel,
    read_only: bool,
}

/// Legacy value seen during a scan, with its current-format replacement
struct PendingMigration {
    id: String,
    original: Box<[u8]>,
    encoded: Vec<u8>,
}

impl RocksStore {
    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        Self::open_with_options(path, &opts)
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, opts: &Options) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = DB::open(opts, &path).map_err(|e| {
            tracing::error!(path = %path.display(), "failed to open store: {e}");
            StoreError::backend("open", e)
        })?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(Self::from_db(db, path, false))
    }

    /// Open an existing store without write access
    ///
    /// Writes fail with a backend error. Legacy records still decode, but
    /// their rewrite fails and is only logged.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = DB::open_for_read_only(&Options::default(), &path, false).map_err(|e| {
            tracing::error!(path = %path.display(), "failed to open store read-only: {e}");
            StoreError::backend("open", e)
        })?;
        tracing::info!(path = %path.display(), "store opened read-only");
        Ok(Self::from_db(db, path, true))
    }

    fn from_db(db: DB, path: PathBuf, read_only: bool) -> Self {
        Self {
            db: RwLock::new(Some(db)),
            write_gate: Mutex::new(()),
            path,
            kernel: *simd::kernel(),
            read_only,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn put_record(&self, id: &str, record: &Record) -> Result<(), StoreError> {
        let bytes = encode_record(record)?;
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        {
            let _gate = self.write_gate.lock();
            db.put(id.as_bytes(), bytes)
                .map_err(|e| StoreError::backend("put", e))?;
        }
        tracing::trace!(id, dim = record.dim(), "put record");
        Ok(())
    }

    fn read_record(&self, id: &str) -> Result<Record, StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let bytes = db
            .get(id.as_bytes())
            .map_err(|e| StoreError::backend("get", e))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let decoded = decode_record(&bytes).map_err(|source| StoreError::Decode {
            id: id.to_string(),
            source,
        })?;
        if let Decoded::Legacy(record) = &decoded {
            match self.migrate_one(db, id, &bytes, record) {
                Ok(true) => tracing::debug!(id, "migrated legacy record"),
                Ok(false) => tracing::debug!(id, "legacy record changed before rewrite"),
                Err(err) => tracing::warn!(id, "legacy migration failed: {err}"),
            }
        }
        Ok(decoded.into_record())
    }

    /// Rewrite `id` in the current format if it still holds `original`
    ///
    /// `Ok(false)` when a newer value has replaced it.
    fn migrate_one(
        &self,
        db: &DB,
        id: &str,
        original: &[u8],
        record: &Record,
    ) -> Result<bool, StoreError> {
        let encoded = encode_record(record)?;
        let _gate = self.write_gate.lock();
        let stored = db
            .get_pinned(id.as_bytes())
            .map_err(|e| StoreError::backend("get", e))?;
        if stored.as_deref() != Some(original) {
            return Ok(false);
        }
        db.put(id.as_bytes(), encoded)
            .map_err(|e| StoreError::backend("put", e))?;
        Ok(true)
    }

    /// Write the still-unchanged subset of `pending` as one batch
    ///
    /// Returns how many records were rewritten.
    fn migrate_batch(&self, db: &DB, pending: Vec<PendingMigration>) -> Result<usize, StoreError> {
        let _gate = self.write_gate.lock();
        let mut batch = WriteBatch::default();
        for entry in pending {
            let stored = db
                .get_pinned(entry.id.as_bytes())
                .map_err(|e| StoreError::backend("get", e))?;
            if stored.as_deref() == Some(&entry.original[..]) {
                batch.put(entry.id.as_bytes(), entry.encoded);
            }
        }
        let count = batch.len();
        if count > 0 {
            db.write(batch)
                .map_err(|e| StoreError::backend("write", e))?;
        }
        Ok(count)
    }

    /// Decode every record and hand it to `visit`, skipping undecodable ones
    fn scan(&self, mut visit: impl FnMut(String, Record)) -> Result<(), StoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut pending = Vec::new();
        for item in db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::backend("scan", e))?;
            let id = match String::from_utf8(key.into_vec()) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!("skipping record with non UTF-8 key: {err}");
                    continue;
                }
            };

            match decode_record(&value) {
                Ok(Decoded::Current(record)) => visit(id, record),
                Ok(Decoded::Legacy(record)) => {
                    match encode_record(&record) {
                        Ok(encoded) => pending.push(PendingMigration {
                            id: id.clone(),
                            original: value,
                            encoded,
                        }),
                        Err(err) => tracing::warn!(id = %id, "failed to re-encode legacy record: {err}"),
                    }
                    visit(id, record);
                }
                Err(err) => tracing::warn!(id = %id, "skipping undecodable record: {err}"),
            }
        }

        if !pending.is_empty() {
            let seen = pending.len();
            match self.migrate_batch(db, pending) {
                Ok(count) => tracing::debug!(count, seen, "migrated legacy records"),
                Err(err) => tracing::warn!(count = seen, "legacy migration failed: {err}"),
            }
        }
        Ok(())
    }
}

impl VectorStore for RocksStore {
    fn save_vector(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        validate_entry(id, vector)?;
        self.put_record(id, &Record::new(vector.to_vec(), None))
    }

    fn get_vector(&self, id: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.read_record(id)?.vector)
    }

    fn get_all_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        let mut vectors = HashMap::new();
        self.scan(|id, record| {
            vectors.insert(id, record.vector);
        })?;
        Ok(vectors)
    }

    fn close(&self) -> Result<(), StoreError> {
        let Some(db) = self.db.write().take() else {
            return Ok(());
        };
        if !self.read_only {
            db.flush().map_err(|e| StoreError::backend("flush", e))?;
        }
        drop(db);
        tracing::info!(path = %self.path.display(), "store closed");
        Ok(())
    }
}

impl RecordStore for RocksStore {
    fn add(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> Result<f32, StoreError> {
        validate_entry(id, vector)?;
        let record = Record::new(vector.to_vec(), metadata);
        self.put_record(id, &record)?;
        Ok(record.norm)
    }

    fn get(&self, id: &str) -> Result<Record, StoreError> {
        self.read_record(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let mut ranker = RecordRanker::new(self.kernel, query, k);
        self.scan(|id, record| ranker.offer_owned(id, record))?;
        tracing::trace!(scanned = ranker.offered(), k, "store search");
        Ok(ranker.finish())
    }
}
