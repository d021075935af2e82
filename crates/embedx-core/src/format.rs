//! Persisted record encoding
//!
//! # Current format
//!
//! ```text
//! Offset   Size    Type          Description
//! ─────────────────────────────────────────────────────────
//! 0x00     8       [u8; 8]       Magic: "EMBXR002"
//! 0x08     8       u64 LE        D: vector length
//! 0x10     D*4     [f32 LE]      Vector
//! ..       4       f32 LE        L2 norm
//! ..       1       u8            Metadata present (0/1)
//! ..       8+M     u64 LE + [u8] Metadata as JSON (if present)
//! ```
//!
//! The body after the magic is `bincode` with fixed-width integers; trailing
//! bytes are rejected.
//!
//! # Legacy format
//!
//! A bare `bincode` `Vec<f32>` (length prefix + floats), with no norm and no
//! metadata. It is only ever read; writers always emit the current format.

use std::collections::HashMap;

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simd;

/// Magic bytes identifying a current-format record: "EMBXR002"
pub const RECORD_MAGIC: [u8; 8] = *b"EMBXR002";

/// Opaque per-record metadata, stored and returned unchanged
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic bytes: expected EMBXR002")]
    InvalidMagic,

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Record matches neither format: {current} (legacy: {legacy})")]
    Undecodable {
        #[source]
        current: Box<FormatError>,
        legacy: bincode::Error,
    },
}

/// In-memory form of a stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub vector: Vec<f32>,
    /// L2 norm of `vector`, computed at write time
    pub norm: f32,
    pub metadata: Option<Metadata>,
}

impl Record {
    /// Build a record, computing the norm of `vector`
    pub fn new(vector: Vec<f32>, metadata: Option<Metadata>) -> Self {
        let norm = simd::norm(&vector);
        Self {
            vector,
            norm,
            metadata,
        }
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Outcome of a defensive decode
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Current(Record),
    /// Legacy bare vector; the norm has been recomputed and the record should
    /// be rewritten in the current format
    Legacy(Record),
}

impl Decoded {
    pub fn is_legacy(&self) -> bool {
        matches!(self, Decoded::Legacy(_))
    }

    pub fn into_record(self) -> Record {
        match self {
            Decoded::Current(record) | Decoded::Legacy(record) => record,
        }
    }
}

#[derive(Serialize)]
struct BodyRef<'a> {
    vector: &'a [f32],
    norm: f32,
    metadata: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct Body {
    vector: Vec<f32>,
    norm: f32,
    metadata: Option<Vec<u8>>,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a record in the current format
pub fn encode_record(record: &Record) -> Result<Vec<u8>, FormatError> {
    let metadata = record
        .metadata
        .as_ref()
        .map(serde_json::to_vec)
        .transpose()?;
    let body = BodyRef {
        vector: &record.vector,
        norm: record.norm,
        metadata,
    };

    let mut buf = Vec::with_capacity(RECORD_MAGIC.len() + 8 + record.vector.len() * 4 + 16);
    buf.extend_from_slice(&RECORD_MAGIC);
    codec().serialize_into(&mut buf, &body)?;
    Ok(buf)
}

/// Encode a bare vector in the legacy format
///
/// Nothing in the store writes this; it exists to produce legacy fixtures.
pub fn encode_legacy(vector: &[f32]) -> Result<Vec<u8>, FormatError> {
    Ok(codec().serialize(vector)?)
}

/// Decode a current-format record
pub fn decode_current(bytes: &[u8]) -> Result<Record, FormatError> {
    let payload = bytes
        .strip_prefix(&RECORD_MAGIC[..])
        .ok_or(FormatError::InvalidMagic)?;
    let body: Body = codec().deserialize(payload)?;
    let metadata = body
        .metadata
        .map(|raw| serde_json::from_slice::<Metadata>(&raw))
        .transpose()?;

    Ok(Record {
        vector: body.vector,
        norm: body.norm,
        metadata,
    })
}

/// Decode a legacy bare vector
pub fn decode_legacy(bytes: &[u8]) -> Result<Vec<f32>, bincode::Error> {
    codec().deserialize(bytes)
}

/// Try the current format, then the legacy one
///
/// A legacy hit comes back as [`Decoded::Legacy`] with its norm computed.
/// When both fail the error carries the current-format cause.
pub fn decode_record(bytes: &[u8]) -> Result<Decoded, FormatError> {
    let current = match decode_current(bytes) {
        Ok(record) => return Ok(Decoded::Current(record)),
        Err(err) => err,
    };

    match decode_legacy(bytes) {
        Ok(vector) => Ok(Decoded::Legacy(Record::new(vector, None))),
        Err(legacy) => Err(FormatError::Undecodable {
            current: Box::new(current),
            legacy,
        }),
    }
}

/// Whether `bytes` carries the current-format magic
pub fn is_current_format(bytes: &[u8]) -> bool {
    bytes.starts_with(&RECORD_MAGIC)
}
