#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `actions` implements the checksum workflows the worker layer dispatches
//! requests into: read a cached checksum, compute one from the object's
//! bytes, ingest (compute-and-cache) a checksum, and verify a cached
//! checksum against a fresh read of the object.
//!
//! # Design
//!
//! [`Actions`] is constructed with a backend client, a [`Clock`], and the
//! read size to use when streaming object bytes; every method is a thin,
//! independently testable operation over those two collaborators rather
//! than a global singleton. [`Clock`] exists purely so tests can supply a
//! fixed "now" instead of depending on wall-clock time.
//!
//! # Invariants
//!
//! - Timestamps are always whole seconds since the Unix epoch in UTC; there
//!   is no local-time or daylight-saving adjustment anywhere in this crate.
//! - [`Actions::inget`] never leaves an object without cached metadata after
//!   succeeding: if a concurrent writer created the xattr first, the
//!   already-exists race is treated as success and the now-cached record is
//!   re-read rather than surfaced as an error.
//! - [`Actions::verify`] only reports a match when both a stored and a
//!   freshly computed checksum exist and agree; a missing stored checksum
//!   (even when `force_fileread` computed one anyway) is reported as no
//!   match, not as an error.
//!
//! # Errors
//!
//! [`ActionsError`] wraps the backend, record-codec, and checksum errors the
//! underlying crates raise, keeping a single error type for worker
//! dispatch to match on.
//!
//! # Examples
//!
//! ```
//! use actions::{Actions, SystemClock};
//! use objectstore::{MemoryObjectStore, ObjectStoreClient, chunk_name, XATTR_OBJECT_SIZE, XATTR_TOTAL_SIZE};
//!
//! let store = MemoryObjectStore::new();
//! store.put_chunk("pool", &chunk_name("obj", 0), b"hello world".to_vec(), 1_700_000_000);
//! store.set_xattr("pool", &chunk_name("obj", 0), XATTR_OBJECT_SIZE, b"1048576").unwrap();
//! store.set_xattr("pool", &chunk_name("obj", 0), XATTR_TOTAL_SIZE, b"11").unwrap();
//!
//! let clock = SystemClock;
//! let actions = Actions::new(&store, &clock, 64 * 1024);
//! let record = actions.get_from_file("pool", "obj").unwrap();
//! assert_eq!(record.name(), "adler32");
//! ```

use checksums::adler::Adler32;
use checksums::record::{ChecksumRecord, Endianness, RecordError};
use objectstore::{ObjectStoreClient, ObjectStoreError, StripeReader, stat_object, write_xattr_checked};

/// The only checksum algorithm this implementation supports.
pub const ALGORITHM: &str = "adler32";

/// Extended attribute key a checksum record is cached under, for the one
/// supported algorithm.
#[must_use]
pub fn xattr_key() -> String {
    format!("cks.{ALGORITHM}")
}

/// Errors raised while performing a checksum action.
#[derive(Debug, thiserror::Error)]
pub enum ActionsError {
    /// The backend object store reported a failure.
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    /// The cached binary record could not be decoded.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Supplies the current time, so tests can avoid depending on wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time, as whole seconds since the Unix epoch (UTC).
    fn now_unix(&self) -> i64;
}

/// [`Clock`] backed by [`std::time::SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Checksum retrieval, ingest, and verification over a single backend.
pub struct Actions<'a> {
    client: &'a dyn ObjectStoreClient,
    clock: &'a dyn Clock,
    read_size: usize,
}

impl<'a> Actions<'a> {
    /// Creates an action set over `client`, using `clock` for `cs_time`
    /// computation and reading `read_size` bytes at a time while streaming
    /// object contents.
    #[must_use]
    pub const fn new(client: &'a dyn ObjectStoreClient, clock: &'a dyn Clock, read_size: usize) -> Self {
        Self { client, clock, read_size }
    }

    /// Reads the cached checksum record from `object_name`'s extended attributes.
    ///
    /// Returns `Ok(None)` if no checksum has been cached yet.
    ///
    /// # Errors
    ///
    /// Returns [`ActionsError::Store`] on backend failure and
    /// [`ActionsError::Record`] if the cached bytes are not a valid record.
    pub fn get_from_metadata(&self, pool: &str, object_name: &str) -> Result<Option<ChecksumRecord>, ActionsError> {
        let chunk0 = objectstore::chunk_name(object_name, 0);
        let Some(raw) = self.client.get_xattr(pool, &chunk0, &xattr_key())? else {
            return Ok(None);
        };
        Ok(Some(ChecksumRecord::decode(&raw)?))
    }

    /// Computes a fresh checksum by streaming `object_name`'s bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ActionsError::Store`] if the object cannot be stat-ed or
    /// read, including a short read if fewer bytes are available than the
    /// object's declared total size.
    pub fn get_from_file(&self, pool: &str, object_name: &str) -> Result<ChecksumRecord, ActionsError> {
        let stat = stat_object(self.client, pool, object_name)?;
        let reader = StripeReader::new(self.client, pool, object_name, self.read_size)?;

        let mut checksum = Adler32::new();
        for chunk in reader {
            checksum.update(&chunk?);
        }

        let fm_time = stat.mtime;
        let cs_time = i32::try_from(self.clock.now_unix() - fm_time).unwrap_or(i32::MAX);
        let record = ChecksumRecord::new(ALGORITHM, fm_time, cs_time, &checksum.to_hex())?;
        Ok(record)
    }

    /// Returns a checksum for `object_name`, preferring the cached value
    /// unless `force_fileread` is set.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::get_from_metadata`] and [`Self::get_from_file`] errors.
    pub fn get_checksum(&self, pool: &str, object_name: &str, force_fileread: bool) -> Result<ChecksumRecord, ActionsError> {
        if !force_fileread {
            if let Some(record) = self.get_from_metadata(pool, object_name)? {
                return Ok(record);
            }
        }
        self.get_from_file(pool, object_name)
    }

    /// Ensures `object_name` has a cached little-endian checksum record,
    /// computing and writing one if absent, and rewriting an existing
    /// big-endian record in place when `rewrite_big_endian` is set.
    ///
    /// If the xattr write loses a race against a concurrent writer, the
    /// race is treated as success: the now-cached record is re-read and
    /// returned rather than surfacing the write conflict as an error.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::get_from_metadata`] and [`Self::get_from_file`]
    /// errors, and [`ActionsError::Store`] for any xattr write failure other
    /// than a benign already-exists race.
    pub fn inget(&self, pool: &str, object_name: &str, rewrite_big_endian: bool) -> Result<ChecksumRecord, ActionsError> {
        if let Some(existing) = self.get_from_metadata(pool, object_name)? {
            if rewrite_big_endian && existing.read_format() == Some(Endianness::Big) {
                let rewritten = ChecksumRecord::new(
                    existing.name(),
                    existing.fm_time(),
                    existing.cs_time(),
                    &existing.value_hex(),
                )?;
                self.write_record(pool, object_name, &rewritten, true)?;
                return Ok(rewritten);
            }
            return Ok(existing);
        }

        let computed = self.get_from_file(pool, object_name)?;
        match self.write_record(pool, object_name, &computed, false) {
            Ok(()) => Ok(computed),
            Err(ActionsError::Store(ObjectStoreError::XattrAlreadyExists { .. })) => {
                tracing::debug!(object_name, "ingest lost the write race; re-reading cached checksum");
                self.get_from_metadata(pool, object_name)?
                    .ok_or_else(|| ActionsError::Store(ObjectStoreError::NotFound(object_name.to_string())))
            }
            Err(other) => Err(other),
        }
    }

    /// Compares the cached checksum against one freshly computed from the
    /// object's bytes.
    ///
    /// A fresh checksum is only computed when a cached one exists or
    /// `force_fileread` is set; otherwise [`Self::get_from_file`] is never
    /// called. A match is only ever reported when both a cached and a fresh
    /// checksum exist and their values agree.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::get_from_metadata`] and [`Self::get_from_file`] errors.
    pub fn verify(&self, pool: &str, object_name: &str, force_fileread: bool) -> Result<Option<ChecksumRecord>, ActionsError> {
        let stored = self.get_from_metadata(pool, object_name)?;

        let file = if stored.is_some() || force_fileread {
            Some(self.get_from_file(pool, object_name)?)
        } else {
            None
        };

        let matching = match (&stored, &file) {
            (Some(s), Some(f)) => s.value_hex() == f.value_hex(),
            _ => false,
        };

        if !matching {
            tracing::info!(
                object_name,
                stored = stored.as_ref().map(ChecksumRecord::value_hex),
                file = file.as_ref().map(ChecksumRecord::value_hex),
                "checksum verification did not match"
            );
        }

        Ok(if matching { stored } else { None })
    }

    fn write_record(&self, pool: &str, object_name: &str, record: &ChecksumRecord, force: bool) -> Result<(), ActionsError> {
        let chunk0 = objectstore::chunk_name(object_name, 0);
        write_xattr_checked(self.client, pool, &chunk0, &xattr_key(), &record.encode(), force)?;
        Ok(())
    }
}
