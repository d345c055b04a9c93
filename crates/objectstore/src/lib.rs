#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `objectstore` models a striped object: a logical file stored as a
//! sequence of fixed-size chunks inside a backend pool, addressed by a
//! shared name suffixed with a 16-hex-digit chunk counter. Chunk zero also
//! carries the extended attributes that describe striping geometry and hold
//! any cached checksum metadata.
//!
//! The crate does not talk to a storage backend directly; it is generic over
//! the [`ObjectStoreClient`] trait, which a concrete backend implements. This
//! keeps the striping and chunk-addressing logic testable without a live
//! backend and lets the connection pool inject whichever client handle is
//! next in rotation.
//!
//! # Design
//!
//! - [`chunk_name`] derives the backend object name for a given chunk index.
//! - [`StriperXattrs`] reads and derives the striping geometry
//!   (`num_stripes`, `last_stripe_size`) from chunk zero's extended
//!   attributes.
//! - [`StripeReader`] is a finite iterator over a striped object's bytes,
//!   reading across chunk boundaries in caller-specified read sizes and
//!   stopping at an explicit end condition rather than relying on a
//!   backend-specific not-found signal to terminate the sequence.
//!
//! # Invariants
//!
//! - Chunk zero (suffix `.0000000000000000`) always exists if the object
//!   exists at all; it anchors both the data and the striping xattrs.
//! - [`StripeReader`] never yields more bytes than [`StriperXattrs::total_size`]
//!   declares, even if the backend returns a short final chunk.
//! - [`StriperXattrs::num_stripes`] is always `ceil(total_size / object_size)`
//!   and is at least 1 once an object has any data.
//!
//! # Errors
//!
//! [`ObjectStoreError`] distinguishes backend I/O failures from structural
//! problems (missing xattrs, a chunk vanishing mid-read) so callers can
//! choose how to map each case onto a response status.
//!
//! # Examples
//!
//! ```
//! use objectstore::chunk_name;
//!
//! assert_eq!(chunk_name("myobject", 0), "myobject.0000000000000000");
//! assert_eq!(chunk_name("myobject", 3), "myobject.0000000000000003");
//! ```

use std::collections::HashMap;

/// Extended attribute key holding the configured per-chunk object size.
pub const XATTR_OBJECT_SIZE: &str = "striper.layout.object_size";

/// Extended attribute key holding the object's total logical size.
pub const XATTR_TOTAL_SIZE: &str = "striper.size";

/// Errors raised while addressing, stat-ing, or reading a striped object.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// The requested object (or one of its chunks) does not exist.
    #[error("object {0:?} not found")]
    NotFound(String),
    /// An extended attribute required to describe striping geometry was absent.
    #[error("object {object:?} is missing the {key:?} extended attribute")]
    MissingXattr {
        /// The object that was stat-ed.
        object: String,
        /// The missing attribute's key.
        key: String,
    },
    /// An extended attribute could not be parsed as the expected type.
    #[error("extended attribute {key:?} on {object:?} has an invalid value")]
    InvalidXattr {
        /// The object that was stat-ed.
        object: String,
        /// The attribute whose value failed to parse.
        key: String,
    },
    /// An xattr write with `force = false` found the attribute already present.
    #[error("extended attribute {key:?} on {object:?} already exists")]
    XattrAlreadyExists {
        /// The object the xattr belongs to.
        object: String,
        /// The attribute key that already existed.
        key: String,
    },
    /// The backend reported an I/O failure.
    #[error("backend I/O error for {object:?}: {message}")]
    Backend {
        /// The object the operation targeted.
        object: String,
        /// A backend-supplied description of the failure.
        message: String,
    },
    /// Fewer bytes were read than the object's declared total size promised.
    #[error("mismatch in bytes read for {object:?}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// The object being read.
        object: String,
        /// Bytes the object's metadata promised.
        expected: u64,
        /// Bytes actually read before the stream ended.
        actual: u64,
    },
}

/// Point-in-time metadata about an object, as reported by chunk zero's stat.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ObjectStat {
    /// Size in bytes of chunk zero itself (not the logical striped total).
    pub chunk0_size: u64,
    /// Modification time of chunk zero, in whole seconds since the Unix epoch.
    pub mtime: i64,
}

/// Backend capability a pooled connection must provide.
///
/// Implementations talk to whatever underlying object store backs a pool
/// (a real distributed store in production, an in-memory fake in tests).
/// Bounded by `Sync` as well as `Send` since pooled handles are shared
/// across concurrently dispatched worker tasks, not checked out exclusively.
pub trait ObjectStoreClient: Send + Sync {
    /// Stats a single backend object (not a whole striped object).
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NotFound`] if the object does not exist,
    /// or [`ObjectStoreError::Backend`] for other backend failures.
    fn stat(&self, pool: &str, oid: &str) -> Result<ObjectStat, ObjectStoreError>;

    /// Reads an extended attribute, returning `Ok(None)` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Backend`] on backend failure.
    fn get_xattr(&self, pool: &str, oid: &str, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError>;

    /// Sets an extended attribute, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Backend`] on backend failure.
    fn set_xattr(&self, pool: &str, oid: &str, key: &str, value: &[u8]) -> Result<(), ObjectStoreError>;

    /// Removes an extended attribute. A no-op if it is already absent.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Backend`] on backend failure.
    fn remove_xattr(&self, pool: &str, oid: &str, key: &str) -> Result<(), ObjectStoreError>;

    /// Reads up to `len` bytes starting at `offset`, returning fewer than
    /// `len` bytes (including zero) only at the object's end.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NotFound`] if the object does not exist,
    /// or [`ObjectStoreError::Backend`] for other backend failures.
    fn read(&self, pool: &str, oid: &str, offset: u64, len: usize) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Derives the backend object name for the chunk at `index` within a striped object.
///
/// # Examples
///
/// ```
/// use objectstore::chunk_name;
///
/// assert_eq!(chunk_name("run1/file.dat", 0), "run1/file.dat.0000000000000000");
/// ```
#[must_use]
pub fn chunk_name(object_name: &str, index: u64) -> String {
    format!("{object_name}.{index:016x}")
}

/// Writes an extended attribute with explicit overwrite semantics.
///
/// If `force` is `false` and the attribute is already present, the write is
/// rejected; callers that always want the latest value should pass `force =
/// true`, which removes any existing value before setting the new one.
///
/// # Errors
///
/// Returns [`ObjectStoreError::XattrAlreadyExists`] if `force` is `false` and
/// the attribute already exists, otherwise propagates backend errors.
pub fn write_xattr_checked(
    client: &dyn ObjectStoreClient,
    pool: &str,
    oid: &str,
    key: &str,
    value: &[u8],
    force: bool,
) -> Result<(), ObjectStoreError> {
    let existing = client.get_xattr(pool, oid, key)?;
    if existing.is_some() {
        if !force {
            return Err(ObjectStoreError::XattrAlreadyExists {
                object: oid.to_string(),
                key: key.to_string(),
            });
        }
        client.remove_xattr(pool, oid, key)?;
    }
    client.set_xattr(pool, oid, key, value)
}

/// Striping geometry for an object, derived from chunk zero's extended attributes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StriperXattrs {
    /// Configured size, in bytes, of every chunk except possibly the last.
    pub object_size: u64,
    /// Total logical size of the striped object, across all chunks.
    pub total_size: u64,
}

impl StriperXattrs {
    /// Reads the striping xattrs from chunk zero of `object_name` in `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::MissingXattr`] if either xattr is absent,
    /// and [`ObjectStoreError::InvalidXattr`] if a value is not a valid
    /// little-endian `u64`.
    pub fn read(client: &dyn ObjectStoreClient, pool: &str, object_name: &str) -> Result<Self, ObjectStoreError> {
        let chunk0 = chunk_name(object_name, 0);

        let object_size = read_u64_xattr(client, pool, &chunk0, XATTR_OBJECT_SIZE)?;
        let total_size = read_u64_xattr(client, pool, &chunk0, XATTR_TOTAL_SIZE)?;

        Ok(Self {
            object_size,
            total_size,
        })
    }

    /// Number of chunks the object is striped across, `ceil(total_size / object_size)`.
    ///
    /// Returns 0 only when `total_size` is itself 0.
    #[must_use]
    pub const fn num_stripes(&self) -> u64 {
        if self.total_size == 0 || self.object_size == 0 {
            return 0;
        }
        self.total_size.div_ceil(self.object_size)
    }

    /// Size in bytes of the final chunk.
    ///
    /// Equals [`Self::object_size`] when the total size divides evenly.
    #[must_use]
    pub const fn last_stripe_size(&self) -> u64 {
        if self.object_size == 0 {
            return 0;
        }
        let remainder = self.total_size % self.object_size;
        if remainder == 0 && self.total_size > 0 {
            self.object_size
        } else {
            remainder
        }
    }
}

fn read_u64_xattr(
    client: &dyn ObjectStoreClient,
    pool: &str,
    oid: &str,
    key: &str,
) -> Result<u64, ObjectStoreError> {
    let raw = client.get_xattr(pool, oid, key)?.ok_or_else(|| ObjectStoreError::MissingXattr {
        object: oid.to_string(),
        key: key.to_string(),
    })?;

    let text = std::str::from_utf8(&raw).map_err(|_| ObjectStoreError::InvalidXattr {
        object: oid.to_string(),
        key: key.to_string(),
    })?;

    text.trim().parse().map_err(|_| ObjectStoreError::InvalidXattr {
        object: oid.to_string(),
        key: key.to_string(),
    })
}

/// Stats chunk zero of a striped object, reporting its size and modification time.
///
/// # Errors
///
/// Returns [`ObjectStoreError::NotFound`] if chunk zero does not exist.
pub fn stat_object(client: &dyn ObjectStoreClient, pool: &str, object_name: &str) -> Result<ObjectStat, ObjectStoreError> {
    client.stat(pool, &chunk_name(object_name, 0))
}

/// Finite, lazily-evaluated reader over a striped object's bytes.
///
/// Unlike a generator relying on a not-found signal from the backend to
/// terminate, this iterator is bounded up front by [`StriperXattrs::total_size`]
/// and [`StriperXattrs::num_stripes`]; it always has an explicit end and
/// never needs to interpret a backend error as "end of stream".
pub struct StripeReader<'a> {
    client: &'a dyn ObjectStoreClient,
    pool: String,
    object_name: String,
    xattrs: StriperXattrs,
    read_size: usize,
    stripe_index: u64,
    offset_in_stripe: u64,
    bytes_remaining: u64,
}

impl<'a> StripeReader<'a> {
    /// Creates a reader over `object_name`, pulling striping geometry from
    /// chunk zero's xattrs and reading `read_size`-byte windows at a time.
    ///
    /// # Errors
    ///
    /// Propagates [`StriperXattrs::read`]'s errors.
    pub fn new(client: &'a dyn ObjectStoreClient, pool: &str, object_name: &str, read_size: usize) -> Result<Self, ObjectStoreError> {
        let xattrs = StriperXattrs::read(client, pool, object_name)?;
        Ok(Self {
            client,
            pool: pool.to_string(),
            object_name: object_name.to_string(),
            bytes_remaining: xattrs.total_size,
            xattrs,
            read_size: read_size.max(1),
            stripe_index: 0,
            offset_in_stripe: 0,
        })
    }

    /// Total logical size of the object being read.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.xattrs.total_size
    }
}

impl Iterator for StripeReader<'_> {
    type Item = Result<Vec<u8>, ObjectStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes_remaining == 0 {
            return None;
        }

        if self.stripe_index >= self.xattrs.num_stripes() {
            let expected = self.xattrs.total_size;
            let actual = expected - self.bytes_remaining;
            self.bytes_remaining = 0;
            return Some(Err(ObjectStoreError::ShortRead {
                object: self.object_name.clone(),
                expected,
                actual,
            }));
        }

        let stripe_size = if self.stripe_index + 1 == self.xattrs.num_stripes() {
            self.xattrs.last_stripe_size()
        } else {
            self.xattrs.object_size
        };

        let want = (self.read_size as u64)
            .min(stripe_size - self.offset_in_stripe)
            .min(self.bytes_remaining);

        if want == 0 {
            self.stripe_index += 1;
            self.offset_in_stripe = 0;
            return self.next();
        }

        let oid = chunk_name(&self.object_name, self.stripe_index);
        let bytes = match self.client.read(&self.pool, &oid, self.offset_in_stripe, want as usize) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.bytes_remaining = 0;
                return Some(Err(err));
            }
        };

        if bytes.is_empty() {
            let expected = self.xattrs.total_size;
            let actual = expected - self.bytes_remaining;
            self.bytes_remaining = 0;
            return Some(Err(ObjectStoreError::ShortRead {
                object: self.object_name.clone(),
                expected,
                actual,
            }));
        }

        self.offset_in_stripe += bytes.len() as u64;
        self.bytes_remaining -= bytes.len() as u64;

        if self.offset_in_stripe >= stripe_size {
            self.stripe_index += 1;
            self.offset_in_stripe = 0;
        }

        Some(Ok(bytes))
    }
}

/// Reference in-memory backend used by tests and by the daemon's test fixtures.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: std::sync::Mutex<HashMap<(String, String), Vec<u8>>>,
    xattrs: std::sync::Mutex<HashMap<(String, String, String), Vec<u8>>>,
    mtimes: std::sync::Mutex<HashMap<(String, String), i64>>,
}

impl MemoryObjectStore {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a chunk's contents and modification time.
    pub fn put_chunk(&self, pool: &str, oid: &str, data: Vec<u8>, mtime: i64) {
        self.objects.lock().unwrap().insert((pool.to_string(), oid.to_string()), data);
        self.mtimes.lock().unwrap().insert((pool.to_string(), oid.to_string()), mtime);
    }
}

impl ObjectStoreClient for MemoryObjectStore {
    fn stat(&self, pool: &str, oid: &str) -> Result<ObjectStat, ObjectStoreError> {
        let objects = self.objects.lock().unwrap();
        let data = objects.get(&(pool.to_string(), oid.to_string())).ok_or_else(|| ObjectStoreError::NotFound(oid.to_string()))?;
        let mtime = *self.mtimes.lock().unwrap().get(&(pool.to_string(), oid.to_string())).unwrap_or(&0);
        Ok(ObjectStat {
            chunk0_size: data.len() as u64,
            mtime,
        })
    }

    fn get_xattr(&self, pool: &str, oid: &str, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        Ok(self
            .xattrs
            .lock()
            .unwrap()
            .get(&(pool.to_string(), oid.to_string(), key.to_string()))
            .cloned())
    }

    fn set_xattr(&self, pool: &str, oid: &str, key: &str, value: &[u8]) -> Result<(), ObjectStoreError> {
        self.xattrs
            .lock()
            .unwrap()
            .insert((pool.to_string(), oid.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn remove_xattr(&self, pool: &str, oid: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.xattrs.lock().unwrap().remove(&(pool.to_string(), oid.to_string(), key.to_string()));
        Ok(())
    }

    fn read(&self, pool: &str, oid: &str, offset: u64, len: usize) -> Result<Vec<u8>, ObjectStoreError> {
        let objects = self.objects.lock().unwrap();
        let data = objects.get(&(pool.to_string(), oid.to_string())).ok_or_else(|| ObjectStoreError::NotFound(oid.to_string()))?;
        let start = (offset as usize).min(data.len());
        let end = (start + len).min(data.len());
        Ok(data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(total: u64, object_size: u64) -> (MemoryObjectStore, String) {
        let store = MemoryObjectStore::new();
        let name = "obj".to_string();
        let mut remaining = total;
        let mut index = 0u64;
        while remaining > 0 {
            let this_len = remaining.min(object_size) as usize;
            let data = vec![(index % 251) as u8; this_len];
            store.put_chunk("pool", &chunk_name(&name, index), data, 1_700_000_000);
            remaining -= this_len as u64;
            index += 1;
        }
        store.set_xattr("pool", &chunk_name(&name, 0), XATTR_OBJECT_SIZE, object_size.to_string().as_bytes()).unwrap();
        store.set_xattr("pool", &chunk_name(&name, 0), XATTR_TOTAL_SIZE, total.to_string().as_bytes()).unwrap();
        (store, name)
    }

    #[test]
    fn chunk_name_formats_sixteen_hex_digits() {
        assert_eq!(chunk_name("x", 255), "x.00000000000000ff");
    }

    #[test]
    fn striper_xattrs_derive_num_stripes_and_last_stripe_size() {
        let (store, name) = fixture(25, 10);
        let xattrs = StriperXattrs::read(&store, "pool", &name).unwrap();
        assert_eq!(xattrs.num_stripes(), 3);
        assert_eq!(xattrs.last_stripe_size(), 5);
    }

    #[test]
    fn striper_xattrs_last_stripe_equals_object_size_when_even() {
        let (store, name) = fixture(20, 10);
        let xattrs = StriperXattrs::read(&store, "pool", &name).unwrap();
        assert_eq!(xattrs.num_stripes(), 2);
        assert_eq!(xattrs.last_stripe_size(), 10);
    }

    #[test]
    fn missing_xattr_is_reported() {
        let store = MemoryObjectStore::new();
        store.put_chunk("pool", &chunk_name("obj", 0), vec![1, 2, 3], 0);
        let err = StriperXattrs::read(&store, "pool", "obj").unwrap_err();
        assert!(matches!(err, ObjectStoreError::MissingXattr { .. }));
    }

    #[test]
    fn stripe_reader_reassembles_full_object_across_chunks() {
        let (store, name) = fixture(25, 10);
        let reader = StripeReader::new(&store, "pool", &name, 4).unwrap();
        let mut collected = Vec::new();
        for chunk in reader {
            collected.extend(chunk.unwrap());
        }
        assert_eq!(collected.len(), 25);
    }

    #[test]
    fn stripe_reader_reports_short_read_when_backend_truncates() {
        let store = MemoryObjectStore::new();
        let name = "obj".to_string();
        // Declare a total size larger than what chunk zero actually holds.
        store.put_chunk("pool", &chunk_name(&name, 0), vec![0u8; 5], 0);
        store.set_xattr("pool", &chunk_name(&name, 0), XATTR_OBJECT_SIZE, b"10").unwrap();
        store.set_xattr("pool", &chunk_name(&name, 0), XATTR_TOTAL_SIZE, b"10").unwrap();

        let reader = StripeReader::new(&store, "pool", &name, 4).unwrap();
        let results: Vec<_> = reader.collect();
        assert!(results.iter().any(Result::is_err));
    }

    #[test]
    fn write_xattr_checked_rejects_overwrite_without_force() {
        let store = MemoryObjectStore::new();
        write_xattr_checked(&store, "pool", "obj.0", "k", b"v1", false).unwrap();
        let err = write_xattr_checked(&store, "pool", "obj.0", "k", b"v2", false).unwrap_err();
        assert!(matches!(err, ObjectStoreError::XattrAlreadyExists { .. }));
    }

    #[test]
    fn write_xattr_checked_overwrites_with_force() {
        let store = MemoryObjectStore::new();
        write_xattr_checked(&store, "pool", "obj.0", "k", b"v1", false).unwrap();
        write_xattr_checked(&store, "pool", "obj.0", "k", b"v2", true).unwrap();
        assert_eq!(store.get_xattr("pool", "obj.0", "k").unwrap().unwrap(), b"v2");
    }
}
