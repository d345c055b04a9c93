#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the two binary-compatibility primitives the rest of
//! the daemon builds on: the incremental Adler-32 accumulator used to
//! compute a striped object's checksum, and the fixed-size metadata record
//! that checksum is stored in.
//!
//! # Design
//!
//! - [`adler`] implements the streaming checksum (`Adler32`) used while
//!   reading an object's stripes.
//! - [`record`] implements [`record::ChecksumRecord`], the 96-byte
//!   little-endian-primary, big-endian-fallback binary layout persisted as a
//!   striped object's extended attribute.
//!
//! # Invariants
//!
//! - [`adler::Adler32::update`] never panics and produces the same final
//!   value regardless of how the caller chunks its input.
//! - [`record::ChecksumRecord::decode`] only accepts little- or big-endian
//!   layouts whose modification time is a plausible calendar timestamp;
//!   anything else is rejected rather than silently misread.
//!
//! # Errors
//!
//! [`adler::ChecksumError`] reports an attempt to finalize an empty stream.
//! [`record::RecordError`] reports malformed or ambiguous binary records.
//!
//! # Examples
//!
//! ```
//! use checksums::adler::Adler32;
//! use checksums::record::ChecksumRecord;
//!
//! let mut checksum = Adler32::new();
//! checksum.update(b"striped object bytes");
//! let hex = checksum.to_hex();
//!
//! let record = ChecksumRecord::new("adler32", 1_700_000_000, 0, &hex).unwrap();
//! let decoded = ChecksumRecord::decode(&record.encode()).unwrap();
//! assert_eq!(decoded.value_hex(), hex);
//! ```

/// Incremental Adler-32 checksum accumulator.
pub mod adler;
/// Fixed-size binary checksum metadata record.
pub mod record;
