use core::fmt;

/// Maximum length, in bytes, of a checksum algorithm name (including the
/// implicit NUL terminator reserved by the final byte of the name field).
pub const NAME_SIZE: usize = 16;

/// Maximum length, in bytes, of a stored checksum value (512 bits).
pub const VALUE_SIZE: usize = 64;

/// Size in bytes of the on-disk / on-wire checksum metadata record:
/// `name[16] + fm_time(i64) + cs_time(i32) + reserved_a(u16) + reserved_b(u8)
/// + length(u8) + value[64]`.
pub const RECORD_SIZE: usize = NAME_SIZE + 8 + 4 + 2 + 1 + 1 + VALUE_SIZE;

/// Byte order a [`ChecksumRecord`] was decoded with, or will be encoded with.
///
/// Little-endian is the format this implementation always writes. Big-endian
/// records are only ever produced by older writers and are accepted on read
/// so existing stripe metadata keeps decoding correctly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
    /// Little-endian field layout, the format written by this implementation.
    Little,
    /// Big-endian field layout, accepted for backward compatibility on read.
    Big,
}

/// Errors that can occur while encoding or decoding a [`ChecksumRecord`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordError {
    /// The input buffer was not exactly [`RECORD_SIZE`] bytes long.
    WrongLength {
        /// Length of the buffer that was supplied.
        found: usize,
    },
    /// Neither little-endian nor big-endian decoding produced a plausible
    /// timestamp, so the buffer is not a valid record in either byte order.
    Unparseable,
    /// The algorithm name field was empty, was not valid ASCII, or exceeded
    /// [`NAME_SIZE`] - 1 characters.
    InvalidName,
    /// The checksum value's declared length exceeded [`VALUE_SIZE`].
    ValueTooLong {
        /// The declared length of the checksum value.
        len: usize,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { found } => write!(
                f,
                "checksum record requires exactly {RECORD_SIZE} bytes, found {found}"
            ),
            Self::Unparseable => write!(
                f,
                "checksum record timestamp is implausible in both little- and big-endian layouts"
            ),
            Self::InvalidName => write!(f, "checksum record name is empty or not valid ASCII"),
            Self::ValueTooLong { len } => write!(
                f,
                "checksum value length {len} exceeds the {VALUE_SIZE}-byte field"
            ),
        }
    }
}

impl std::error::Error for RecordError {}

/// A fixed-size checksum metadata record, stored as a striped object's
/// extended attribute.
///
/// The layout mirrors XRootD's `XrdCksData` structure: a NUL-padded
/// algorithm name, the file's modification time and the delta since that
/// time when the checksum was computed, two reserved fields, a declared
/// value length, and a fixed-size value buffer holding only the first
/// `length` bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChecksumRecord {
    name: String,
    /// File modification time, as whole seconds since the Unix epoch (UTC).
    fm_time: i64,
    /// Seconds elapsed between `fm_time` and when the checksum was computed.
    cs_time: i32,
    value: Vec<u8>,
    /// Byte order the record was decoded with, if it came from [`Self::decode`].
    read_format: Option<Endianness>,
}

/// Earliest plausible `fm_time`: 2000-01-01T00:00:00Z. Timestamps older than
/// this in either byte order are treated as decode noise rather than as a
/// real file modification time.
const PLAUSIBLE_EPOCH_FLOOR: i64 = 946_684_800;

/// Latest plausible `fm_time`: 2100-01-01T00:00:00Z.
const PLAUSIBLE_EPOCH_CEILING: i64 = 4_102_444_800;

impl ChecksumRecord {
    /// Builds a new record from an algorithm name, timestamps, and a
    /// checksum value given as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidName`] if `name` is empty, exceeds
    /// [`NAME_SIZE`] - 1 bytes, or contains non-ASCII characters, and
    /// [`RecordError::ValueTooLong`] if the decoded value exceeds
    /// [`VALUE_SIZE`] bytes.
    pub fn new(name: &str, fm_time: i64, cs_time: i32, value_hex: &str) -> Result<Self, RecordError> {
        if name.is_empty() || name.len() > NAME_SIZE - 1 || !name.is_ascii() {
            return Err(RecordError::InvalidName);
        }

        let value = decode_hex(value_hex).ok_or(RecordError::InvalidName)?;
        if value.len() > VALUE_SIZE {
            return Err(RecordError::ValueTooLong { len: value.len() });
        }

        Ok(Self {
            name: name.to_ascii_lowercase(),
            fm_time,
            cs_time,
            value,
            read_format: None,
        })
    }

    /// The checksum algorithm name, always lowercase.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File modification time, in whole seconds since the Unix epoch (UTC).
    #[must_use]
    pub const fn fm_time(&self) -> i64 {
        self.fm_time
    }

    /// Seconds elapsed between `fm_time` and when the checksum was computed.
    #[must_use]
    pub const fn cs_time(&self) -> i32 {
        self.cs_time
    }

    /// The checksum value as a lowercase hex string.
    #[must_use]
    pub fn value_hex(&self) -> String {
        encode_hex(&self.value)
    }

    /// The raw checksum value bytes.
    #[must_use]
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }

    /// The byte order this record was decoded with, if it came from
    /// [`Self::decode`] rather than [`Self::new`].
    #[must_use]
    pub const fn read_format(&self) -> Option<Endianness> {
        self.read_format
    }

    /// Encodes this record into the fixed [`RECORD_SIZE`]-byte little-endian
    /// layout that this implementation always writes.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let mut cursor = 0;

        let name_bytes = self.name.as_bytes();
        out[cursor..cursor + name_bytes.len()].copy_from_slice(name_bytes);
        cursor += NAME_SIZE;

        out[cursor..cursor + 8].copy_from_slice(&self.fm_time.to_le_bytes());
        cursor += 8;

        out[cursor..cursor + 4].copy_from_slice(&self.cs_time.to_le_bytes());
        cursor += 4;

        // Reserved fields stay zeroed.
        cursor += 2 + 1;

        out[cursor] = self.value.len() as u8;
        cursor += 1;

        out[cursor..cursor + self.value.len()].copy_from_slice(&self.value);

        out
    }

    /// Decodes a record from exactly [`RECORD_SIZE`] bytes.
    ///
    /// Little-endian decoding is attempted first. If the resulting `fm_time`
    /// is not a plausible calendar timestamp, big-endian decoding is tried
    /// next. If neither produces a plausible timestamp, decoding fails
    /// rather than silently returning garbage fields.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::WrongLength`] if `bytes` is not exactly
    /// [`RECORD_SIZE`] long, [`RecordError::Unparseable`] if no byte order
    /// yields a plausible timestamp, [`RecordError::InvalidName`] if the
    /// decoded name is empty or not valid ASCII, and
    /// [`RecordError::ValueTooLong`] if the declared value length exceeds
    /// [`VALUE_SIZE`].
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordError::WrongLength { found: bytes.len() });
        }

        if let Some(record) = Self::try_decode_as(bytes, Endianness::Little)? {
            return Ok(record);
        }
        if let Some(record) = Self::try_decode_as(bytes, Endianness::Big)? {
            return Ok(record);
        }
        Err(RecordError::Unparseable)
    }

    /// Attempts to decode `bytes` in the given byte order, returning `Ok(None)`
    /// if the resulting `fm_time` is implausible (so the caller can try the
    /// other byte order) rather than an error.
    fn try_decode_as(bytes: &[u8], endianness: Endianness) -> Result<Option<Self>, RecordError> {
        let name_raw = &bytes[0..NAME_SIZE];
        let name_end = name_raw.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        let name = std::str::from_utf8(&name_raw[..name_end]).map_err(|_| RecordError::InvalidName)?;

        let fm_time_bytes: [u8; 8] = bytes[16..24].try_into().expect("slice is 8 bytes");
        let cs_time_bytes: [u8; 4] = bytes[24..28].try_into().expect("slice is 4 bytes");

        let (fm_time, cs_time) = match endianness {
            Endianness::Little => (
                i64::from_le_bytes(fm_time_bytes),
                i32::from_le_bytes(cs_time_bytes),
            ),
            Endianness::Big => (
                i64::from_be_bytes(fm_time_bytes),
                i32::from_be_bytes(cs_time_bytes),
            ),
        };

        if !(PLAUSIBLE_EPOCH_FLOOR..=PLAUSIBLE_EPOCH_CEILING).contains(&fm_time) {
            return Ok(None);
        }

        let length = bytes[31] as usize;
        if length > VALUE_SIZE {
            return Err(RecordError::ValueTooLong { len: length });
        }

        if name.is_empty() || !name.is_ascii() {
            return Err(RecordError::InvalidName);
        }

        let value = bytes[32..32 + length].to_vec();

        Ok(Some(Self {
            name: name.to_ascii_lowercase(),
            fm_time,
            cs_time,
            value,
            read_format: Some(endianness),
        }))
    }
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
