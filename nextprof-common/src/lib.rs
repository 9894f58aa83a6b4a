//! # Record Stream Format (profiler ↔ readers)
//!
//! Defines the binary record stream written by the sampler and consumed by
//! host-side readers. The stream is a plain concatenation of records with no
//! global header, so a file sink and a socket sink carry identical bytes and a
//! reader can start at any record boundary.
//!
//! ## Layout
//!
//! Every integer is little-endian.
//!
//! ```text
//! header     u32   'N' | 'P' << 8 | kind << 16
//! ── kind 1 (sample) ───────────────────────────────
//! thread_id  u32
//! pc         u32
//! lr         u32
//! stack_size u32
//! stack      u8[stack_size]
//! ── any other kind ────────────────────────────────
//! length     u32   payload length in bytes
//! payload    u8[length]
//! ```
//!
//! Sample records predate the length rule and keep their original layout;
//! their `stack_size` field doubles as the variable-length part. Every record
//! kind added later must carry the length word so older readers can skip it.
//!
//! ## Key Types
//!
//! - [`SampleRecord`] - One thread snapshot (pc, lr, raw stack slice)
//! - [`Record`] - A decoded record of any kind
//! - [`RecordReader`] - Zero-copy iterator over a byte stream

#![no_std]

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

// ============================================================================
// Header Constants
// ============================================================================

/// Two-byte magic at the start of every record header.
pub const RECORD_MAGIC: [u8; 2] = *b"NP";

/// Record kind of a thread sample.
pub const RECORD_KIND_SAMPLE: u16 = 1;

/// Size of the header word.
pub const HEADER_SIZE: usize = 4;

/// Size of the length word that follows the header of non-sample records.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed part of a sample record: header, thread id, pc, lr, stack size.
pub const SAMPLE_FIXED_SIZE: usize = HEADER_SIZE + 4 * 4;

/// Pack the magic and a record kind into a header word.
#[must_use]
pub const fn record_header(kind: u16) -> u32 {
    (RECORD_MAGIC[0] as u32) | ((RECORD_MAGIC[1] as u32) << 8) | ((kind as u32) << 16)
}

/// Header word of a sample record.
pub const SAMPLE_HEADER: u32 = record_header(RECORD_KIND_SAMPLE);

/// Extract the record kind from a header word, or `None` if the magic is wrong.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn header_kind(header: u32) -> Option<u16> {
    let bytes = header.to_le_bytes();
    if bytes[0] == RECORD_MAGIC[0] && bytes[1] == RECORD_MAGIC[1] {
        Some((header >> 16) as u16)
    } else {
        None
    }
}

// ============================================================================
// Records
// ============================================================================

/// One thread snapshot taken at a sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord<'a> {
    pub thread_id: u32,
    pub pc: u32,
    pub lr: u32,
    /// Raw stack bytes starting at the thread's stack pointer.
    pub stack: &'a [u8],
}

impl SampleRecord<'_> {
    /// Declared stack size as written on the wire.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn stack_size(&self) -> u32 {
        self.stack.len() as u32
    }

    /// Total encoded size of this record in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        SAMPLE_FIXED_SIZE + self.stack.len()
    }

    /// Stack contents interpreted as little-endian words (trailing bytes ignored).
    pub fn stack_words(&self) -> impl Iterator<Item = u32> + '_ {
        self.stack
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }
}

/// A decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Sample(SampleRecord<'a>),
    /// A record kind this reader does not understand, skipped via its length word.
    Unknown { kind: u16, payload: &'a [u8] },
}

// ============================================================================
// Decoding
// ============================================================================

/// Errors produced while walking a record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ends inside a record.
    Truncated { offset: usize, needed: usize },
    /// The header at `offset` does not start with the `NP` magic.
    BadMagic { offset: usize, found: [u8; 2] },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset, needed } => {
                write!(
                    f,
                    "record at offset {offset} truncated ({needed} more bytes needed)"
                )
            }
            Self::BadMagic { offset, found } => {
                write!(
                    f,
                    "bad record magic {:02X}{:02X} at offset {offset}",
                    found[0], found[1]
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Size and end offset of a record starting at `start` made of `fixed` bytes
/// plus a declared `length`. `None` if either overflows `usize`.
fn record_span(start: usize, fixed: usize, length: u32) -> Option<(usize, usize)> {
    let total = fixed.checked_add(usize::try_from(length).ok()?)?;
    Some((total, start.checked_add(total)?))
}

/// Zero-copy iterator over the records of a byte stream.
///
/// Stops after the first error; a partial record at the end of the stream is
/// reported as [`DecodeError::Truncated`].
pub struct RecordReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Byte offset of the next record.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn truncated(&self, at: usize, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            offset: at,
            needed: needed.saturating_sub(self.data.len() - at),
        }
    }

    fn span(&self, start: usize, fixed: usize, length: u32) -> Result<(usize, usize), DecodeError> {
        record_span(start, fixed, length).ok_or(DecodeError::Truncated {
            offset: start,
            needed: usize::MAX,
        })
    }

    fn decode_next(&mut self) -> Result<Record<'a>, DecodeError> {
        let data = self.data;
        let start = self.offset;
        let header = read_u32(data, start).ok_or_else(|| self.truncated(start, HEADER_SIZE))?;
        let Some(kind) = header_kind(header) else {
            let bytes = header.to_le_bytes();
            return Err(DecodeError::BadMagic {
                offset: start,
                found: [bytes[0], bytes[1]],
            });
        };

        if kind == RECORD_KIND_SAMPLE {
            if data.len() - start < SAMPLE_FIXED_SIZE {
                return Err(self.truncated(start, SAMPLE_FIXED_SIZE));
            }
            let field = |index: usize| read_u32(data, start + HEADER_SIZE + index * 4);
            let (Some(thread_id), Some(pc), Some(lr), Some(stack_size)) =
                (field(0), field(1), field(2), field(3))
            else {
                return Err(self.truncated(start, SAMPLE_FIXED_SIZE));
            };
            let (total, end) = self.span(start, SAMPLE_FIXED_SIZE, stack_size)?;
            let stack = data
                .get(start + SAMPLE_FIXED_SIZE..end)
                .ok_or_else(|| self.truncated(start, total))?;
            self.offset = end;
            return Ok(Record::Sample(SampleRecord {
                thread_id,
                pc,
                lr,
                stack,
            }));
        }

        let prefix = HEADER_SIZE + LENGTH_PREFIX_SIZE;
        let length = read_u32(data, start + HEADER_SIZE)
            .ok_or_else(|| self.truncated(start, prefix))?;
        let (total, end) = self.span(start, prefix, length)?;
        let payload = data
            .get(start + prefix..end)
            .ok_or_else(|| self.truncated(start, total))?;
        self.offset = end;
        Ok(Record::Unknown { kind, payload })
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let result = self.decode_next();
        if result.is_err() {
            // Nothing after a malformed record can be trusted
            self.offset = self.data.len();
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(out: &mut [u8], at: &mut usize, value: u32) {
        out[*at..*at + 4].copy_from_slice(&value.to_le_bytes());
        *at += 4;
    }

    #[test]
    fn test_sample_header_bytes() {
        assert_eq!(SAMPLE_HEADER.to_le_bytes(), [b'N', b'P', 1, 0]);
        assert_eq!(header_kind(SAMPLE_HEADER), Some(RECORD_KIND_SAMPLE));
        assert_eq!(header_kind(0x0001_4E4E), None);
    }

    #[test]
    fn test_decode_sample_record() {
        let mut buf = [0u8; 28];
        let mut at = 0;
        push_u32(&mut buf, &mut at, SAMPLE_HEADER);
        push_u32(&mut buf, &mut at, 7);
        push_u32(&mut buf, &mut at, 0x0010_0040);
        push_u32(&mut buf, &mut at, 0x0010_0100);
        push_u32(&mut buf, &mut at, 8);
        push_u32(&mut buf, &mut at, 0xDEAD_BEEF);
        push_u32(&mut buf, &mut at, 0x0012_3456);

        let mut reader = RecordReader::new(&buf);
        let Some(Ok(Record::Sample(sample))) = reader.next() else {
            panic!("expected a sample record");
        };
        assert_eq!(sample.thread_id, 7);
        assert_eq!(sample.pc, 0x0010_0040);
        assert_eq!(sample.lr, 0x0010_0100);
        assert_eq!(sample.stack_size(), 8);
        assert_eq!(sample.encoded_len(), 28);
        let mut words = sample.stack_words();
        assert_eq!(words.next(), Some(0xDEAD_BEEF));
        assert_eq!(words.next(), Some(0x0012_3456));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_unknown_kind_is_skipped_by_length() {
        let mut buf = [0u8; 34];
        let mut at = 0;
        push_u32(&mut buf, &mut at, record_header(9));
        push_u32(&mut buf, &mut at, 6);
        buf[at..at + 6].copy_from_slice(b"future");
        at += 6;
        push_u32(&mut buf, &mut at, SAMPLE_HEADER);
        push_u32(&mut buf, &mut at, 3);
        push_u32(&mut buf, &mut at, 1);
        push_u32(&mut buf, &mut at, 2);
        push_u32(&mut buf, &mut at, 0);

        let mut reader = RecordReader::new(&buf);
        assert_eq!(
            reader.next(),
            Some(Ok(Record::Unknown {
                kind: 9,
                payload: b"future",
            }))
        );
        let Some(Ok(Record::Sample(sample))) = reader.next() else {
            panic!("expected a sample record after the unknown one");
        };
        assert_eq!(sample.thread_id, 3);
        assert!(sample.stack.is_empty());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bad_magic_stops_reader() {
        let buf = [b'X', b'Y', 1, 0, 0, 0, 0, 0];
        let mut reader = RecordReader::new(&buf);
        assert_eq!(
            reader.next(),
            Some(Err(DecodeError::BadMagic {
                offset: 0,
                found: [b'X', b'Y'],
            }))
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_stack_reported() {
        let mut buf = [0u8; 22];
        let mut at = 0;
        push_u32(&mut buf, &mut at, SAMPLE_HEADER);
        push_u32(&mut buf, &mut at, 1);
        push_u32(&mut buf, &mut at, 2);
        push_u32(&mut buf, &mut at, 3);
        push_u32(&mut buf, &mut at, 16);

        let mut reader = RecordReader::new(&buf);
        assert_eq!(
            reader.next(),
            Some(Err(DecodeError::Truncated {
                offset: 0,
                needed: 14,
            }))
        );
    }

    #[test]
    fn test_record_span_overflow() {
        assert_eq!(record_span(8, SAMPLE_FIXED_SIZE, 16), Some((36, 44)));
        assert_eq!(record_span(usize::MAX - 8, SAMPLE_FIXED_SIZE, 0), None);
        assert_eq!(record_span(0, usize::MAX, 1), None);
    }

    #[test]
    fn test_huge_declared_length_is_truncated() {
        let mut buf = [0u8; 28];
        let mut at = 0;
        push_u32(&mut buf, &mut at, SAMPLE_HEADER);
        push_u32(&mut buf, &mut at, 1);
        push_u32(&mut buf, &mut at, 2);
        push_u32(&mut buf, &mut at, 3);
        push_u32(&mut buf, &mut at, u32::MAX);
        push_u32(&mut buf, &mut at, record_header(7));
        push_u32(&mut buf, &mut at, u32::MAX);

        let mut reader = RecordReader::new(&buf);
        assert!(matches!(
            reader.next(),
            Some(Err(DecodeError::Truncated { offset: 0, .. }))
        ));
        assert!(reader.next().is_none());

        let mut reader = RecordReader::new(&buf[20..]);
        assert!(matches!(
            reader.next(),
            Some(Err(DecodeError::Truncated { offset: 0, .. }))
        ));
    }
}
