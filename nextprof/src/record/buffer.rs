//! Fixed-size byte arena with a write cursor
//!
//! Appends never grow the arena and never check capacity beyond a debug
//! assertion: callers reserve room with [`RecordBuffer::remaining`] (through
//! `RecordSink::ensure_space`) before encoding a record.

/// Owned byte arena; bytes `[0, head)` are filled.
#[derive(Debug)]
pub struct RecordBuffer {
    data: Box<[u8]>,
    head: usize,
}

macro_rules! append_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self, value: $ty) {
                self.append_bytes(&value.to_le_bytes());
            }
        )*
    };
}

impl RecordBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            head: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.head
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head == 0
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.head
    }

    /// The bytes written since the last reset.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.head]
    }

    pub fn reset(&mut self) {
        self.head = 0;
    }

    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(
            bytes.len() <= self.remaining(),
            "append past reserved space"
        );
        let end = self.head + bytes.len();
        self.data[self.head..end].copy_from_slice(bytes);
        self.head = end;
    }

    append_le!(
        append_u8: u8,
        append_u16: u16,
        append_u32: u32,
        append_u64: u64,
        append_i8: i8,
        append_i16: i16,
        append_i32: i32,
        append_i64: i64,
        append_f32: f32,
        append_f64: f64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_little_endian() {
        let mut buf = RecordBuffer::new(64);
        buf.append_u8(0xAB);
        buf.append_u16(0x0102);
        buf.append_u32(0x0304_0506);
        buf.append_i16(-2);
        buf.append_f32(1.0);
        assert_eq!(
            buf.filled(),
            &[0xAB, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0xFE, 0xFF, 0x00, 0x00, 0x80, 0x3F]
        );
        assert_eq!(buf.remaining(), 64 - 13);
    }

    #[test]
    fn test_wide_scalars() {
        let mut buf = RecordBuffer::new(32);
        buf.append_u64(1);
        buf.append_i64(-1);
        buf.append_i32(i32::MIN);
        buf.append_i8(-128);
        buf.append_f64(-0.0);
        assert_eq!(buf.len(), 8 + 8 + 4 + 1 + 8);
        assert_eq!(&buf.filled()[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&buf.filled()[8..16], &[0xFF; 8]);
        assert_eq!(&buf.filled()[16..20], &[0, 0, 0, 0x80]);
        assert_eq!(buf.filled()[20], 0x80);
        assert_eq!(buf.filled()[28], 0x80);
    }

    #[test]
    fn test_reset_rewinds_cursor() {
        let mut buf = RecordBuffer::new(8);
        buf.append_bytes(b"abcdefgh");
        assert_eq!(buf.remaining(), 0);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.remaining(), 8);
    }
}
