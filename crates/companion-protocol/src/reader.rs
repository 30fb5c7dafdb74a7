//! Length-checked frame cursor.

use crate::error::ProtocolError;

/// Sequential little-endian reader over one frame.
///
/// Every read checks the remaining length first and reports a
/// [`ProtocolError::FrameTooShort`] naming the frame kind, so no decode path
/// can index out of bounds. Lengths in errors are whole-frame lengths.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    kind: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Reader positioned at the start of `buf`.
    pub fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        FrameReader { kind, buf, pos: 0 }
    }

    /// Reader positioned just after the discriminator byte.
    pub fn after_code(kind: &'static str, frame: &'a [u8]) -> Self {
        FrameReader {
            kind,
            buf: frame,
            pos: frame.len().min(1),
        }
    }

    /// Current offset into the frame.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless at least `n` more bytes are available.
    pub fn require(&self, n: usize) -> Result<(), ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::FrameTooShort {
                kind: self.kind,
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.require(n)?;
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Skip `n` reserved bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    /// Take a fixed-size array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Read a `u32` only if four bytes remain.
    pub fn opt_u32(&mut self) -> Option<u32> {
        if self.remaining() >= 4 {
            self.u32().ok()
        } else {
            None
        }
    }

    /// Read a fixed-width zero-padded string field.
    pub fn fixed_str(&mut self, width: usize) -> Result<String, ProtocolError> {
        Ok(decode_str(self.take(width)?))
    }

    /// Everything left in the frame.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Everything left in the frame, as text.
    pub fn rest_str(&mut self) -> String {
        decode_str(self.rest())
    }
}

/// Decode a string field: cut at the first NUL, replace invalid UTF-8 and
/// strip trailing control characters.
pub fn decode_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches(|c: char| c.is_control())
        .to_string()
}

/// Encode a string into a fixed-width zero-padded field, truncating
/// oversized input at a character boundary.
pub fn encode_fixed_str(value: &str, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    out.extend_from_slice(truncate_utf8(value, width).as_bytes());
    out.resize(width, 0);
    out
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a
/// character.
pub fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let frame = [0x09, 0x78, 0x56, 0x34, 0x12, 0xFE, 0xFF];
        let mut reader = FrameReader::after_code("time", &frame);
        assert_eq!(reader.u32().unwrap(), 0x1234_5678);
        assert_eq!(reader.i16().unwrap(), -2);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_short_read_reports_kind_and_lengths() {
        let frame = [0x09, 0x01];
        let mut reader = FrameReader::after_code("current time", &frame);
        let err = reader.u32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FrameTooShort {
                kind: "current time",
                expected: 5,
                actual: 2
            }
        );
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_after_code_on_empty_frame() {
        let mut reader = FrameReader::after_code("empty", &[]);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.u8().is_err());
        assert!(reader.rest().is_empty());
    }

    #[test]
    fn test_decode_str_trims_padding_and_control() {
        assert_eq!(decode_str(b"node\0\0\0\0"), "node");
        assert_eq!(decode_str(b"hello\r\n"), "hello");
        assert_eq!(decode_str(b"\0abc"), "");
    }

    #[test]
    fn test_encode_fixed_str_pads_and_truncates() {
        assert_eq!(encode_fixed_str("ab", 4), vec![b'a', b'b', 0, 0]);
        assert_eq!(encode_fixed_str("abcdef", 4), b"abcd".to_vec());
        // "é" is two bytes; it must not be split.
        assert_eq!(encode_fixed_str("aé", 2), vec![b'a', 0]);
    }
}
