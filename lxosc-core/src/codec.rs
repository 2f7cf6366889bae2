//! lxosc-core/src/codec.rs
//!
//! Big-endian primitives shared by every OSC value: NUL-terminated strings
//! padded to 4 bytes, length-prefixed blobs and fixed-width numbers.
//! `OscReader` walks a received datagram, the `write_*` helpers go to any
//! `io::Write`.

use std::io::{self, Cursor, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Why a datagram could not be parsed as OSC.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty packet")]
    Empty,

    #[error("truncated packet: needed {needed} bytes at offset {offset}, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("string at offset {0} has no NUL terminator")]
    UnterminatedString(usize),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("address pattern must start with '/', got {0:?}")]
    InvalidAddress(String),

    #[error("type tag string must start with ',', got {0:?}")]
    InvalidTypeTag(String),

    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(char),

    #[error("invalid char code point {0:#x}")]
    InvalidChar(u32),

    #[error("bundle element claims {size} bytes but only {remaining} remain")]
    BundleElementSize { size: usize, remaining: usize },

    #[error("bundles nested deeper than {0} levels")]
    BundleTooDeep(usize),

    #[error("not an OSC packet (leading byte {0:#04x})")]
    NotOsc(u8),
}

/// Anything that can be written to the wire as an OSC packet.
pub trait OscEncode {
    /// Exact number of bytes `encode` will write.
    fn encoded_len(&self) -> usize;

    fn encode<W: Write>(&self, writer: &mut W) -> crate::Result<()>;

    fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out)?;
        Ok(out)
    }
}

const ZEROS: [u8; 4] = [0; 4];

/// Rounds `len` up to the next multiple of 4.
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Wire size of an OSC string: the bytes, at least one NUL, padding.
pub fn string_len(s: &str) -> usize {
    padded_len(s.len() + 1)
}

/// Wire size of a blob holding `len` bytes.
pub fn blob_len(len: usize) -> usize {
    4 + padded_len(len)
}

pub fn write_string<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    writer.write_all(s.as_bytes())?;
    let pad = string_len(s) - s.len();
    writer.write_all(&ZEROS[..pad])
}

pub fn write_blob<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "blob larger than 4 GiB")
    })?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_all(bytes)?;
    writer.write_all(&ZEROS[..padded_len(bytes.len()) - bytes.len()])
}

/// Cursor over one received datagram (or a slice of one).
pub struct OscReader<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> OscReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        OscReader {
            inner: Cursor::new(data),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.inner.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), ParseError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ParseError::Truncated {
                offset: self.position(),
                needed,
                remaining,
            });
        }
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.ensure(4)?;
        Ok(self.inner.read_u32::<BigEndian>().unwrap_or_default())
    }

    pub fn read_i32(&mut self) -> Result<i32, ParseError> {
        self.ensure(4)?;
        Ok(self.inner.read_i32::<BigEndian>().unwrap_or_default())
    }

    pub fn read_f32(&mut self) -> Result<f32, ParseError> {
        self.ensure(4)?;
        Ok(self.inner.read_f32::<BigEndian>().unwrap_or_default())
    }

    pub fn read_u64(&mut self) -> Result<u64, ParseError> {
        self.ensure(8)?;
        Ok(self.inner.read_u64::<BigEndian>().unwrap_or_default())
    }

    pub fn read_i64(&mut self) -> Result<i64, ParseError> {
        self.ensure(8)?;
        Ok(self.inner.read_i64::<BigEndian>().unwrap_or_default())
    }

    pub fn read_f64(&mut self) -> Result<f64, ParseError> {
        self.ensure(8)?;
        Ok(self.inner.read_f64::<BigEndian>().unwrap_or_default())
    }

    /// Borrow the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        self.ensure(len)?;
        let start = self.position();
        let data: &'a [u8] = *self.inner.get_ref();
        self.inner.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }

    /// Read a NUL-terminated string and skip its padding.
    pub fn read_string(&mut self) -> Result<String, ParseError> {
        let start = self.position();
        let data: &'a [u8] = *self.inner.get_ref();
        let tail = &data[start.min(data.len())..];
        let nul = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(ParseError::UnterminatedString(start))?;
        let padded = padded_len(nul + 1);
        self.ensure(padded)?;
        let text = std::str::from_utf8(&tail[..nul])
            .map_err(|_| ParseError::InvalidUtf8(start))?
            .to_owned();
        self.inner.set_position((start + padded) as u64);
        Ok(text)
    }

    /// Read a length-prefixed blob. Trailing alignment padding is skipped
    /// when the sender wrote it.
    pub fn read_blob(&mut self) -> Result<Vec<u8>, ParseError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?.to_vec();
        let pad = (padded_len(len) - len).min(self.remaining());
        self.inner.set_position((self.position() + pad) as u64);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_padded_to_four_bytes() {
        let mut out = Vec::new();
        write_string(&mut out, "/foo").unwrap();
        assert_eq!(out, b"/foo\0\0\0\0");

        out.clear();
        write_string(&mut out, "abc").unwrap();
        assert_eq!(out, b"abc\0");

        out.clear();
        write_string(&mut out, "").unwrap();
        assert_eq!(out, b"\0\0\0\0");
    }

    #[test]
    fn string_len_matches_written_bytes() {
        for s in ["", "a", "ab", "abc", "abcd", "abcde", "/lx/tempo/bpm"] {
            let mut out = Vec::new();
            write_string(&mut out, s).unwrap();
            assert_eq!(out.len(), string_len(s), "for {s:?}");
            assert_eq!(out.len() % 4, 0);
        }
    }

    #[test]
    fn reader_reads_padded_strings_in_sequence() {
        let data = b"/a\0\0,i\0\0\0\0\0\x07";
        let mut reader = OscReader::new(data);
        assert_eq!(reader.read_string().unwrap(), "/a");
        assert_eq!(reader.read_string().unwrap(), ",i");
        assert_eq!(reader.read_i32().unwrap(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let mut reader = OscReader::new(b"/abc");
        assert_eq!(
            reader.read_string(),
            Err(ParseError::UnterminatedString(0))
        );
    }

    #[test]
    fn missing_padding_is_truncation() {
        let mut reader = OscReader::new(b"/abcd\0");
        assert!(matches!(
            reader.read_string(),
            Err(ParseError::Truncated { needed: 8, .. })
        ));
    }

    #[test]
    fn short_numbers_report_truncation() {
        let mut reader = OscReader::new(&[0, 0, 1]);
        assert_eq!(
            reader.read_i32(),
            Err(ParseError::Truncated {
                offset: 0,
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn blobs_round_trip_with_and_without_padding() {
        let mut out = Vec::new();
        write_blob(&mut out, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(out.len(), blob_len(5));
        assert_eq!(&out[..4], &[0, 0, 0, 5]);

        let mut reader = OscReader::new(&out);
        assert_eq!(reader.read_blob().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(reader.is_empty());

        // Unpadded blob at the end of a packet.
        let raw = [0, 0, 0, 2, 9, 8];
        let mut reader = OscReader::new(&raw);
        assert_eq!(reader.read_blob().unwrap(), vec![9, 8]);
        assert!(reader.is_empty());
    }
}
