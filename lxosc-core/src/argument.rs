//! lxosc-core/src/argument.rs
//!
//! The closed set of OSC argument types. Every variant knows its type tag,
//! its wire size and how to encode and parse itself.

use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, WriteBytesExt};

use crate::codec::{self, OscReader, ParseError};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 32-bit RGBA color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OscColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl OscColor {
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn from_u32(rgba: u32) -> Self {
        let [red, green, blue, alpha] = rgba.to_be_bytes();
        Self::new(red, green, blue, alpha)
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.red, self.green, self.blue, self.alpha])
    }
}

/// 4-byte MIDI message: port id, status byte, two data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OscMidi {
    pub port: u8,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl OscMidi {
    pub fn new(port: u8, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            port,
            status,
            data1,
            data2,
        }
    }
}

/// NTP-format time tag: seconds since 1900 plus a 32-bit binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OscTimeTag {
    pub seconds: u32,
    pub fraction: u32,
}

impl OscTimeTag {
    /// The special "now" tag (0, 1).
    pub const IMMEDIATE: OscTimeTag = OscTimeTag {
        seconds: 0,
        fraction: 1,
    };

    pub fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn is_immediate(&self) -> bool {
        *self == Self::IMMEDIATE
    }

    pub fn from_u64(raw: u64) -> Self {
        Self::new((raw >> 32) as u32, raw as u32)
    }

    pub fn to_u64(self) -> u64 {
        ((self.seconds as u64) << 32) | self.fraction as u64
    }

    /// `None` for tags before the Unix epoch (including `IMMEDIATE`).
    pub fn to_system_time(self) -> Option<SystemTime> {
        let secs = (self.seconds as u64).checked_sub(NTP_UNIX_OFFSET)?;
        let nanos = ((self.fraction as u64) * 1_000_000_000) >> 32;
        Some(UNIX_EPOCH + Duration::new(secs, nanos as u32))
    }
}

impl Default for OscTimeTag {
    fn default() -> Self {
        Self::IMMEDIATE
    }
}

impl From<SystemTime> for OscTimeTag {
    fn from(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        let seconds = (since_epoch.as_secs() + NTP_UNIX_OFFSET) as u32;
        let fraction = (((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000) as u32;
        Self::new(seconds, fraction)
    }
}

/// One typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArgument {
    Int(i32),
    Float(f32),
    Double(f64),
    Long(i64),
    Str(String),
    Symbol(String),
    Char(char),
    Blob(Vec<u8>),
    Color(OscColor),
    Midi(OscMidi),
    TimeTag(OscTimeTag),
    /// `T` or `F`; the tag alone carries the value.
    Bool(bool),
    Nil,
    Infinitum,
}

impl OscArgument {
    pub fn type_tag(&self) -> char {
        match self {
            OscArgument::Int(_) => 'i',
            OscArgument::Float(_) => 'f',
            OscArgument::Double(_) => 'd',
            OscArgument::Long(_) => 'h',
            OscArgument::Str(_) => 's',
            OscArgument::Symbol(_) => 'S',
            OscArgument::Char(_) => 'c',
            OscArgument::Blob(_) => 'b',
            OscArgument::Color(_) => 'r',
            OscArgument::Midi(_) => 'm',
            OscArgument::TimeTag(_) => 't',
            OscArgument::Bool(true) => 'T',
            OscArgument::Bool(false) => 'F',
            OscArgument::Nil => 'N',
            OscArgument::Infinitum => 'I',
        }
    }

    /// Human-readable type name, used in accessor errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            OscArgument::Int(_) => "int32",
            OscArgument::Float(_) => "float32",
            OscArgument::Double(_) => "double",
            OscArgument::Long(_) => "int64",
            OscArgument::Str(_) => "string",
            OscArgument::Symbol(_) => "symbol",
            OscArgument::Char(_) => "char",
            OscArgument::Blob(_) => "blob",
            OscArgument::Color(_) => "rgba",
            OscArgument::Midi(_) => "midi",
            OscArgument::TimeTag(_) => "timetag",
            OscArgument::Bool(_) => "bool",
            OscArgument::Nil => "nil",
            OscArgument::Infinitum => "infinitum",
        }
    }

    /// Payload size on the wire, excluding the type tag character.
    pub fn encoded_len(&self) -> usize {
        match self {
            OscArgument::Int(_)
            | OscArgument::Float(_)
            | OscArgument::Char(_)
            | OscArgument::Color(_)
            | OscArgument::Midi(_) => 4,
            OscArgument::Double(_) | OscArgument::Long(_) | OscArgument::TimeTag(_) => 8,
            OscArgument::Str(s) | OscArgument::Symbol(s) => codec::string_len(s),
            OscArgument::Blob(b) => codec::blob_len(b.len()),
            OscArgument::Bool(_) | OscArgument::Nil | OscArgument::Infinitum => 0,
        }
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            OscArgument::Int(v) => writer.write_i32::<BigEndian>(*v),
            OscArgument::Float(v) => writer.write_f32::<BigEndian>(*v),
            OscArgument::Double(v) => writer.write_f64::<BigEndian>(*v),
            OscArgument::Long(v) => writer.write_i64::<BigEndian>(*v),
            OscArgument::Str(s) | OscArgument::Symbol(s) => codec::write_string(writer, s),
            OscArgument::Char(c) => writer.write_u32::<BigEndian>(*c as u32),
            OscArgument::Blob(b) => codec::write_blob(writer, b),
            OscArgument::Color(c) => writer.write_u32::<BigEndian>(c.to_u32()),
            OscArgument::Midi(m) => writer.write_all(&[m.port, m.status, m.data1, m.data2]),
            OscArgument::TimeTag(t) => writer.write_u64::<BigEndian>(t.to_u64()),
            OscArgument::Bool(_) | OscArgument::Nil | OscArgument::Infinitum => Ok(()),
        }
    }

    /// Parse the payload for `tag` at the reader's position.
    pub fn parse(tag: char, reader: &mut OscReader<'_>) -> Result<Self, ParseError> {
        let arg = match tag {
            'i' => OscArgument::Int(reader.read_i32()?),
            'f' => OscArgument::Float(reader.read_f32()?),
            'd' => OscArgument::Double(reader.read_f64()?),
            'h' => OscArgument::Long(reader.read_i64()?),
            's' => OscArgument::Str(reader.read_string()?),
            'S' => OscArgument::Symbol(reader.read_string()?),
            'c' => {
                let raw = reader.read_u32()?;
                OscArgument::Char(char::from_u32(raw).ok_or(ParseError::InvalidChar(raw))?)
            }
            'b' => OscArgument::Blob(reader.read_blob()?),
            'r' => OscArgument::Color(OscColor::from_u32(reader.read_u32()?)),
            'm' => {
                let [port, status, data1, data2] = reader.read_u32()?.to_be_bytes();
                OscArgument::Midi(OscMidi::new(port, status, data1, data2))
            }
            't' => OscArgument::TimeTag(OscTimeTag::from_u64(reader.read_u64()?)),
            'T' => OscArgument::Bool(true),
            'F' => OscArgument::Bool(false),
            'N' => OscArgument::Nil,
            'I' => OscArgument::Infinitum,
            other => return Err(ParseError::UnknownTypeTag(other)),
        };
        Ok(arg)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            OscArgument::Int(v) => Some(*v),
            OscArgument::Float(v) => Some(*v as i32),
            OscArgument::Double(v) => Some(*v as i32),
            OscArgument::Long(v) => Some(*v as i32),
            OscArgument::Bool(b) => Some(*b as i32),
            OscArgument::Char(c) => Some(*c as i32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OscArgument::Long(v) => Some(*v),
            OscArgument::Double(v) => Some(*v as i64),
            other => other.as_i32().map(i64::from),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArgument::Float(v) => Some(*v),
            OscArgument::Int(v) => Some(*v as f32),
            OscArgument::Double(v) => Some(*v as f32),
            OscArgument::Long(v) => Some(*v as f32),
            OscArgument::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OscArgument::Double(v) => Some(*v),
            OscArgument::Float(v) => Some(*v as f64),
            OscArgument::Int(v) => Some(*v as f64),
            OscArgument::Long(v) => Some(*v as f64),
            OscArgument::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// `T`/`F`, or any number (non-zero is true).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OscArgument::Bool(b) => Some(*b),
            OscArgument::Int(v) => Some(*v != 0),
            OscArgument::Long(v) => Some(*v != 0),
            OscArgument::Float(v) => Some(*v != 0.0),
            OscArgument::Double(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArgument::Str(s) | OscArgument::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            OscArgument::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for OscArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArgument::Int(v) => write!(f, "{v}"),
            OscArgument::Float(v) => write!(f, "{v}"),
            OscArgument::Double(v) => write!(f, "{v}"),
            OscArgument::Long(v) => write!(f, "{v}"),
            OscArgument::Str(s) => write!(f, "{s:?}"),
            OscArgument::Symbol(s) => write!(f, "'{s}"),
            OscArgument::Char(c) => write!(f, "{c:?}"),
            OscArgument::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            OscArgument::Color(c) => write!(f, "#{:08x}", c.to_u32()),
            OscArgument::Midi(m) => write!(
                f,
                "midi[{} {:02x} {:02x} {:02x}]",
                m.port, m.status, m.data1, m.data2
            ),
            OscArgument::TimeTag(t) => write!(f, "{}.{:08x}", t.seconds, t.fraction),
            OscArgument::Bool(b) => write!(f, "{b}"),
            OscArgument::Nil => f.write_str("nil"),
            OscArgument::Infinitum => f.write_str("inf"),
        }
    }
}

impl From<i32> for OscArgument {
    fn from(v: i32) -> Self {
        OscArgument::Int(v)
    }
}

impl From<f32> for OscArgument {
    fn from(v: f32) -> Self {
        OscArgument::Float(v)
    }
}

impl From<f64> for OscArgument {
    fn from(v: f64) -> Self {
        OscArgument::Double(v)
    }
}

impl From<i64> for OscArgument {
    fn from(v: i64) -> Self {
        OscArgument::Long(v)
    }
}

impl From<bool> for OscArgument {
    fn from(v: bool) -> Self {
        OscArgument::Bool(v)
    }
}

impl From<char> for OscArgument {
    fn from(v: char) -> Self {
        OscArgument::Char(v)
    }
}

impl From<&str> for OscArgument {
    fn from(v: &str) -> Self {
        OscArgument::Str(v.to_owned())
    }
}

impl From<String> for OscArgument {
    fn from(v: String) -> Self {
        OscArgument::Str(v)
    }
}

impl From<Vec<u8>> for OscArgument {
    fn from(v: Vec<u8>) -> Self {
        OscArgument::Blob(v)
    }
}

impl From<OscColor> for OscArgument {
    fn from(v: OscColor) -> Self {
        OscArgument::Color(v)
    }
}

impl From<OscMidi> for OscArgument {
    fn from(v: OscMidi) -> Self {
        OscArgument::Midi(v)
    }
}

impl From<OscTimeTag> for OscArgument {
    fn from(v: OscTimeTag) -> Self {
        OscArgument::TimeTag(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(arg: &OscArgument) -> OscArgument {
        let mut out = Vec::new();
        arg.encode(&mut out).unwrap();
        assert_eq!(out.len(), arg.encoded_len(), "length of {arg:?}");
        assert_eq!(out.len() % 4, 0, "alignment of {arg:?}");

        let mut reader = OscReader::new(&out);
        let parsed = OscArgument::parse(arg.type_tag(), &mut reader).unwrap();
        assert!(reader.is_empty(), "{arg:?} left bytes unread");
        parsed
    }

    #[test]
    fn every_type_round_trips() {
        let samples = vec![
            OscArgument::Int(-42),
            OscArgument::Float(120.0),
            OscArgument::Double(-0.125),
            OscArgument::Long(i64::MIN + 7),
            OscArgument::Str("hello".into()),
            OscArgument::Str(String::new()),
            OscArgument::Symbol("sym".into()),
            OscArgument::Char('x'),
            OscArgument::Blob(vec![1, 2, 3]),
            OscArgument::Blob(Vec::new()),
            OscArgument::Color(OscColor::new(255, 128, 0, 64)),
            OscArgument::Midi(OscMidi::new(0, 0x90, 60, 127)),
            OscArgument::TimeTag(OscTimeTag::new(3_900_000_000, 12345)),
            OscArgument::Bool(true),
            OscArgument::Bool(false),
            OscArgument::Nil,
            OscArgument::Infinitum,
        ];
        for arg in &samples {
            assert_eq!(&round_trip(arg), arg);
        }
    }

    #[test]
    fn numbers_are_big_endian() {
        let mut out = Vec::new();
        OscArgument::Int(1).encode(&mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 1]);

        out.clear();
        OscArgument::Float(120.0).encode(&mut out).unwrap();
        assert_eq!(out, 120.0f32.to_be_bytes());

        out.clear();
        OscArgument::Color(OscColor::new(1, 2, 3, 4)).encode(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn payloadless_types_write_nothing() {
        for arg in [
            OscArgument::Bool(true),
            OscArgument::Bool(false),
            OscArgument::Nil,
            OscArgument::Infinitum,
        ] {
            let mut out = Vec::new();
            arg.encode(&mut out).unwrap();
            assert!(out.is_empty());
            assert_eq!(arg.encoded_len(), 0);
        }
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut reader = OscReader::new(&[0, 0, 0, 0]);
        assert_eq!(
            OscArgument::parse('x', &mut reader),
            Err(ParseError::UnknownTypeTag('x'))
        );
    }

    #[test]
    fn invalid_char_code_point_is_rejected() {
        let raw = 0xD800u32.to_be_bytes();
        let mut reader = OscReader::new(&raw);
        assert_eq!(
            OscArgument::parse('c', &mut reader),
            Err(ParseError::InvalidChar(0xD800))
        );
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(OscArgument::Int(3).as_f32(), Some(3.0));
        assert_eq!(OscArgument::Float(2.9).as_i32(), Some(2));
        assert_eq!(OscArgument::Bool(true).as_f64(), Some(1.0));
        assert_eq!(OscArgument::Int(0).as_bool(), Some(false));
        assert_eq!(OscArgument::Symbol("s".into()).as_str(), Some("s"));
        assert_eq!(OscArgument::Str("s".into()).as_f32(), None);
        assert_eq!(OscArgument::Nil.as_bool(), None);
    }

    #[test]
    fn time_tags_convert_from_system_time() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 500_000_000);
        let tag = OscTimeTag::from(time);
        assert_eq!(tag.seconds as u64, 1_700_000_000 + NTP_UNIX_OFFSET);
        assert_eq!(tag.fraction, 1 << 31);

        let back = tag.to_system_time().unwrap();
        let diff = back
            .duration_since(time)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_micros(1));

        assert!(OscTimeTag::IMMEDIATE.is_immediate());
        assert_eq!(OscTimeTag::IMMEDIATE.to_system_time(), None);
    }
}
