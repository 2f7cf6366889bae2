//! lxosc-core/src/bundle.rs
//!
//! `#bundle` containers. The time tag is carried through parsing and
//! encoding but never used to schedule delivery.

use std::fmt;
use std::io::Write;
use std::net::SocketAddr;

use byteorder::{BigEndian, WriteBytesExt};

use crate::argument::OscTimeTag;
use crate::codec::{self, OscEncode, OscReader, ParseError};
use crate::packet::OscPacket;
use crate::{OscError, Result};

/// Marker string that opens every bundle, NUL included.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Nested bundles beyond this depth are rejected.
pub const MAX_BUNDLE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OscBundle {
    pub time_tag: OscTimeTag,
    pub elements: Vec<OscPacket>,
}

impl OscBundle {
    pub fn new(time_tag: OscTimeTag) -> Self {
        Self {
            time_tag,
            elements: Vec::new(),
        }
    }

    pub fn immediate() -> Self {
        Self::new(OscTimeTag::IMMEDIATE)
    }

    pub fn add(&mut self, element: impl Into<OscPacket>) -> &mut Self {
        self.elements.push(element.into());
        self
    }

    pub fn with(mut self, element: impl Into<OscPacket>) -> Self {
        self.add(element);
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OscPacket> {
        self.elements.iter()
    }

    pub(crate) fn parse_at_depth(
        source: Option<SocketAddr>,
        bytes: &[u8],
        depth: usize,
    ) -> std::result::Result<Self, ParseError> {
        if depth > MAX_BUNDLE_DEPTH {
            return Err(ParseError::BundleTooDeep(MAX_BUNDLE_DEPTH));
        }

        let mut reader = OscReader::new(bytes);
        let marker = reader.read_bytes(BUNDLE_TAG.len())?;
        if marker != BUNDLE_TAG {
            return Err(ParseError::NotOsc(marker[0]));
        }
        let time_tag = OscTimeTag::from_u64(reader.read_u64()?);

        let mut bundle = OscBundle::new(time_tag);
        while !reader.is_empty() {
            let size = reader.read_u32()? as usize;
            let remaining = reader.remaining();
            if size > remaining {
                return Err(ParseError::BundleElementSize { size, remaining });
            }
            let element = reader.read_bytes(size)?;
            bundle
                .elements
                .push(OscPacket::parse_at_depth(source, element, depth + 1)?);
        }
        Ok(bundle)
    }

    pub fn parse(source: Option<SocketAddr>, bytes: &[u8]) -> std::result::Result<Self, ParseError> {
        Self::parse_at_depth(source, bytes, 0)
    }
}

impl OscEncode for OscBundle {
    fn encoded_len(&self) -> usize {
        BUNDLE_TAG.len()
            + 8
            + self
                .elements
                .iter()
                .map(|element| 4 + element.encoded_len())
                .sum::<usize>()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(BUNDLE_TAG)?;
        writer.write_u64::<BigEndian>(self.time_tag.to_u64())?;
        for element in &self.elements {
            let size = u32::try_from(element.encoded_len()).map_err(|_| OscError::PacketTooLarge {
                size: element.encoded_len(),
                max: u32::MAX as usize,
            })?;
            writer.write_u32::<BigEndian>(size)?;
            element.encode(writer)?;
        }
        Ok(())
    }
}

impl fmt::Display for OscBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#bundle[{} elements", self.len())?;
        if !self.time_tag.is_immediate() {
            write!(f, " @{:#018x}", self.time_tag.to_u64())?;
        }
        f.write_str("]")
    }
}

impl<'a> IntoIterator for &'a OscBundle {
    type Item = &'a OscPacket;
    type IntoIter = std::slice::Iter<'a, OscPacket>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OscMessage;

    #[test]
    fn bundle_layout() {
        let bundle = OscBundle::new(OscTimeTag::new(1, 2)).with(OscMessage::new("/a").arg(7));
        let bytes = bundle.to_bytes().unwrap();
        assert_eq!(bytes.len(), bundle.encoded_len());
        assert_eq!(&bytes[..8], BUNDLE_TAG);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 1, 0, 0, 0, 2]);
        // element size prefix, then the message itself
        assert_eq!(&bytes[16..20], &[0, 0, 0, 12]);
        assert_eq!(&bytes[20..], b"/a\0\0,i\0\0\0\0\0\x07");
    }

    #[test]
    fn nested_bundles_parse() {
        let inner = OscBundle::immediate().with(OscMessage::new("/inner").arg(1));
        let outer = OscBundle::new(OscTimeTag::new(5, 0))
            .with(OscMessage::new("/outer"))
            .with(inner);
        let bytes = outer.to_bytes().unwrap();

        let parsed = OscBundle::parse(None, &bytes).unwrap();
        assert_eq!(parsed, outer);
        assert_eq!(parsed.time_tag, OscTimeTag::new(5, 0));
    }

    #[test]
    fn oversized_element_is_rejected() {
        let mut bytes = OscBundle::immediate().to_bytes().unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 64]);
        bytes.extend_from_slice(b"/a\0\0");
        assert_eq!(
            OscBundle::parse(None, &bytes),
            Err(ParseError::BundleElementSize {
                size: 64,
                remaining: 4
            })
        );
    }

    #[test]
    fn empty_bundle_is_valid() {
        let bytes = OscBundle::immediate().to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert!(OscBundle::parse(None, &bytes).unwrap().is_empty());
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut bundle = OscBundle::immediate();
        for _ in 0..=MAX_BUNDLE_DEPTH {
            bundle = OscBundle::immediate().with(bundle);
        }
        let bytes = bundle.to_bytes().unwrap();
        assert_eq!(
            OscBundle::parse(None, &bytes),
            Err(ParseError::BundleTooDeep(MAX_BUNDLE_DEPTH))
        );
    }
}
