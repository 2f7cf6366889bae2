//! lxosc-core/src/packet.rs
//!
//! Entry point for raw datagrams: the first byte decides between a message
//! (`/`) and a bundle (`#bundle`).

use std::fmt;
use std::io::Write;
use std::net::SocketAddr;

use crate::bundle::{BUNDLE_TAG, OscBundle};
use crate::codec::{OscEncode, ParseError};
use crate::message::OscMessage;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    pub fn parse(datagram: &[u8]) -> std::result::Result<Self, ParseError> {
        Self::parse_from(None, datagram)
    }

    /// Parse a datagram, stamping `source` on every contained message.
    pub fn parse_from(
        source: Option<SocketAddr>,
        datagram: &[u8],
    ) -> std::result::Result<Self, ParseError> {
        Self::parse_at_depth(source, datagram, 0)
    }

    pub(crate) fn parse_at_depth(
        source: Option<SocketAddr>,
        datagram: &[u8],
        depth: usize,
    ) -> std::result::Result<Self, ParseError> {
        match datagram.first() {
            None => Err(ParseError::Empty),
            Some(b'/') => Ok(OscPacket::Message(OscMessage::parse(source, datagram)?)),
            Some(b'#') if datagram.starts_with(BUNDLE_TAG) => Ok(OscPacket::Bundle(
                OscBundle::parse_at_depth(source, datagram, depth)?,
            )),
            Some(other) => Err(ParseError::NotOsc(*other)),
        }
    }

    /// Flatten into messages, in the order they appear (depth first).
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<OscMessage>) {
        match self {
            OscPacket::Message(message) => out.push(message),
            OscPacket::Bundle(bundle) => {
                for element in bundle.elements {
                    element.flatten_into(out);
                }
            }
        }
    }
}

impl OscEncode for OscPacket {
    fn encoded_len(&self) -> usize {
        match self {
            OscPacket::Message(message) => message.encoded_len(),
            OscPacket::Bundle(bundle) => bundle.encoded_len(),
        }
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            OscPacket::Message(message) => message.encode(writer),
            OscPacket::Bundle(bundle) => bundle.encode(writer),
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(message: OscMessage) -> Self {
        OscPacket::Message(message)
    }
}

impl From<OscBundle> for OscPacket {
    fn from(bundle: OscBundle) -> Self {
        OscPacket::Bundle(bundle)
    }
}

impl fmt::Display for OscPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscPacket::Message(message) => fmt::Display::fmt(message, f),
            OscPacket::Bundle(bundle) => fmt::Display::fmt(bundle, f),
        }
    }
}
