//! lxosc-core/src/message.rs
//!
//! An OSC message: address pattern plus ordered, typed arguments.

use std::cell::OnceCell;
use std::fmt;
use std::io::Write;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::argument::OscArgument;
use crate::codec::{self, OscEncode, OscReader, ParseError};
use crate::{OscError, Result};

/// A single OSC message.
///
/// The type tag string is derived from the argument list. It is built on the
/// first call to [`OscMessage::type_tag`] after a mutation and cached until
/// the next one.
#[derive(Debug, Clone)]
pub struct OscMessage {
    address: String,
    arguments: Vec<OscArgument>,
    type_tag: OnceCell<String>,
    source: Option<SocketAddr>,
    created_at: DateTime<Utc>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            arguments: Vec::new(),
            type_tag: OnceCell::new(),
            source: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_arguments<I, A>(address: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OscArgument>,
    {
        let mut message = Self::new(address);
        message.arguments.extend(arguments.into_iter().map(Into::into));
        message
    }

    /// Builder-style `add`.
    pub fn arg(mut self, value: impl Into<OscArgument>) -> Self {
        self.add(value);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Replace the address, keeping the argument buffer for reuse.
    pub fn set_address(&mut self, address: &str) {
        self.address.clear();
        self.address.push_str(address);
    }

    /// Where the message came from. Only set on received messages.
    pub fn source(&self) -> Option<SocketAddr> {
        self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn arguments(&self) -> &[OscArgument] {
        &self.arguments
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn add(&mut self, value: impl Into<OscArgument>) -> &mut Self {
        self.arguments.push(value.into());
        self.type_tag.take();
        self
    }

    /// Replace argument `index`. Returns the previous value, or `None` if the
    /// index was out of range (in which case nothing changes).
    pub fn set_argument(
        &mut self,
        index: usize,
        value: impl Into<OscArgument>,
    ) -> Option<OscArgument> {
        let slot = self.arguments.get_mut(index)?;
        let previous = std::mem::replace(slot, value.into());
        self.type_tag.take();
        Some(previous)
    }

    pub fn remove_argument(&mut self, index: usize) -> Option<OscArgument> {
        if index >= self.arguments.len() {
            return None;
        }
        self.type_tag.take();
        Some(self.arguments.remove(index))
    }

    /// Drop all arguments but keep the allocation.
    pub fn clear_arguments(&mut self) {
        self.arguments.clear();
        self.type_tag.take();
    }

    /// `,` followed by one tag character per argument.
    pub fn type_tag(&self) -> &str {
        self.type_tag.get_or_init(|| {
            let mut tag = String::with_capacity(1 + self.arguments.len());
            tag.push(',');
            tag.extend(self.arguments.iter().map(OscArgument::type_tag));
            tag
        })
    }

    /// Exact address equality.
    pub fn matches(&self, pattern: &str) -> bool {
        self.address == pattern
    }

    /// True if the address is `prefix` or lies below it in the path
    /// hierarchy: `/foo` is a prefix of `/foo/bar` but not of `/foobar`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        match self.address.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
            None => false,
        }
    }

    /// Non-empty path segments of the address.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.address.split('/').filter(|s| !s.is_empty())
    }

    pub fn arg_at(&self, index: usize) -> Option<&OscArgument> {
        self.arguments.get(index)
    }

    fn typed<'s, T>(
        &'s self,
        index: usize,
        expected: &'static str,
        convert: impl FnOnce(&'s OscArgument) -> Option<T>,
    ) -> Result<T> {
        match self.arguments.get(index) {
            Some(arg) => convert(arg).ok_or(OscError::Argument {
                index,
                expected,
                found: arg.type_name(),
            }),
            None => Err(OscError::Argument {
                index,
                expected,
                found: "nothing",
            }),
        }
    }

    pub fn get_int(&self, index: usize) -> Result<i32> {
        self.typed(index, "int32", OscArgument::as_i32)
    }

    pub fn get_long(&self, index: usize) -> Result<i64> {
        self.typed(index, "int64", OscArgument::as_i64)
    }

    pub fn get_float(&self, index: usize) -> Result<f32> {
        self.typed(index, "float32", OscArgument::as_f32)
    }

    pub fn get_double(&self, index: usize) -> Result<f64> {
        self.typed(index, "double", OscArgument::as_f64)
    }

    pub fn get_bool(&self, index: usize) -> Result<bool> {
        self.typed(index, "bool", OscArgument::as_bool)
    }

    pub fn get_string(&self, index: usize) -> Result<&str> {
        self.typed(index, "string", OscArgument::as_str)
    }

    pub fn get_blob(&self, index: usize) -> Result<&[u8]> {
        self.typed(index, "blob", OscArgument::as_blob)
    }

    /// First argument as int.
    pub fn int(&self) -> Result<i32> {
        self.get_int(0)
    }

    pub fn float(&self) -> Result<f32> {
        self.get_float(0)
    }

    pub fn bool(&self) -> Result<bool> {
        self.get_bool(0)
    }

    pub fn string(&self) -> Result<&str> {
        self.get_string(0)
    }

    /// Sequential reader over the arguments.
    pub fn cursor(&self) -> ArgumentCursor<'_> {
        ArgumentCursor {
            message: self,
            position: 0,
        }
    }

    /// Parse a message occupying all of `bytes`.
    pub fn parse(source: Option<SocketAddr>, bytes: &[u8]) -> std::result::Result<Self, ParseError> {
        let mut reader = OscReader::new(bytes);
        let address = reader.read_string()?;
        if !address.starts_with('/') {
            return Err(ParseError::InvalidAddress(address));
        }

        let mut message = OscMessage::new(address);
        message.source = source;

        // Pre-1.0 senders may omit the type tag string entirely.
        if reader.is_empty() {
            return Ok(message);
        }

        let tags = reader.read_string()?;
        let Some(arg_tags) = tags.strip_prefix(',') else {
            return Err(ParseError::InvalidTypeTag(tags));
        };
        message.arguments.reserve(arg_tags.len());
        for tag in arg_tags.chars() {
            message.arguments.push(OscArgument::parse(tag, &mut reader)?);
        }
        message.type_tag = OnceCell::from(tags);
        Ok(message)
    }
}

impl PartialEq for OscMessage {
    /// Address and arguments only; source and timestamp are metadata.
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.arguments == other.arguments
    }
}

impl OscEncode for OscMessage {
    fn encoded_len(&self) -> usize {
        codec::string_len(&self.address)
            + codec::string_len(self.type_tag())
            + self.arguments.iter().map(OscArgument::encoded_len).sum::<usize>()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        if !self.address.starts_with('/') {
            return Err(OscError::InvalidAddress(self.address.clone()));
        }
        codec::write_string(writer, &self.address)?;
        codec::write_string(writer, self.type_tag())?;
        for arg in &self.arguments {
            arg.encode(writer)?;
        }
        Ok(())
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tag())?;
        for arg in &self.arguments {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Reads a message's arguments front to back.
pub struct ArgumentCursor<'a> {
    message: &'a OscMessage,
    position: usize,
}

impl<'a> ArgumentCursor<'a> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.message.len().saturating_sub(self.position)
    }

    fn advance<T>(&mut self, read: impl FnOnce(&'a OscMessage, usize) -> Result<T>) -> Result<T> {
        let value = read(self.message, self.position)?;
        self.position += 1;
        Ok(value)
    }

    pub fn next_int(&mut self) -> Result<i32> {
        self.advance(OscMessage::get_int)
    }

    pub fn next_long(&mut self) -> Result<i64> {
        self.advance(OscMessage::get_long)
    }

    pub fn next_float(&mut self) -> Result<f32> {
        self.advance(OscMessage::get_float)
    }

    pub fn next_double(&mut self) -> Result<f64> {
        self.advance(OscMessage::get_double)
    }

    pub fn next_bool(&mut self) -> Result<bool> {
        self.advance(OscMessage::get_bool)
    }

    pub fn next_string(&mut self) -> Result<&'a str> {
        self.advance(OscMessage::get_string)
    }

    pub fn next_blob(&mut self) -> Result<&'a [u8]> {
        self.advance(OscMessage::get_blob)
    }
}

impl<'a> Iterator for ArgumentCursor<'a> {
    type Item = &'a OscArgument;

    fn next(&mut self) -> Option<Self::Item> {
        let arg = self.message.arguments.get(self.position)?;
        self.position += 1;
        Some(arg)
    }
}
