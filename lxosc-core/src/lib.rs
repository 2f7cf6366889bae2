//! lxosc-core/src/lib.rs
//!
//! OSC 1.0 over UDP: the wire codec, a threaded receiver whose messages are
//! dispatched on the host's tick, a transmitter, and the engine that keeps
//! both in step with configuration.

pub mod argument;
pub mod bundle;
pub mod codec;
pub mod config;
pub mod engine;
pub mod listener;
pub mod message;
pub mod net;
pub mod packet;
pub mod receiver;
pub mod state;
pub mod traits;
pub mod transmitter;

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

pub use argument::{OscArgument, OscColor, OscMidi, OscTimeTag};
pub use bundle::OscBundle;
pub use codec::{OscEncode, ParseError};
pub use config::OscConfig;
pub use engine::OscEngine;
pub use listener::{ListenerError, ListenerId, ListenerRegistry, ListenerResult, OscListener};
pub use message::{ArgumentCursor, OscMessage};
pub use packet::OscPacket;
pub use receiver::{MessageSender, OscReceiver};
pub use state::{Direction, IoState, StateChange};
pub use traits::{OscAddressable, ServiceAdvertiser};
pub use transmitter::OscTransmitter;

#[derive(Error, Debug)]
pub enum OscError {
    #[error("Malformed OSC packet: {0}")]
    Parse(#[from] ParseError),

    #[error("OSC I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Could not bind {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Packet of {size} bytes exceeds the {max} byte send buffer")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Invalid OSC address {0:?}, must start with '/'")]
    InvalidAddress(String),

    #[error("Invalid port {0}, must be 1-65535")]
    InvalidPort(u16),

    #[error("Argument {index}: expected {expected}, found {found}")]
    Argument {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Transmitter is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, OscError>;
