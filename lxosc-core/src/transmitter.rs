//! lxosc-core/src/transmitter.rs
//!
//! Sends packets to one destination from a single socket, encoding into a
//! fixed buffer that is reused across sends.

use std::io::Cursor;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use tracing::debug;

use crate::codec::OscEncode;
use crate::net;
use crate::{OscError, Result};

/// Size of the reusable send buffer; larger packets are refused.
pub const MAX_PACKET_SIZE: usize = 8192;

pub struct OscTransmitter {
    socket: UdpSocket,
    destination: SocketAddr,
    buffer: Box<[u8]>,
}

impl OscTransmitter {
    /// Open a socket on an ephemeral port of the destination's address family.
    pub fn new(destination: SocketAddr) -> Result<Self> {
        let bind = net::unspecified_for(destination);
        let socket = net::bind_udp(bind, true).map_err(|source| OscError::Socket { addr: bind, source })?;
        debug!("OSC transmitter opened for {destination}");
        Ok(Self {
            socket,
            destination,
            buffer: vec![0u8; MAX_PACKET_SIZE].into_boxed_slice(),
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn set_destination(&mut self, destination: SocketAddr) {
        self.destination = destination;
    }

    pub fn set_address(&mut self, address: IpAddr) {
        self.destination.set_ip(address);
    }

    pub fn set_port(&mut self, port: u16) {
        self.destination.set_port(port);
    }

    /// Encode `packet` and send it as one datagram. I/O failures are returned
    /// and leave the socket open for the next send.
    pub fn send<P: OscEncode>(&mut self, packet: &P) -> Result<usize> {
        let size = packet.encoded_len();
        if size > self.buffer.len() {
            return Err(OscError::PacketTooLarge {
                size,
                max: self.buffer.len(),
            });
        }
        let mut cursor = Cursor::new(&mut self.buffer[..]);
        packet.encode(&mut cursor)?;
        let written = cursor.position() as usize;
        Ok(self.socket.send_to(&self.buffer[..written], self.destination)?)
    }

    /// Close the socket.
    pub fn dispose(self) {
        debug!("OSC transmitter for {} disposed", self.destination);
    }
}
