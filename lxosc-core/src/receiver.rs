//! lxosc-core/src/receiver.rs
//!
//! A bound UDP socket with its own receive thread. The thread parses each
//! datagram and pushes the resulting messages onto a channel; the host calls
//! [`OscReceiver::dispatch`] once per tick to hand them to listeners.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::listener::{ListenerId, ListenerRegistry, ListenerResult, OscListener};
use crate::message::OscMessage;
use crate::net;
use crate::packet::OscPacket;
use crate::{OscError, Result};

/// Large enough for any UDP payload.
pub const RECEIVE_BUFFER_SIZE: usize = 65_536;

/// How long `stop` waits after each wake attempt before detaching the thread.
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after an unexpected socket error so a broken socket cannot spin.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Posts messages into a receiver's queue from anywhere, including from
/// inside a listener. They are delivered by a later `dispatch`.
#[derive(Clone)]
pub struct MessageSender {
    tx: Sender<OscMessage>,
}

impl MessageSender {
    /// Returns false once the receiver is gone.
    pub fn post(&self, message: OscMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

pub struct OscReceiver {
    local_addr: SocketAddr,
    socket: Option<Arc<UdpSocket>>,
    queue_tx: Sender<OscMessage>,
    queue_rx: Receiver<OscMessage>,
    listeners: ListenerRegistry,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    // Disconnects when the receive thread exits.
    finished_rx: Receiver<()>,
}

impl OscReceiver {
    /// Bind `addr` and start the receive thread. Bind failures are returned
    /// here, never later on the thread.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = net::bind_udp(addr, false).map_err(|source| OscError::Socket { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| OscError::Socket { addr, source })?;
        let socket = Arc::new(socket);

        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let socket = Arc::clone(&socket);
            let queue = queue_tx.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("osc-rx-{}", local_addr.port()))
                .spawn(move || {
                    let _finished = finished_tx;
                    receive_loop(&socket, &queue, &running);
                })?
        };

        info!("OSC receiver bound to {local_addr}");
        Ok(Self {
            local_addr,
            socket: Some(socket),
            queue_tx,
            queue_rx,
            listeners: ListenerRegistry::new(),
            running,
            thread: Some(thread),
            finished_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn add_listener(&self, listener: impl OscListener + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn add_listener_fn<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OscMessage) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners.add_fn(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            tx: self.queue_tx.clone(),
        }
    }

    /// Messages waiting for the next dispatch.
    pub fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    /// Take everything queued at the moment of the call. Messages that
    /// arrive while the batch is being handled wait for the next call.
    pub(crate) fn drain(&self) -> Vec<OscMessage> {
        let pending = self.queue_rx.len();
        let mut batch = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.queue_rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        batch
    }

    /// Deliver queued messages to listeners, in arrival order. Returns the
    /// number of messages dispatched.
    pub fn dispatch(&self) -> usize {
        let batch = self.drain();
        for message in &batch {
            self.listeners.deliver(message);
        }
        batch.len()
    }

    /// Stop the receive thread, release the socket and drop all listeners.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);

        // recv_from has no timeout; an empty datagram to ourselves wakes it.
        let wake = net::self_address(self.local_addr);
        if let Err(e) = socket.send_to(&[], wake) {
            debug!("Could not wake OSC receiver on {}: {e}", self.local_addr);
        }

        if let Some(handle) = self.thread.take() {
            let mut finished = self.finished_rx.recv_timeout(STOP_TIMEOUT);
            if matches!(finished, Err(RecvTimeoutError::Timeout)) {
                // The wake datagram was lost; closing the read half unblocks recv_from.
                debug!("OSC receiver on {} still blocked, shutting down reads", self.local_addr);
                if let Err(e) = net::shutdown_read(&socket) {
                    warn!("Could not shut down OSC socket on {}: {e}", self.local_addr);
                }
                finished = self.finished_rx.recv_timeout(STOP_TIMEOUT);
            }
            match finished {
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "OSC receive thread on {} did not exit within {:?}, detaching",
                        self.local_addr,
                        STOP_TIMEOUT * 2
                    );
                }
                _ => {
                    if handle.join().is_err() {
                        error!("OSC receive thread on {} panicked", self.local_addr);
                    }
                }
            }
        }

        drop(socket);
        self.listeners.clear();
        while self.queue_rx.try_recv().is_ok() {}
        info!("OSC receiver on {} stopped", self.local_addr);
    }
}

impl Drop for OscReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: &UdpSocket, queue: &Sender<OscMessage>, running: &AtomicBool) {
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    while running.load(Ordering::Acquire) {
        let (size, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                match e.kind() {
                    // ConnectionReset is Windows reporting an ICMP port-unreachable
                    // from an earlier send on this socket.
                    io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset => {}
                    _ => {
                        error!("OSC receive error: {e}");
                        thread::sleep(ERROR_BACKOFF);
                    }
                }
                continue;
            }
        };
        if !running.load(Ordering::Acquire) {
            break;
        }
        if size == 0 {
            continue;
        }

        match OscPacket::parse_from(Some(source), &buf[..size]) {
            Ok(packet) => {
                for message in packet.into_messages() {
                    if queue.send(message).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Dropping malformed OSC packet ({size} bytes from {source}): {e}");
            }
        }
    }
    debug!("OSC receive loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OscEncode;
    use std::sync::Mutex;
    use std::time::Instant;

    fn loopback_receiver() -> OscReceiver {
        OscReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    fn wait_for_pending(receiver: &OscReceiver, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while receiver.pending() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} messages");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn sender_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    fn record(receiver: &OscReceiver) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        receiver.add_listener_fn(move |message| {
            sink.lock().unwrap().push(message.address().to_string());
            Ok(())
        });
        seen
    }

    #[test]
    fn messages_dispatch_in_fifo_order() {
        let receiver = loopback_receiver();
        let seen = record(&receiver);
        let socket = sender_socket();

        for i in 0..20 {
            let bytes = OscMessage::new(format!("/n/{i}")).to_bytes().unwrap();
            socket.send_to(&bytes, receiver.local_addr()).unwrap();
        }
        wait_for_pending(&receiver, 20);

        assert_eq!(receiver.dispatch(), 20);
        let expected: Vec<String> = (0..20).map(|i| format!("/n/{i}")).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
        assert_eq!(receiver.dispatch(), 0);
    }

    #[test]
    fn malformed_datagrams_do_not_stop_the_thread() {
        let receiver = loopback_receiver();
        let seen = record(&receiver);
        let socket = sender_socket();

        socket.send_to(b"garbage!", receiver.local_addr()).unwrap();
        socket.send_to(b"/a\0\0,x\0\0", receiver.local_addr()).unwrap();
        socket.send_to(b"/a\0\0,i\0\0\0", receiver.local_addr()).unwrap();
        let good = OscMessage::new("/ok").arg(1).to_bytes().unwrap();
        socket.send_to(&good, receiver.local_addr()).unwrap();

        wait_for_pending(&receiver, 1);
        receiver.dispatch();
        assert_eq!(*seen.lock().unwrap(), vec!["/ok"]);
    }

    #[test]
    fn messages_posted_during_dispatch_wait_for_the_next_one() {
        let receiver = loopback_receiver();
        let seen = record(&receiver);

        let poster = receiver.sender();
        receiver.add_listener_fn(move |message| {
            if message.matches("/first") {
                poster.post(OscMessage::new("/followup"));
            }
            Ok(())
        });

        assert!(receiver.sender().post(OscMessage::new("/first")));
        assert_eq!(receiver.dispatch(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["/first"]);
        assert_eq!(receiver.pending(), 1);

        assert_eq!(receiver.dispatch(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["/first", "/followup"]);
        assert_eq!(receiver.dispatch(), 0);
    }

    #[test]
    fn stop_is_idempotent_and_clears_listeners() {
        let mut receiver = loopback_receiver();
        receiver.add_listener_fn(|_| Ok(()));
        let addr = receiver.local_addr();

        let started = Instant::now();
        receiver.stop();
        receiver.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!receiver.is_running());
        assert!(receiver.listeners().is_empty());

        // The port is free again.
        let rebound = OscReceiver::bind(addr).unwrap();
        assert_eq!(rebound.local_addr(), addr);
    }

    #[test]
    fn binding_a_taken_port_fails_synchronously() {
        let first = loopback_receiver();
        match OscReceiver::bind(first.local_addr()) {
            Err(OscError::Socket { addr, .. }) => assert_eq!(addr, first.local_addr()),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("second bind should fail"),
        }
    }
}
