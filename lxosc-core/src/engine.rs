//! lxosc-core/src/engine.rs
//!
//! `OscEngine` turns configuration into sockets. It owns the main receiver,
//! any extra receivers, and the transmitter, and keeps one `IoState` per
//! direction reflecting the last bind or connect attempt.
//!
//! Everything here runs on the host thread: configuration changes, the
//! per-tick `dispatch`, listener callbacks and sends.

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::argument::OscArgument;
use crate::codec::OscEncode;
use crate::config::{self, OscConfig};
use crate::listener::{ListenerId, ListenerRegistry, ListenerResult, OscListener};
use crate::message::OscMessage;
use crate::net;
use crate::receiver::OscReceiver;
use crate::state::{Direction, IoState, StateChange};
use crate::traits::{OscAddressable, ServiceAdvertiser};
use crate::transmitter::OscTransmitter;
use crate::{OscError, Result};

pub struct OscEngine {
    config: OscConfig,
    receive_state: IoState,
    transmit_state: IoState,
    receiver: Option<OscReceiver>,
    extra_receivers: BTreeMap<u16, OscReceiver>,
    transmitter: Option<OscTransmitter>,
    listeners: ListenerRegistry,
    advertiser: Option<Box<dyn ServiceAdvertiser>>,
    advertised_port: Option<u16>,
    state_subscribers: Vec<Sender<StateChange>>,
    // Reused by `send_message` so convenience sends do not allocate.
    scratch: OscMessage,
}

impl OscEngine {
    /// A stopped engine. Nothing is bound until [`OscEngine::start`].
    pub fn new(config: OscConfig) -> Self {
        Self {
            config,
            receive_state: IoState::Stopped,
            transmit_state: IoState::Stopped,
            receiver: None,
            extra_receivers: BTreeMap::new(),
            transmitter: None,
            listeners: ListenerRegistry::new(),
            advertiser: None,
            advertised_port: None,
            state_subscribers: Vec::new(),
            scratch: OscMessage::new("/"),
        }
    }

    pub fn with_advertiser(mut self, advertiser: impl ServiceAdvertiser + 'static) -> Self {
        self.advertiser = Some(Box::new(advertiser));
        self
    }

    /// Bring both directions up according to the current configuration.
    /// Both are attempted; the first socket error is returned.
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        let receive = self.restart_receiver();
        let transmit = self.connect_transmitter();
        receive.and(transmit)
    }

    pub fn config(&self) -> &OscConfig {
        &self.config
    }

    pub fn receive_state(&self) -> IoState {
        self.receive_state
    }

    pub fn transmit_state(&self) -> IoState {
        self.transmit_state
    }

    /// Every later state transition is sent to the returned channel.
    pub fn subscribe_state(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.state_subscribers.push(tx);
        rx
    }

    /// Listeners on the engine survive rebinding of the receive port.
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

    /// The main receiver, while bound.
    pub fn main_receiver(&self) -> Option<&OscReceiver> {
        self.receiver.as_ref()
    }

    // ---- receive configuration ----

    pub fn set_receive_active(&mut self, active: bool) -> Result<()> {
        if self.config.receive_active == active {
            return Ok(());
        }
        self.config.receive_active = active;
        self.restart_receiver()
    }

    pub fn set_receive_host(&mut self, host: &str) -> Result<()> {
        if self.config.receive_host == host {
            return Ok(());
        }
        self.config.receive_host = host.to_string();
        if self.config.receive_active {
            self.restart_receiver()
        } else {
            Ok(())
        }
    }

    pub fn set_receive_port(&mut self, port: u16) -> Result<()> {
        config::check_port(port)?;
        if self.config.receive_port == port {
            return Ok(());
        }
        self.config.receive_port = port;
        if self.config.receive_active {
            self.restart_receiver()
        } else {
            Ok(())
        }
    }

    // ---- transmit configuration ----

    pub fn set_transmit_active(&mut self, active: bool) -> Result<()> {
        if self.config.transmit_active == active {
            return Ok(());
        }
        self.config.transmit_active = active;
        self.connect_transmitter()
    }

    pub fn set_transmit_host(&mut self, host: &str) -> Result<()> {
        if self.config.transmit_host == host {
            return Ok(());
        }
        self.config.transmit_host = host.to_string();
        self.retarget_transmitter()
    }

    pub fn set_transmit_port(&mut self, port: u16) -> Result<()> {
        config::check_port(port)?;
        if self.config.transmit_port == port {
            return Ok(());
        }
        self.config.transmit_port = port;
        self.retarget_transmitter()
    }

    pub fn set_log_input(&mut self, enabled: bool) {
        self.config.log_input = enabled;
    }

    pub fn set_log_output(&mut self, enabled: bool) {
        self.config.log_output = enabled;
    }

    /// Move to `config`, touching only the directions whose settings changed.
    pub fn apply_config(&mut self, config: OscConfig) -> Result<()> {
        config.validate()?;
        let old = std::mem::replace(&mut self.config, config);
        let new = &self.config;

        let receive_changed = old.receive_active != new.receive_active
            || (new.receive_active
                && (old.receive_host != new.receive_host || old.receive_port != new.receive_port));
        let transmit_toggled = old.transmit_active != new.transmit_active;
        let transmit_retargeted = new.transmit_active
            && (old.transmit_host != new.transmit_host || old.transmit_port != new.transmit_port);

        let receive = if receive_changed {
            self.restart_receiver()
        } else {
            Ok(())
        };
        let transmit = if transmit_toggled {
            self.connect_transmitter()
        } else if transmit_retargeted {
            self.retarget_transmitter()
        } else {
            Ok(())
        };
        receive.and(transmit)
    }

    // ---- extra receivers ----

    /// Bind an additional receiver on `host:port`. It has its own listeners
    /// and is dispatched by [`OscEngine::dispatch`] alongside the main one.
    pub fn open_receiver(&mut self, host: &str, port: u16) -> Result<&mut OscReceiver> {
        config::check_port(port)?;
        let addr = net::resolve_host(host, port).ok_or_else(|| OscError::UnknownHost(host.to_string()))?;
        if let Some(mut existing) = self.extra_receivers.remove(&port) {
            existing.stop();
        }
        let receiver = OscReceiver::bind(addr)?;
        Ok(self.extra_receivers.entry(port).or_insert(receiver))
    }

    pub fn receiver(&self, port: u16) -> Option<&OscReceiver> {
        self.extra_receivers.get(&port)
    }

    pub fn close_receiver(&mut self, port: u16) -> bool {
        match self.extra_receivers.remove(&port) {
            Some(mut receiver) => {
                receiver.stop();
                true
            }
            None => false,
        }
    }

    // ---- per-tick work ----

    /// Deliver everything queued on all receivers. Call once per host tick.
    /// Returns the number of messages dispatched.
    pub fn dispatch(&self) -> usize {
        let mut dispatched = 0;
        if let Some(receiver) = &self.receiver {
            let batch = receiver.drain();
            for message in &batch {
                if self.config.log_input {
                    debug!("[OSC] <- {message}");
                }
                self.listeners.deliver(message);
                receiver.listeners().deliver(message);
            }
            dispatched += batch.len();
        }
        for receiver in self.extra_receivers.values() {
            dispatched += receiver.dispatch();
        }
        dispatched
    }

    // ---- sending ----

    /// Send a packet through the transmitter. Fails with `NotConnected` unless
    /// transmit is bound.
    pub fn send<P>(&mut self, packet: &P) -> Result<usize>
    where
        P: OscEncode + std::fmt::Display,
    {
        let transmitter = match self.transmitter.as_mut() {
            Some(tx) if self.transmit_state.is_bound() => tx,
            _ => return Err(OscError::NotConnected),
        };
        if self.config.log_output {
            debug!("[OSC] -> {} {packet}", transmitter.destination());
        }
        transmitter.send(packet)
    }

    /// Send `address` with one argument. Does nothing unless transmit is
    /// enabled and bound, so callers need not check.
    pub fn send_message(&mut self, address: &str, value: impl Into<OscArgument>) -> Result<()> {
        if !self.config.transmit_active || !self.transmit_state.is_bound() {
            return Ok(());
        }
        let Some(transmitter) = self.transmitter.as_mut() else {
            return Ok(());
        };
        self.scratch.set_address(address);
        self.scratch.clear_arguments();
        self.scratch.add(value);
        if self.config.log_output {
            debug!("[OSC] -> {} {}", transmitter.destination(), self.scratch);
        }
        transmitter.send(&self.scratch)?;
        Ok(())
    }

    /// Send `value` to the address of `target`; no-op for unaddressable targets.
    pub fn send_addressable(
        &mut self,
        target: &dyn OscAddressable,
        value: impl Into<OscArgument>,
    ) -> Result<()> {
        match target.osc_address() {
            Some(address) => self.send_message(&address, value),
            None => Ok(()),
        }
    }

    // ---- lifecycle ----

    /// Stop receivers, then the transmitter, then the advertiser. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_receiver();
        for (_, mut receiver) in std::mem::take(&mut self.extra_receivers) {
            receiver.stop();
        }
        self.stop_transmitter();
        self.unadvertise();
        if self.receive_state != IoState::Stopped {
            self.set_state(Direction::Receive, IoState::Stopped, None);
        }
        if self.transmit_state != IoState::Stopped {
            self.set_state(Direction::Transmit, IoState::Stopped, None);
        }
    }

    fn set_state(&mut self, direction: Direction, state: IoState, detail: Option<String>) {
        match direction {
            Direction::Receive => self.receive_state = state,
            Direction::Transmit => self.transmit_state = state,
        }
        match (&detail, state.is_error()) {
            (Some(detail), true) => warn!("OSC {direction} state -> {state}: {detail}"),
            (Some(detail), false) => info!("OSC {direction} state -> {state} ({detail})"),
            (None, _) => info!("OSC {direction} state -> {state}"),
        }
        let change = StateChange {
            direction,
            state,
            detail,
        };
        self.state_subscribers
            .retain(|subscriber| subscriber.send(change.clone()).is_ok());
    }

    fn stop_receiver(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
    }

    fn stop_transmitter(&mut self) {
        if let Some(transmitter) = self.transmitter.take() {
            transmitter.dispose();
        }
    }

    fn advertise(&mut self, port: u16) {
        if self.advertised_port == Some(port) {
            return;
        }
        // A port that is no longer bound must not stay announced.
        self.unadvertise();
        if let Some(advertiser) = self.advertiser.as_mut() {
            advertiser.register(port);
            self.advertised_port = Some(port);
        }
    }

    fn unadvertise(&mut self) {
        if self.advertised_port.take().is_some() {
            if let Some(advertiser) = self.advertiser.as_mut() {
                advertiser.unregister();
            }
        }
    }

    /// Tear down the main receiver and bind a new one if receive is active.
    fn restart_receiver(&mut self) -> Result<()> {
        self.stop_receiver();
        if !self.config.receive_active {
            self.unadvertise();
            self.set_state(Direction::Receive, IoState::Stopped, None);
            return Ok(());
        }

        self.set_state(Direction::Receive, IoState::Binding, None);
        let host = self.config.receive_host.clone();
        let Some(addr) = net::resolve_host(&host, self.config.receive_port) else {
            self.unadvertise();
            self.set_state(
                Direction::Receive,
                IoState::UnknownHost,
                Some(format!("could not resolve {host:?}")),
            );
            return Ok(());
        };

        match OscReceiver::bind(addr) {
            Ok(receiver) => {
                let local = receiver.local_addr();
                self.receiver = Some(receiver);
                self.set_state(Direction::Receive, IoState::Bound, Some(local.to_string()));
                self.advertise(local.port());
                Ok(())
            }
            Err(e) => {
                self.unadvertise();
                self.set_state(Direction::Receive, IoState::SocketError, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Tear down the transmitter and open a new one if transmit is active.
    fn connect_transmitter(&mut self) -> Result<()> {
        self.stop_transmitter();
        if !self.config.transmit_active {
            self.set_state(Direction::Transmit, IoState::Stopped, None);
            return Ok(());
        }

        self.set_state(Direction::Transmit, IoState::Binding, None);
        let host = self.config.transmit_host.clone();
        let Some(destination) = net::resolve_host(&host, self.config.transmit_port) else {
            self.set_state(
                Direction::Transmit,
                IoState::UnknownHost,
                Some(format!("could not resolve {host:?}")),
            );
            return Ok(());
        };

        match OscTransmitter::new(destination) {
            Ok(transmitter) => {
                self.transmitter = Some(transmitter);
                self.set_state(
                    Direction::Transmit,
                    IoState::Bound,
                    Some(destination.to_string()),
                );
                Ok(())
            }
            Err(e) => {
                self.set_state(Direction::Transmit, IoState::SocketError, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Point an active transmitter at the configured destination, keeping its
    /// socket when the address family allows it.
    fn retarget_transmitter(&mut self) -> Result<()> {
        if !self.config.transmit_active {
            return Ok(());
        }
        let Some(current) = self.transmitter.as_ref().map(OscTransmitter::destination) else {
            return self.connect_transmitter();
        };

        let host = self.config.transmit_host.clone();
        match net::resolve_host(&host, self.config.transmit_port) {
            None => {
                // The old destination is stale; never send to it again.
                self.stop_transmitter();
                self.set_state(
                    Direction::Transmit,
                    IoState::UnknownHost,
                    Some(format!("could not resolve {host:?}")),
                );
                Ok(())
            }
            Some(destination) if destination.is_ipv4() == current.is_ipv4() => {
                if let Some(transmitter) = self.transmitter.as_mut() {
                    transmitter.set_destination(destination);
                }
                debug!("OSC transmitter retargeted {current} -> {destination}");
                self.set_state(
                    Direction::Transmit,
                    IoState::Bound,
                    Some(destination.to_string()),
                );
                Ok(())
            }
            Some(_) => self.connect_transmitter(),
        }
    }
}

impl Drop for OscEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
