//! Narrow interfaces to the collaborators around the engine.

/// Application objects that have an OSC address.
pub trait OscAddressable {
    /// `None` if the object is not externally addressable.
    fn osc_address(&self) -> Option<String>;
}

/// Zeroconf-style announcement of the receive port.
///
/// Called on the engine thread. Implementations must return quickly and push
/// slow work (mDNS teardown and the like) onto their own threads.
pub trait ServiceAdvertiser: Send {
    fn register(&mut self, port: u16);
    fn unregister(&mut self);
}
