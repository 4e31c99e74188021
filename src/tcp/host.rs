//! The seams between the protocol engine and whatever hosts it.
//!
//! A host supplies three things: a datagram-style network channel that carries
//! whole segments, an application channel for the byte stream, and a way to
//! block until any of them has something to say.

use std::io;
use std::time::Instant;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Events: u8 {
        const APP_DATA = 1 << 0;            // Application staged bytes to send
        const NETWORK_DATA = 1 << 1;        // A segment is waiting on the channel
        const APP_CLOSE_REQUESTED = 1 << 2; // Application asked to close
    }
}

pub trait NetworkChannel {
    /// Transmit one segment. Header and payload form a single unit on the wire.
    fn send(&mut self, header: &[u8], payload: &[u8]) -> io::Result<()>;

    /// Block until a segment arrives. `Ok(0)` means the channel has closed.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub trait AppChannel {
    /// Pull up to `buf.len()` staged outbound bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Hand in-order inbound bytes to the application.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Called once, when the handshake has been resolved either way.
    fn unblock(&mut self);

    /// Called once, when the peer has closed its sending direction.
    fn peer_closed(&mut self);
}

pub trait EventSource {
    /// Block until at least one event in `interest` holds, or until `deadline` passes.
    /// A passed deadline yields an empty set.
    fn wait_for_event(&mut self, interest: Events, deadline: Option<Instant>) -> io::Result<Events>;
}

/// Everything a connection needs from its environment.
pub trait Host: NetworkChannel + AppChannel + EventSource {}

impl<T: NetworkChannel + AppChannel + EventSource> Host for T {}
