use std::time::Instant;
use crate::tcp::segment::Segment;
use crate::tcp::wrap32::Wrap32;

/// Hook for loss recovery. The connection reports every segment it sends and every
/// ACK it sees, waits no longer than `deadline()`, and resends whatever `due()` hands back.
pub trait RetransmitPolicy {
    fn on_send(&mut self, segment: &Segment<'_>);

    fn on_ack(&mut self, ack_no: Wrap32);

    /// The earliest moment a resend could be due
    fn deadline(&self) -> Option<Instant>;

    /// Encoded segments (header followed by payload) to put back on the channel
    fn due(&mut self, now: Instant) -> Vec<Vec<u8>>;
}

/// Never resends. Loss below the transport goes unrecovered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetransmit;

impl RetransmitPolicy for NoRetransmit {
    fn on_send(&mut self, _segment: &Segment<'_>) {}

    fn on_ack(&mut self, _ack_no: Wrap32) {}

    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn due(&mut self, _now: Instant) -> Vec<Vec<u8>> {
        Vec::new()
    }
}
