use crate::tcp::flags::StcpFlags;
use crate::tcp::state::{ConnectionState, StateEvent};
use crate::tcp::wrap32::Wrap32;

/// Per-connection state. Owned by the one control flow that drives the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub state: ConnectionState,
    pub initial_seq_no: Wrap32,  // Fixed at creation
    pub next_seq_no: Wrap32,     // Stamped on the next segment we send
    pub expected_seq_no: Wrap32, // Next in-order seq number from the peer
    pub done: bool,
    pub peer_fin_seen: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ConnectionContext {
    pub fn new(initial_seq_no: Wrap32) -> Self {
        ConnectionContext {
            state: ConnectionState::Closed,
            initial_seq_no,
            next_seq_no: initial_seq_no,
            expected_seq_no: Wrap32::new(0),
            done: false,
            peer_fin_seen: false,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Apply `event` through the transition table. Illegal events leave the state untouched.
    pub fn transition(&mut self, event: StateEvent) -> bool {
        match self.state.next(event) {
            Some(next) => {
                log::debug!("{} -> {} on {:?}", self.state, next, event);
                self.state = next;
                true
            }
            None => {
                log::debug!("Ignoring {:?} in {}", event, self.state);
                false
            }
        }
    }

    /// Account for a segment that went out stamped with `next_seq_no`
    pub fn on_sent(&mut self, flags: StcpFlags, payload_len: usize) {
        self.next_seq_no += payload_len as u32 + flags.seq_len();
        self.bytes_sent += payload_len as u64;
    }

    /// Account for in-order payload handed to the application
    pub fn on_delivered(&mut self, payload_len: usize) {
        self.expected_seq_no += payload_len as u32;
        self.bytes_received += payload_len as u64;
    }

    /// Is `seq_no` exactly the next byte we expect? There is no acceptance window.
    pub fn is_in_order(&self, seq_no: Wrap32) -> bool {
        seq_no == self.expected_seq_no
    }
}

// -- Unit tests --
