//! The per-connection engine: handshake, control loop and teardown.
//!
//! One [`Transport`] drives exactly one connection from a single control flow.
//! The only places it blocks are the host's `recv` and `wait_for_event`.

use std::time::Instant;
use crate::config::{AckValidation, StcpConfig, TeardownMode, MAX_MSS};
use crate::tcp::context::ConnectionContext;
use crate::tcp::errors::{SegmentError, StcpError};
use crate::tcp::flags::StcpFlags;
use crate::tcp::host::{Events, Host};
use crate::tcp::retransmit::{NoRetransmit, RetransmitPolicy};
use crate::tcp::segment::{Segment, StcpHeader, HEADER_LEN};
use crate::tcp::state::{ConnectionState, StateEvent};
use crate::tcp::wrap32::Wrap32;

/// Largest header a peer can announce: data offset 15 words
const MAX_HEADER_LEN: usize = 15 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Active,  // Sends the SYN
    Passive, // Waits for one
}

pub struct Transport<H, P = NoRetransmit> {
    host: H,
    config: StcpConfig,
    ctx: ConnectionContext,
    policy: P,
    send_buf: Vec<u8>, // One MSS of outbound payload
    recv_buf: Vec<u8>, // One whole inbound segment
}

impl<H: Host> Transport<H, NoRetransmit> {
    pub fn new(host: H, config: StcpConfig) -> Self {
        Self::with_policy(host, config, NoRetransmit)
    }
}

impl<H: Host, P: RetransmitPolicy> Transport<H, P> {
    pub fn with_policy(host: H, config: StcpConfig, policy: P) -> Self {
        let isn = config.initial_seq_no.generate();
        // Sized before validation runs, so never trust `mss` past MAX_MSS here
        let mss = config.mss.min(MAX_MSS);
        Transport {
            host,
            send_buf: vec![0u8; mss],
            // One spare byte: a datagram that fills the buffer was larger than any valid segment
            recv_buf: vec![0u8; MAX_HEADER_LEN + mss + 1],
            config,
            ctx: ConnectionContext::new(isn),
            policy,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Release the connection, handing back the host and the final context
    pub fn into_parts(self) -> (H, ConnectionContext) {
        (self.host, self.ctx)
    }

    /// Open the connection in the given role and run it until it is closed.
    pub fn run(&mut self, role: Role) -> Result<(), StcpError> {
        self.handshake(role)?;
        self.run_control_loop()
    }

    // -- Handshake --

    /// Drive one round of the three-way handshake. The application is unblocked
    /// whatever the outcome; an unresolved handshake comes back as `HandshakeIncomplete`.
    pub fn handshake(&mut self, role: Role) -> Result<(), StcpError> {
        let opened = self.config.validate().and_then(|_| match role {
            Role::Active => self.active_open(),
            Role::Passive => self.passive_open(),
        });
        self.host.unblock();
        opened?;

        if self.ctx.state != ConnectionState::Established {
            return Err(StcpError::HandshakeIncomplete { state: self.ctx.state });
        }

        log::info!(
            "Connection established: next_seq_no={} expected_seq_no={}",
            self.ctx.next_seq_no,
            self.ctx.expected_seq_no
        );
        Ok(())
    }

    fn active_open(&mut self) -> Result<(), StcpError> {
        let isn = self.ctx.initial_seq_no;

        self.ctx.transition(StateEvent::SendSyn);
        self.send_segment(StcpFlags::SYN, 0)?;

        let Some((reply, _)) = self.recv_valid_segment()? else {
            return Ok(());
        };

        let syn_ack = StcpFlags::SYN | StcpFlags::ACK;
        if !reply.flags.contains(syn_ack) || !self.ack_covers(reply.ack_no, isn + 1) {
            log::warn!("Expected SYN-ACK in {}, got {:?} ack={}", self.ctx.state, reply.flags, reply.ack_no);
            return Ok(());
        }

        self.ctx.expected_seq_no = reply.seq_no + 1;
        self.ctx.next_seq_no = isn + 1;
        self.send_segment(StcpFlags::ACK, 0)?;
        self.ctx.transition(StateEvent::RecvSynAck);
        Ok(())
    }

    fn passive_open(&mut self) -> Result<(), StcpError> {
        let isn = self.ctx.initial_seq_no;
        self.ctx.transition(StateEvent::Listen);

        let Some((syn, _)) = self.recv_valid_segment()? else {
            return Ok(());
        };
        if !syn.flags.contains(StcpFlags::SYN) {
            log::warn!("Expected SYN in {}, got {:?}", self.ctx.state, syn.flags);
            return Ok(());
        }

        self.ctx.expected_seq_no = syn.seq_no + 1;
        self.ctx.next_seq_no = isn;
        self.ctx.transition(StateEvent::RecvSyn);
        self.send_segment(StcpFlags::SYN | StcpFlags::ACK, 0)?;

        let Some((ack, _)) = self.recv_valid_segment()? else {
            return Ok(());
        };
        if !ack.flags.contains(StcpFlags::ACK) || !self.ack_covers(ack.ack_no, isn + 1) {
            log::warn!("Expected ACK in {}, got {:?} ack={}", self.ctx.state, ack.flags, ack.ack_no);
            return Ok(());
        }

        self.ctx.next_seq_no = isn + 1;
        self.ctx.transition(StateEvent::RecvAck);
        Ok(())
    }

    // -- Control loop --

    /// Multiplex application data, peer segments and close requests until the connection is done.
    pub fn run_control_loop(&mut self) -> Result<(), StcpError> {
        if !self.ctx.state.is_synchronized() {
            return Err(StcpError::InvalidState(format!(
                "control loop entered in {}",
                self.ctx.state
            )));
        }

        while !self.ctx.done {
            let interest = self.interest();
            let deadline = self.policy.deadline();
            let events = self.host.wait_for_event(interest, deadline)? & interest;

            if events.contains(Events::APP_DATA) {
                self.send_app_data()?;
            }
            if events.contains(Events::NETWORK_DATA) {
                self.handle_network_data()?;
            }
            if events.contains(Events::APP_CLOSE_REQUESTED) {
                self.close()?;
            }

            self.retransmit_due()?;
        }

        log::info!(
            "Connection finished in {}: {} bytes sent, {} bytes received",
            self.ctx.state,
            self.ctx.bytes_sent,
            self.ctx.bytes_received
        );
        Ok(())
    }

    fn interest(&self) -> Events {
        let mut interest = Events::NETWORK_DATA;
        if self.ctx.state.can_send() {
            interest |= Events::APP_DATA | Events::APP_CLOSE_REQUESTED;
        }
        interest
    }

    fn send_app_data(&mut self) -> Result<(), StcpError> {
        let n = self.host.read(&mut self.send_buf)?;
        if n == 0 {
            return Ok(());
        }

        self.send_segment(StcpFlags::ACK, n)?;
        self.ctx.on_sent(StcpFlags::ACK, n);
        Ok(())
    }

    fn handle_network_data(&mut self) -> Result<(), StcpError> {
        match self.recv_valid_segment()? {
            Some((header, len)) => self.handle_segment(&header, len),
            None => Ok(()),
        }
    }

    /// React to one segment sitting in `recv_buf[..len]`
    fn handle_segment(&mut self, header: &StcpHeader, len: usize) -> Result<(), StcpError> {
        let header_len = header.header_len();
        let data_len = len - header_len;

        if header.flags.contains(StcpFlags::ACK) {
            self.policy.on_ack(header.ack_no);
            if self.ctx.state.awaiting_fin_ack() && self.ack_covers(header.ack_no, self.ctx.next_seq_no) {
                self.on_fin_acked();
            }
        }

        if header.flags.contains(StcpFlags::FIN) {
            self.on_peer_fin(header.seq_no)?;
        } else if data_len > 0 && self.ctx.is_in_order(header.seq_no) && self.ctx.state.can_receive() {
            self.host.write(&self.recv_buf[header_len..len])?;
            self.ctx.on_delivered(data_len);
            self.send_segment(StcpFlags::ACK, 0)?;
        } else if data_len > 0 {
            log::trace!(
                "Discarding {} bytes at seq={} (expected {}) in {}",
                data_len,
                header.seq_no,
                self.ctx.expected_seq_no,
                self.ctx.state
            );
        }

        Ok(())
    }

    // -- Teardown --

    /// Send our FIN and block for the reply.
    fn close(&mut self) -> Result<(), StcpError> {
        if !self.ctx.state.can_send() {
            log::debug!("Close requested in {}, FIN already sent", self.ctx.state);
            return Ok(());
        }

        self.send_segment(StcpFlags::FIN, 0)?;
        self.ctx.on_sent(StcpFlags::FIN, 0);
        self.ctx.transition(StateEvent::SendFin);

        if let Some((reply, len)) = self.recv_valid_segment()? {
            self.handle_segment(&reply, len)?;
        }
        Ok(())
    }

    fn on_fin_acked(&mut self) {
        self.ctx.transition(StateEvent::RecvAck);
        match self.ctx.state {
            ConnectionState::FinWait2 => {
                if self.config.teardown == TeardownMode::AwaitAck {
                    self.ctx.done = true;
                }
            }
            ConnectionState::TimeWait | ConnectionState::Closed => self.ctx.done = true,
            _ => {}
        }
    }

    fn on_peer_fin(&mut self, seq_no: Wrap32) -> Result<(), StcpError> {
        self.ctx.expected_seq_no = seq_no + 1;
        self.send_segment(StcpFlags::ACK, 0)?;

        if !self.ctx.peer_fin_seen {
            self.ctx.peer_fin_seen = true;
            self.ctx.transition(StateEvent::RecvFin);
            self.host.peer_closed();
        }

        // No 2*MSL timer: TIME_WAIT ends the connection right away
        if self.ctx.state == ConnectionState::TimeWait {
            self.ctx.done = true;
        }
        Ok(())
    }

    // -- Segment I/O --

    /// Does `ack_no` acknowledge everything up to `expected`? Always true when permissive.
    fn ack_covers(&self, ack_no: Wrap32, expected: Wrap32) -> bool {
        match self.config.ack_validation {
            AckValidation::Permissive => true,
            AckValidation::Strict => ack_no == expected,
        }
    }

    /// Send `send_buf[..payload_len]` stamped with the current cursors.
    /// The cursors are not advanced here.
    fn send_segment(&mut self, flags: StcpFlags, payload_len: usize) -> Result<(), StcpError> {
        let segment = Segment::new(flags)
            .seq_no(self.ctx.next_seq_no)
            .ack_no(self.ctx.expected_seq_no)
            .window(self.config.window_size)
            .payload(&self.send_buf[..payload_len]);
        let header = segment.encode_header();

        log::trace!("tx {} +{} bytes", hex::encode(header), payload_len);
        self.host.send(&header, segment.payload)?;
        self.policy.on_send(&segment);
        Ok(())
    }

    /// Receive one segment into `recv_buf`, returning its header and total length.
    fn recv_segment(&mut self) -> Result<(StcpHeader, usize), StcpError> {
        let n = self.host.recv(&mut self.recv_buf)?;
        if n == 0 {
            return Err(StcpError::ChannelClosed);
        }
        if n == self.recv_buf.len() {
            return Err(SegmentError::Oversized { max: n - 1 }.into());
        }

        let header = StcpHeader::parse(&self.recv_buf[..n])?;
        log::trace!("rx {} +{} bytes", hex::encode(&self.recv_buf[..HEADER_LEN]), n - header.header_len());
        Ok((header, n))
    }

    /// Like `recv_segment`, but a segment that does not decode is dropped.
    fn recv_valid_segment(&mut self) -> Result<Option<(StcpHeader, usize)>, StcpError> {
        match self.recv_segment() {
            Ok(received) => Ok(Some(received)),
            Err(StcpError::Segment(err)) => {
                log::warn!("Dropping malformed segment: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn retransmit_due(&mut self) -> Result<(), StcpError> {
        for datagram in self.policy.due(Instant::now()) {
            let (header, payload) = datagram.split_at(HEADER_LEN.min(datagram.len()));
            log::debug!("Retransmitting {} payload bytes", payload.len());
            self.host.send(header, payload)?;
        }
        Ok(())
    }
}

// -- Unit tests --
