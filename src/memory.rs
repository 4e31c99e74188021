//! An in-process host.
//!
//! [`MemoryLink`] pairs carry whole segments over `std::sync::mpsc` channels, so a
//! connection can be driven without sockets: either against another
//! [`MemoryHost`] on a second thread, or against a test that plays the peer by
//! hand through the other end of the link.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};
use crate::tcp::host::{AppChannel, Events, EventSource, NetworkChannel};

/// One end of a bidirectional, lossless, in-order datagram link.
#[derive(Debug)]
pub struct MemoryLink {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryLink {
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            MemoryLink { tx: Some(a_tx), rx: a_rx },
            MemoryLink { tx: Some(b_tx), rx: b_rx },
        )
    }

    pub fn send(&self, datagram: Vec<u8>) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "link shut down"))?;
        tx.send(datagram)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))
    }

    /// Block for the next datagram. `None` once the peer has shut down and the queue is empty.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take everything queued right now without blocking
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }

    /// Stop sending. The other end sees the link close after draining its queue.
    pub fn shutdown(&mut self) {
        self.tx = None;
    }
}

/// A host whose application side is a staging buffer and a record of what was delivered.
#[derive(Debug)]
pub struct MemoryHost {
    link: MemoryLink,
    pending: Option<Vec<u8>>, // Segment taken off the link while waiting for events
    link_closed: bool,
    outbound: VecDeque<u8>,
    close_requested: bool,
    close_on_peer_fin: bool,
    delivered: Vec<u8>,
    unblock_calls: usize,
    peer_closed_calls: usize,
}

impl MemoryHost {
    pub fn new(link: MemoryLink) -> Self {
        MemoryHost {
            link,
            pending: None,
            link_closed: false,
            outbound: VecDeque::new(),
            close_requested: false,
            close_on_peer_fin: false,
            delivered: Vec::new(),
            unblock_calls: 0,
            peer_closed_calls: 0,
        }
    }

    /// Behave like an application that closes as soon as it reads end-of-stream
    pub fn close_on_peer_fin(mut self, enabled: bool) -> Self {
        self.close_on_peer_fin = enabled;
        self
    }

    /// Queue bytes for the connection to send
    pub fn stage(&mut self, data: &[u8]) {
        self.outbound.extend(data);
    }

    /// Ask for a close once everything staged has gone out
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn delivered(&self) -> &[u8] {
        &self.delivered
    }

    pub fn unblock_calls(&self) -> usize {
        self.unblock_calls
    }

    pub fn peer_closed_calls(&self) -> usize {
        self.peer_closed_calls
    }

    /// Is a segment (or the link closing) ready without blocking?
    fn poll_link(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        match self.link.rx.try_recv() {
            Ok(datagram) => {
                self.pending = Some(datagram);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.link_closed = true;
                false
            }
        }
    }
}

impl NetworkChannel for MemoryHost {
    fn send(&mut self, header: &[u8], payload: &[u8]) -> io::Result<()> {
        let mut datagram = Vec::with_capacity(header.len() + payload.len());
        datagram.extend_from_slice(header);
        datagram.extend_from_slice(payload);
        self.link.send(datagram)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = match self.pending.take().or_else(|| self.link.recv()) {
            Some(datagram) => datagram,
            None => return Ok(0),
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}

impl AppChannel for MemoryHost {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbound.len());
        for (dst, src) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.delivered.extend_from_slice(data);
        Ok(())
    }

    fn unblock(&mut self) {
        self.unblock_calls += 1;
    }

    fn peer_closed(&mut self) {
        self.peer_closed_calls += 1;
        if self.close_on_peer_fin {
            self.close_requested = true;
        }
    }
}

impl EventSource for MemoryHost {
    fn wait_for_event(&mut self, interest: Events, deadline: Option<Instant>) -> io::Result<Events> {
        let mut ready = Events::empty();

        if interest.contains(Events::APP_DATA) && !self.outbound.is_empty() {
            ready |= Events::APP_DATA;
        }
        if interest.contains(Events::NETWORK_DATA) && self.poll_link() {
            ready |= Events::NETWORK_DATA;
        }
        if interest.contains(Events::APP_CLOSE_REQUESTED) && self.close_requested && self.outbound.is_empty() {
            ready |= Events::APP_CLOSE_REQUESTED;
        }
        if !ready.is_empty() {
            return Ok(ready);
        }

        if !interest.contains(Events::NETWORK_DATA) {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no requested event can occur"));
        }

        // A closed link is reported last, once nothing else is left to do
        if self.link_closed {
            return Ok(Events::NETWORK_DATA);
        }

        match deadline {
            None => {
                self.pending = self.link.recv();
                Ok(Events::NETWORK_DATA)
            }
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match self.link.rx.recv_timeout(timeout) {
                    Ok(datagram) => {
                        self.pending = Some(datagram);
                        Ok(Events::NETWORK_DATA)
                    }
                    Err(RecvTimeoutError::Timeout) => Ok(Events::empty()),
                    Err(RecvTimeoutError::Disconnected) => Ok(Events::NETWORK_DATA),
                }
            }
        }
    }
}

// -- Unit tests --
