//! A host that carries segments in UDP datagrams and the byte stream over a pair of
//! file descriptors (stdin/stdout for the command line tool).

use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::fd::AsFd;
use std::time::Instant;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::RcvBuf;
use crate::tcp::host::{AppChannel, Events, EventSource, NetworkChannel};

const RECV_BUF_SIZE: usize = 1024 * 1024 * 2;

pub struct UdpHost<R, W> {
    socket: UdpSocket,
    peer: Option<SocketAddr>, // Learned from the first datagram when listening
    app_in: R,
    app_out: W,
    staged: Vec<u8>, // Read from `app_in`, not yet taken by the connection
    app_eof: bool,
    close_on_peer_fin: bool,
    mss: usize,
}

impl<R: Read + AsFd, W: Write> UdpHost<R, W> {
    /// Bind `local` and wait for whoever sends the first segment
    pub fn listen(local: impl ToSocketAddrs, app_in: R, app_out: W, mss: usize) -> io::Result<Self> {
        Self::bind(local, None, app_in, app_out, mss)
    }

    /// Bind `local` and talk to `peer` only
    pub fn connect(
        local: impl ToSocketAddrs,
        peer: SocketAddr,
        app_in: R,
        app_out: W,
        mss: usize,
    ) -> io::Result<Self> {
        Self::bind(local, Some(peer), app_in, app_out, mss)
    }

    fn bind(
        local: impl ToSocketAddrs,
        peer: Option<SocketAddr>,
        app_in: R,
        app_out: W,
        mss: usize,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        setsockopt(&socket, RcvBuf, &RECV_BUF_SIZE)?;
        log::debug!("Bound {}", socket.local_addr()?);

        Ok(UdpHost {
            socket,
            peer,
            app_in,
            app_out,
            staged: Vec::with_capacity(mss),
            app_eof: false,
            close_on_peer_fin: false,
            mss,
        })
    }

    /// Request a close of our side as soon as the peer has closed its side
    pub fn close_on_peer_fin(mut self, enabled: bool) -> Self {
        self.close_on_peer_fin = enabled;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn into_output(self) -> W {
        self.app_out
    }

    /// Pull up to one MSS from the application. Zero bytes means it has closed.
    fn fill_staged(&mut self) -> io::Result<()> {
        self.staged.resize(self.mss, 0);
        let n = loop {
            match self.app_in.read(&mut self.staged) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.staged.clear();
                    return Err(err);
                }
            }
        };
        self.staged.truncate(n);
        if n == 0 {
            log::debug!("Application input closed");
            self.app_eof = true;
        }
        Ok(())
    }

    /// Poll the socket and, if asked, the application input. Returns which of them are readable.
    fn poll_ready(&self, watch_net: bool, watch_app: bool, timeout_ms: Option<u16>) -> io::Result<(bool, bool)> {
        let mut fds = Vec::with_capacity(2);
        if watch_net {
            fds.push(PollFd::new(self.socket.as_fd(), PollFlags::POLLIN));
        }
        if watch_app {
            fds.push(PollFd::new(self.app_in.as_fd(), PollFlags::POLLIN));
        }

        loop {
            let timeout = timeout_ms.map_or(PollTimeout::NONE, PollTimeout::from);
            match poll(&mut fds, timeout) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }

        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        let mut ready = fds
            .iter()
            .map(|fd| fd.revents().map_or(false, |r| r.intersects(readable)));
        let net = watch_net && ready.next().unwrap_or(false);
        let app = watch_app && ready.next().unwrap_or(false);
        Ok((net, app))
    }
}

impl<R: Read + AsFd, W: Write> NetworkChannel for UdpHost<R, W> {
    fn send(&mut self, header: &[u8], payload: &[u8]) -> io::Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "peer address not known yet"))?;

        let mut datagram = Vec::with_capacity(header.len() + payload.len());
        datagram.extend_from_slice(header);
        datagram.extend_from_slice(payload);
        self.socket.send_to(&datagram, peer)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (n, from) = self.socket.recv_from(buf)?;
            match self.peer {
                None => {
                    log::info!("Peer is {}", from);
                    self.peer = Some(from);
                }
                Some(peer) if peer != from => {
                    log::debug!("Ignoring {} bytes from stranger {}", n, from);
                    continue;
                }
                Some(_) => {}
            }
            // UDP never reports a close, so an empty datagram is just noise
            if n > 0 {
                return Ok(n);
            }
        }
    }
}

impl<R: Read + AsFd, W: Write> AppChannel for UdpHost<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.staged.len());
        buf[..n].copy_from_slice(&self.staged[..n]);
        self.staged.drain(..n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.app_out.write_all(data)?;
        self.app_out.flush()
    }

    fn unblock(&mut self) {
        log::debug!("Handshake resolved, application unblocked");
    }

    fn peer_closed(&mut self) {
        log::info!("Peer closed its direction");
        if let Err(err) = self.app_out.flush() {
            log::warn!("Flushing application output failed: {}", err);
        }
        if self.close_on_peer_fin {
            self.app_eof = true;
        }
    }
}

impl<R: Read + AsFd, W: Write> EventSource for UdpHost<R, W> {
    fn wait_for_event(&mut self, interest: Events, deadline: Option<Instant>) -> io::Result<Events> {
        loop {
            let mut ready = Events::empty();
            if interest.contains(Events::APP_DATA) && !self.staged.is_empty() {
                ready |= Events::APP_DATA;
            }
            if interest.contains(Events::APP_CLOSE_REQUESTED) && self.app_eof && self.staged.is_empty() {
                ready |= Events::APP_CLOSE_REQUESTED;
            }

            let watch_net = interest.contains(Events::NETWORK_DATA);
            let watch_app = interest.contains(Events::APP_DATA) && !self.app_eof && self.staged.is_empty();
            if !watch_net && !watch_app && ready.is_empty() && deadline.is_none() {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "no requested event can occur"));
            }

            // Something is already ready: only look, never wait
            let timeout_ms = if !ready.is_empty() {
                Some(0)
            } else {
                deadline.map(|d| {
                    let remaining = d.saturating_duration_since(Instant::now()).as_millis();
                    remaining.min(u16::MAX as u128) as u16
                })
            };

            let (net, app) = self.poll_ready(watch_net, watch_app, timeout_ms)?;
            if net {
                ready |= Events::NETWORK_DATA;
            }
            if app {
                self.fill_staged()?;
                if !self.staged.is_empty() {
                    ready |= Events::APP_DATA;
                } else if interest.contains(Events::APP_CLOSE_REQUESTED) {
                    ready |= Events::APP_CLOSE_REQUESTED;
                }
            }

            if !ready.is_empty() {
                return Ok(ready);
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Ok(Events::empty());
            }
        }
    }
}

// -- Unit tests --
