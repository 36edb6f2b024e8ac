//! Blocking peer for talking to a [`UdpEngine`](super::UdpEngine).

use super::wire::{Frame, MAX_DATAGRAM};
use crate::error::TransportError;
use bytes::{Bytes, BytesMut};
use peerlink_core::SessionId;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// A connected datagram peer.
pub struct DatagramPeer {
    socket: UdpSocket,
    session_id: SessionId,
}

impl DatagramPeer {
    /// Says HELLO to `server` and waits up to `timeout` for the WELCOME.
    ///
    /// # Errors
    /// Returns [`TransportError::Timeout`] if no WELCOME arrives in time.
    pub fn connect(server: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(server)?;

        let mut peer = Self {
            socket,
            session_id: 0,
        };
        peer.write(&Frame::Hello)?;

        match peer.read_until(Instant::now() + timeout)? {
            Frame::Welcome { session_id } => {
                peer.session_id = session_id;
                Ok(peer)
            }
            Frame::Bye => Err(TransportError::handshake("server refused the peer")),
            other => Err(TransportError::handshake(format!(
                "expected welcome, got {other:?}"
            ))),
        }
    }

    /// Returns the session ID the server assigned.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Sends `payload` on `channel`.
    ///
    /// # Errors
    /// Returns an error if the payload does not fit in a datagram or the
    /// write fails.
    pub fn send(&self, channel: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.write(&Frame::Data {
            channel,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Waits up to `timeout` for the next payload.
    ///
    /// # Errors
    /// Returns [`TransportError::Timeout`] if nothing arrives,
    /// [`TransportError::Handshake`] if the server said BYE.
    pub fn recv(&self, timeout: Duration) -> Result<(u8, Bytes), TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_until(deadline)? {
                Frame::Data { channel, payload } => return Ok((channel, payload)),
                Frame::Bye => return Err(TransportError::handshake("server closed the session")),
                Frame::Welcome { .. } | Frame::Hello => continue,
            }
        }
    }

    /// Says BYE.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn close(&self) -> Result<(), TransportError> {
        self.write(&Frame::Bye)
    }

    fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.socket.send(&buf)?;
        Ok(())
    }

    fn read_until(&self, deadline: Instant) -> Result<Frame, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv(&mut buf) {
                Ok(len) => return Frame::decode(&buf[..len]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
