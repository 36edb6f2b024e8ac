//! Non-blocking UDP datagram engine.
//!
//! Numbers its peers with an [`IdAllocator`], answers HELLO with WELCOME and
//! forgets peers that say BYE or stay silent longer than the peer timeout.
//! There is no retransmission: a lost datagram is lost.

use super::wire::{Frame, MAX_DATAGRAM};
use bytes::{Bytes, BytesMut};
use peerlink_core::{EngineBinding, EngineError, IdAllocator, RawEvent, SessionId};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// Configuration for [`UdpEngine`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Interface to bind to.
    pub bind_ip: IpAddr,
    /// Silence after which a peer is considered gone.
    pub peer_timeout: Duration,
    /// Socket receive buffer size, OS default if `None`.
    pub recv_buffer_size: Option<usize>,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            peer_timeout: Duration::from_secs(30),
            recv_buffer_size: None,
        }
    }
}

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    last_seen: Instant,
}

/// UDP engine reporting one event per poll.
pub struct UdpEngine {
    config: UdpConfig,
    socket: Option<UdpSocket>,
    ids: IdAllocator,
    peers: HashMap<SessionId, Peer>,
    by_addr: HashMap<SocketAddr, SessionId>,
    pending: VecDeque<RawEvent>,
    recv_buf: Vec<u8>,
    last_sweep: Instant,
}

impl UdpEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: UdpConfig) -> Self {
        Self {
            config,
            socket: None,
            ids: IdAllocator::default(),
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            pending: VecDeque::new(),
            recv_buf: vec![0u8; MAX_DATAGRAM],
            last_sweep: Instant::now(),
        }
    }

    /// Returns the bound address once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Returns the number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn socket(&self) -> Result<&UdpSocket, EngineError> {
        self.socket.as_ref().ok_or(EngineError::NotInitialized)
    }

    fn send_frame(&self, frame: &Frame, addr: SocketAddr) -> Result<(), EngineError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.socket()?.send_to(&buf, addr)?;
        Ok(())
    }

    fn receive_one(&mut self) -> Result<(), EngineError> {
        let (len, addr) = {
            let socket = self.socket.as_ref().ok_or(EngineError::NotInitialized)?;
            match socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                // ICMP port unreachable from a vanished peer.
                Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        };
        let frame = Frame::decode(&self.recv_buf[..len])?;
        self.handle_frame(frame, addr)
    }

    fn handle_frame(&mut self, frame: Frame, addr: SocketAddr) -> Result<(), EngineError> {
        let known = self.by_addr.get(&addr).copied();
        if let Some(session_id) = known
            && let Some(peer) = self.peers.get_mut(&session_id)
        {
            peer.last_seen = Instant::now();
        }

        match (frame, known) {
            (Frame::Hello, Some(session_id)) => {
                // Our WELCOME got lost; say it again.
                self.send_frame(&Frame::Welcome { session_id }, addr)
            }
            (Frame::Hello, None) => {
                let session_id = self
                    .ids
                    .allocate()
                    .ok_or_else(|| EngineError::rejected("session id space exhausted"))?;
                self.peers.insert(
                    session_id,
                    Peer {
                        addr,
                        last_seen: Instant::now(),
                    },
                );
                self.by_addr.insert(addr, session_id);
                tracing::debug!("Peer {} connected as session {}", addr, session_id);
                self.pending.push_back(RawEvent::Connect {
                    session_id,
                    peer: Some(addr),
                });
                self.send_frame(&Frame::Welcome { session_id }, addr)
            }
            (Frame::Data { channel, payload }, Some(session_id)) => {
                self.pending.push_back(RawEvent::Receive {
                    session_id,
                    channel,
                    payload,
                });
                Ok(())
            }
            (Frame::Bye, Some(session_id)) => {
                self.forget(session_id);
                self.pending.push_back(RawEvent::Disconnect { session_id });
                Ok(())
            }
            (Frame::Welcome { .. }, _) => Err(EngineError::malformed(format!(
                "welcome frame from {addr}"
            ))),
            (_, None) => {
                // Late traffic from forgotten or refused peers.
                tracing::debug!("Ignoring frame from unknown peer {}", addr);
                Ok(())
            }
        }
    }

    fn forget(&mut self, session_id: SessionId) -> Option<Peer> {
        let peer = self.peers.remove(&session_id)?;
        self.by_addr.remove(&peer.addr);
        self.ids.release(session_id);
        Some(peer)
    }

    fn sweep_idle(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_sweep) < Duration::from_secs(1) {
            return;
        }
        self.last_sweep = now;

        let timeout = self.config.peer_timeout;
        let mut idle: Vec<SessionId> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.duration_since(peer.last_seen) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        idle.sort_unstable();

        for session_id in idle {
            if let Some(peer) = self.forget(session_id) {
                tracing::debug!("Session {} ({}) timed out", session_id, peer.addr);
                self.pending.push_back(RawEvent::Disconnect { session_id });
            }
        }
    }
}

impl Default for UdpEngine {
    fn default() -> Self {
        Self::new(UdpConfig::default())
    }
}

impl EngineBinding for UdpEngine {
    fn initialize(&mut self, port: u16) -> Result<(), EngineError> {
        if self.socket.is_some() {
            return Err(EngineError::AlreadyInitialized);
        }

        let addr = SocketAddr::new(self.config.bind_ip, port);
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        if let Some(size) = self.config.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket: UdpSocket = socket.into();
        tracing::info!("UDP engine bound to {}", socket.local_addr()?);
        self.socket = Some(socket);
        self.last_sweep = Instant::now();
        Ok(())
    }

    fn set_base_session_id(&mut self, base: SessionId) {
        if !self.peers.is_empty() {
            tracing::warn!("Ignoring base session id {} with peers connected", base);
            return;
        }
        self.ids = IdAllocator::new(base);
    }

    fn poll(&mut self) -> Result<RawEvent, EngineError> {
        self.socket()?;
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }

        self.receive_one()?;
        self.sweep_idle();
        Ok(self.pending.pop_front().unwrap_or(RawEvent::None))
    }

    fn send(
        &mut self,
        session_id: SessionId,
        channel: u8,
        payloads: &[Bytes],
    ) -> Result<(), EngineError> {
        let addr = self
            .peers
            .get(&session_id)
            .map(|peer| peer.addr)
            .ok_or(EngineError::UnknownSession(session_id))?;

        for payload in payloads {
            let frame = Frame::Data {
                channel,
                payload: payload.clone(),
            };
            self.send_frame(&frame, addr)?;
        }
        Ok(())
    }

    fn disconnect(&mut self, session_id: SessionId) {
        if let Some(peer) = self.forget(session_id)
            && let Err(e) = self.send_frame(&Frame::Bye, peer.addr)
        {
            tracing::debug!("Failed to say bye to session {}: {}", session_id, e);
        }
    }

    fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.peers.keys().copied().collect();
        for session_id in ids {
            self.disconnect(session_id);
        }
        self.pending.clear();
        self.socket = None;
        tracing::info!("UDP engine shut down");
    }
}
