//! # peerlink Transport
//!
//! Engine bindings that satisfy the [`EngineBinding`](peerlink_core::EngineBinding)
//! contract.
//!
//! This crate provides:
//! - [`udp`] - Non-blocking UDP datagram engine, its wire format and a peer
//!   for talking to it
//! - [`scripted`] - In-memory engine driven by a script handle, for tests

pub mod error;
pub mod scripted;
pub mod udp;

pub use error::TransportError;
pub use scripted::{ScriptHandle, ScriptedEngine};
pub use udp::{DatagramPeer, UdpConfig, UdpEngine};
