//! UDP transport module.
//!
//! Provides a non-blocking datagram engine for the server and a blocking peer
//! that speaks the same wire format.

pub mod engine;
pub mod peer;
pub mod wire;

pub use engine::{UdpConfig, UdpEngine};
pub use peer::DatagramPeer;
pub use wire::Frame;
