//! # peerlink
//!
//! Event-driven session server over a reliable-UDP style engine.
//!
//! The server polls an engine binding without blocking the runtime, turns
//! its raw events into `connect` / `data` / `disconnect` events in engine
//! order, tracks the live sessions and sends back through the engine.
//!
//! ## Quick Start
//!
//! ```ignore
//! use peerlink::prelude::*;
//!
//! let server = ServerBuilder::new()
//!     .port(17091)
//!     .engine(UdpEngine::default())
//!     .build()?;
//!
//! server.on_data(|server, id, payload| {
//!     server.send(id, 0, payload.clone())?;
//!     Ok(())
//! });
//!
//! server.run().await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`] - Session IDs, events, packets and the engine contract
//! - [`transport`] - UDP datagram engine and the scripted test engine
//! - [`server`] - Poll loop, registry, dispatch, cache, log stream and config

pub mod prelude;

/// Session IDs, events, packets and the engine contract.
pub mod core {
    pub use peerlink_core::*;
}

/// Engine bindings.
pub mod transport {
    pub use peerlink_transport::*;
}

/// Event-driven session server.
pub mod server {
    pub use peerlink_server::*;
}

// Re-export commonly used items at the crate root
pub use peerlink_core::{EngineBinding, Event, EventKind, SessionId};
pub use peerlink_server::{Server, ServerBuilder, ServerConfig, ServerHandle};
