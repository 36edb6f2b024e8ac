//! Prelude module for convenient imports.
//!
//! ```ignore
//! use peerlink::prelude::*;
//! ```

// Payload buffer
pub use bytes::Bytes;

// Core types
pub use peerlink_core::{EngineBinding, EngineError, Event, EventKind, RawEvent, SessionId};

// Engines
pub use peerlink_transport::{UdpConfig, UdpEngine};

// Server types
pub use peerlink_server::{
    BroadcastReport, EventHandler, HandlerId, HandlerResult, HttpConfig, IdleStrategy, Logger,
    SendError, Server, ServerBuilder, ServerConfig, ServerError, ServerHandle, SessionCache,
};
