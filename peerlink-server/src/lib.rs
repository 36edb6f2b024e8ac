//! # peerlink Server
//!
//! Event-driven session server on top of an engine binding.
//!
//! This crate provides:
//! - Server builder, lifecycle and the poll loop bridging engine events
//! - Session registry keyed by engine-assigned IDs
//! - Handler registration and isolated, ordered dispatch
//! - Send and best-effort broadcast to live sessions
//! - Per-session application cache and a timestamped log stream
//! - TOML configuration and an optional HTTP status side-channel

mod bridge;
pub mod builder;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod handler;
mod http;
pub mod log;
pub mod registry;

pub use builder::{Server, ServerBuilder};
pub use cache::{CacheValue, LruSessionCache, MemoryCache, SessionCache};
pub use config::{HttpConfig, IdleStrategy, ServerConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ConfigError, RegistryError, SendError, ServerError};
pub use handle::{BroadcastReport, ServerHandle, ServerState, ServerStats};
pub use handler::{EventHandler, HandlerError, HandlerId, HandlerResult};
pub use log::Logger;
pub use registry::{Session, SessionRegistry};
