//! # peerlink Core
//!
//! Core types and traits shared by the peerlink engine bindings and server.
//!
//! This crate provides:
//! - Session identifiers and the ID allocation policy engines use
//! - Raw engine events and the normalized events handed to applications
//! - Outbound packet description
//! - The [`EngineBinding`] contract a transport engine must satisfy
//! - Error types for engine and core operations

pub mod engine;
pub mod error;
pub mod event;
pub mod id;
pub mod packet;

pub use engine::EngineBinding;
pub use error::{EngineError, Error, Result};
pub use event::{Event, EventKind, RawEvent};
pub use id::{IdAllocator, SessionId};
pub use packet::{Packet, Target};
