//! # herald-transport
//!
//! Client transport abstraction layer for Herald.
//!
//! This crate provides a unified interface for the sessions a Herald client
//! keeps open:
//!
//! - **WebSocket** - The production transport
//! - **Memory** - In-process sessions with a scriptable server side
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Transport` and `Session` traits,
//! allowing the connection manager to be protocol-agnostic.
//!
//! ```rust,ignore
//! use herald_transport::{Session, Transport};
//!
//! async fn drain(transport: &dyn Transport, url: &url::Url) {
//!     let mut session = transport.connect(url).await.unwrap();
//!     while let Ok(Some(payload)) = session.recv().await {
//!         // Decode payload
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use traits::{Session, SessionId, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
