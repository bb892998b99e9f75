//! # herald-core
//!
//! Client-side connection manager for Herald notification channels.
//!
//! This crate keeps one persistent session per subscribed channel and fans
//! inbound notifications out to the observers registered for it:
//!
//! - **Client** - The facade: subscribe, unsubscribe, observe, shut down
//! - **Connection** - One channel's session and reconnect lifecycle
//! - **Observers** - Per-channel callback lists with stable handles
//! - **Status** - Push-updated connected flags, with an optional poller
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Client    │────▶│  Registry   │────▶│ Connection  │──▶ Transport
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                  │        │
//!        ▼                                  ▼        ▼
//! ┌─────────────┐                   ┌───────────┐ ┌─────────┐
//! │  Observers  │◀──────────────────│  deliver  │ │ Status  │
//! └─────────────┘                   └───────────┘ └─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use herald_core::{ChannelId, Client, ClientConfig};
//!
//! # async fn run() -> Result<(), herald_core::ClientError> {
//! let client = Client::new(ClientConfig::default())?;
//! client.subscribe(ChannelId::General, |n| {
//!     println!("[{}] {}", n.channel, n.message);
//! });
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod observer;
mod registry;
pub mod status;

pub use client::{Client, ClientError};
pub use config::{ClientConfig, ReconnectConfig};
pub use connection::Phase;
pub use herald_protocol::ChannelId;
pub use message::Notification;
pub use observer::{Observer, ObserverHandle, ObserverRegistry};
pub use status::{StatusPoller, StatusSnapshot, StatusTracker};
