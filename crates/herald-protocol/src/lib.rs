//! # herald-protocol
//!
//! Wire definitions shared by every Herald crate.
//!
//! Herald clients keep one persistent session per channel. This crate
//! defines what travels over those sessions and where they point:
//!
//! - `ChannelId` - The closed set of notification channels
//! - `NotificationFrame` - A decoded inbound JSON frame
//! - `codec` - JSON decoding with size limits
//! - `Endpoint` - Per-channel connection URLs
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::{codec, ChannelId, Endpoint};
//!
//! let endpoint = Endpoint::parse("ws://localhost:8080/ws", Some("type".into())).unwrap();
//! assert_eq!(
//!     endpoint.url_for(ChannelId::General).as_str(),
//!     "ws://localhost:8080/ws?type=GENERAL"
//! );
//!
//! let frame = codec::decode(br#"{"message":"hi"}"#).unwrap();
//! assert_eq!(frame.message, "hi");
//! assert!(frame.timestamp.is_none());
//! ```

pub mod channel;
pub mod codec;
pub mod endpoint;
pub mod frames;

pub use channel::ChannelId;
pub use codec::{decode, encode, ProtocolError};
pub use endpoint::Endpoint;
pub use frames::NotificationFrame;
