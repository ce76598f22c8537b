//! Line protocol spoken between a configuration client and a controller.
//!
//! - [`framer`] – byte stream → complete lines.
//! - [`messages`] – typed [`Command`](messages::Command),
//!   [`Request`](messages::Request) and [`Response`](messages::Response).
//! - [`codec`] – messages ↔ JSON lines.
//! - [`sequence`] – request IDs for correlation.

pub mod codec;
pub mod framer;
pub mod messages;
pub mod sequence;

pub use sequence::RequestIdCounter;

/// Serial line speed the controller firmware listens at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
