//! Hardware backend: the configuration contract spoken over a byte link.
//!
//! - [`correlator`] – pairs responses with outstanding requests.
//! - [`client`] – [`SerialConfigClient`], composing transport, framer,
//!   codec and correlator.

pub mod client;
pub mod correlator;

pub use client::{ClientOptions, SerialConfigClient};
pub use correlator::{Correlator, Resolution};
