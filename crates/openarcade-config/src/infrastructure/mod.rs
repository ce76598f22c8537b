//! Infrastructure layer: transports, the hardware backend, storage, and the
//! device emulator.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `openarcade_core`, but MUST NOT be imported by the `application` layer.

pub mod emulator;
pub mod hardware;
pub mod storage;
pub mod transport;
