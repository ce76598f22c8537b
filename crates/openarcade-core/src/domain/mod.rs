//! Domain entities: devices, their modes and mappings, and button layouts.

pub mod device;
pub mod layout;
