//! HTTP Routes

pub mod readings;
pub mod relays;
pub mod system;
