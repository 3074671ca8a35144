//! hub
//!
//! The broadcast hub owns the registry of connected clients and fans every
//! payload out to them. It runs as a single actor task; everything else talks
//! to it through a cloneable `HubHandle`.

pub mod engine;

pub use engine::{Hub, HubHandle, HubState, Registration};

#[cfg(test)]
mod tests;
