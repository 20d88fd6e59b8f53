//! Slipstream Race Server Library
//!
//! A server-authoritative multiplayer racing server: procedural tracks, a fixed
//! tick simulation and a phase machine cycling rounds forever.

pub mod config;
pub mod events;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
