//! Client transport: length-prefixed bincode frames over any byte stream

pub mod connection;
pub mod framing;
pub mod protocol;
