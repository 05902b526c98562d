//! WebSocket transport: wire protocol and connection handler

pub mod feed;
pub mod handler;
pub mod protocol;
