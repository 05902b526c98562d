//! Session lobby server - readiness consensus and single-writer entity ownership
//!
//! The authoritative node tracks connected participants and their
//! readiness, fires a one-shot session transition once everyone is ready,
//! and relays entity state only from each entity's owner. The `sim` module
//! is the participant side: it gates each spawned entity on ownership and
//! runs the input integrator only for entities the local context owns.

pub mod app;
pub mod config;
pub mod http;
pub mod lobby;
pub mod sim;
pub mod util;
pub mod ws;
