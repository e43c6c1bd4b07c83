//! Domain types and pure logic for the card-pickup reservation system.
//!
//! This crate has no I/O and no internal dependencies so that the store,
//! API, WebSocket, and terminal-client layers can all share the same
//! status rules, appointment-number normalization, and presence semantics.

pub mod error;
pub mod presence;
pub mod reservation;
pub mod types;
