//! Officer terminal client: the reservation lifecycle controller.
//!
//! A single-task actor owns the optimistic local cache of today's
//! reservations and drains one command mailbox. Everything reaches it as a
//! [`Command`](commands::Command): the officer's actions, change-feed
//! events, relayed presence signals, and its own timer ticks. Outcomes flow
//! back to the rendering layer as [`UiEvent`](ui::UiEvent)s; no failure in
//! this crate is fatal to the controller loop.

pub mod cache;
pub mod commands;
pub mod config;
pub mod controller;
pub mod feed;
pub mod http;
pub mod memory;
pub mod store;
pub mod ui;
