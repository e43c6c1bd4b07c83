//! Real-time distribution for the reservation ledger.
//!
//! Two logically separate channels, mirroring their different guarantees:
//!
//! - [`ChangeFeed`] — row-level insert/update/delete events for the
//!   reservation table, delivered to every connected terminal. Successive
//!   events for the same row arrive in publish order.
//! - [`PresenceBus`] — fire-and-forget typing/idle signals. No persistence,
//!   no delivery guarantee; purely advisory.
//!
//! [`wire`] defines the JSON envelope both travel in over WebSocket.

pub mod feed;
pub mod presence;
pub mod wire;

pub use feed::{ChangeEvent, ChangeFeed};
pub use presence::PresenceBus;
pub use wire::WireMessage;
