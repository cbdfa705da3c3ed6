//! Market-data and order-entry client for the Deribit derivatives venue.
//!
//! Three transports feed one event bus:
//!
//! * [`multicast`] — a lock-step [SBE](sbe) decoder over UDP multicast
//!   groups, with per-channel sequence reordering, de-duplication, loss
//!   detection, and snapshot/incremental reconciliation.
//! * [`websocket`] — a JSON-RPC v2 duplex performing authenticated calls and
//!   demultiplexing `subscription` notifications, with heartbeat and
//!   auto-reconnect.
//! * [`fix`] — a FIX 4.4 initiator correlating request/response exchanges
//!   and translating market-data refreshes and execution reports.
//!
//! Consumers register listeners on the [`Emitter`] by channel name, e.g.
//! `book.BTC-PERPETUAL` or `trades.option.BTC`, and receive the typed
//! notifications from [`events`] synchronously on the transport's receive
//! thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::missing_errors_doc)]

pub mod catalog;
mod emitter;
mod error;
pub mod events;
pub mod fix;
pub mod multicast;
pub mod sbe;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_utils;

pub use catalog::{Catalog, HttpInstrumentsGetter, InstrumentsGetter};
pub use emitter::{Emitter, ListenerId};
pub use error::{Error, Result};
